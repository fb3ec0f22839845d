//! Export pipeline: `BookExportModel` → EPUB archive.
//!
//! Per chapter, in order: extract embedded images, point their `src` at the
//! archive files, rewrite endnote links, convert to XHTML. The image counter
//! lives in the `ImageExtractor` built for one run, so concurrent exports
//! share nothing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::archive::EpubArchive;
use crate::assemble::{self, ChapterDoc, CoverRef, Package, OEBPS_DIR};
use crate::cover::CoverImage;
use crate::css::{stylesheet, STYLESHEET_FILENAME};
use crate::error::{CoverError, ExportError};
use crate::images::{rewrite_image_sources, ImageExtractor, ImageSet};
use crate::model::{display_titles, BookExportModel, ResolvedMetadata, TypographyPreset};
use crate::progress::{emit_progress, ExportStage, ProgressHandler};
use crate::sanitize::sanitize_chapter;
use crate::security::SecurityLimits;
use crate::stats::ExportReport;
use crate::xref::{chapter_filename, ChapterFileMap, CrossReferenceRewriter};

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Used when the model's language is blank.
    pub default_language: String,
    /// Used when the model carries no typography preset.
    pub typography: TypographyPreset,
    pub limits: SecurityLimits,
    pub compression_level: Option<i64>,
    /// Clock override for the publication date fallback and `dcterms:modified`.
    pub now: Option<DateTime<Utc>>,
    /// Identifier override for books without an ISBN.
    pub identifier: Option<String>,
    /// Cover file; replaces the model's cover data URI when set.
    pub cover_path: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            typography: TypographyPreset::Default,
            limits: SecurityLimits::default(),
            compression_level: None,
            now: None,
            identifier: None,
            cover_path: None,
        }
    }
}

/// A finished archive and what went into it.
#[derive(Debug, Clone)]
pub struct EpubBuild {
    pub bytes: Vec<u8>,
    pub report: ExportReport,
}

/// Where `export` delivers the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    Bytes,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub enum ExportOutcome {
    Bytes(EpubBuild),
    Written { path: PathBuf, report: ExportReport },
}

impl ExportOutcome {
    pub fn report(&self) -> &ExportReport {
        match self {
            ExportOutcome::Bytes(build) => &build.report,
            ExportOutcome::Written { report, .. } => report,
        }
    }
}

/// Synchronous build. A cover file in `opts.cover_path` is read with
/// blocking IO.
pub fn build_epub(
    model: &BookExportModel,
    opts: &ExportOptions,
    progress: Option<&dyn ProgressHandler>,
) -> Result<EpubBuild, ExportError> {
    let cover = match &opts.cover_path {
        Some(path) => {
            let data = std::fs::read(path).map_err(|e| cover_read_error(path, e))?;
            Some(CoverImage::from_bytes(data)?)
        }
        None => None,
    };
    build_with_cover(model, opts, cover, progress)
}

/// Build and deliver. Cover file read and output write are the only
/// suspension points.
#[cfg(feature = "async")]
pub async fn export(
    model: &BookExportModel,
    opts: &ExportOptions,
    target: ExportTarget,
    progress: Option<&dyn ProgressHandler>,
) -> Result<ExportOutcome, ExportError> {
    let cover = match &opts.cover_path {
        Some(path) => {
            let data = tokio::fs::read(path)
                .await
                .map_err(|e| cover_read_error(path, e))?;
            Some(CoverImage::from_bytes(data)?)
        }
        None => None,
    };
    let build = build_with_cover(model, opts, cover, progress)?;

    match target {
        ExportTarget::Bytes => Ok(ExportOutcome::Bytes(build)),
        ExportTarget::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &build.bytes).await?;
            tracing::info!("Wrote {} ({} bytes)", path.display(), build.bytes.len());
            Ok(ExportOutcome::Written {
                path,
                report: build.report,
            })
        }
    }
}

fn cover_read_error(path: &Path, source: std::io::Error) -> CoverError {
    CoverError::Read {
        path: path.display().to_string(),
        source,
    }
}

fn build_with_cover(
    model: &BookExportModel,
    opts: &ExportOptions,
    cover_override: Option<CoverImage>,
    progress: Option<&dyn ProgressHandler>,
) -> Result<EpubBuild, ExportError> {
    let now = opts.now.unwrap_or_else(Utc::now);
    let meta = ResolvedMetadata::resolve(model, &opts.default_language, now);
    let identifier = meta
        .isbn
        .clone()
        .or_else(|| opts.identifier.clone())
        .unwrap_or_else(|| format!("urn:uuid:{}", Uuid::new_v4()));
    let modified = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let preset = model.typography_preset.unwrap_or(opts.typography);

    emit_progress(progress, ExportStage::Cover, 0, None, None);
    let cover = match cover_override {
        Some(c) => Some(c),
        None => model
            .cover_image
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
            .map(CoverImage::from_data_uri)
            .transpose()?,
    };

    let mut report = ExportReport {
        chapter_count: model.chapters.len() as u32,
        has_cover: cover.is_some(),
        ..Default::default()
    };

    let files = ChapterFileMap::build(&model.chapters);
    let rewriter = CrossReferenceRewriter::new(&files, &model.endnote_references);
    let mut extractor = ImageExtractor::new(&opts.limits);
    let mut images = ImageSet::new();
    let titles = display_titles(&model.chapters);
    let total = model.chapters.len() as u64;

    let mut docs = Vec::with_capacity(model.chapters.len());
    let mut bodies = Vec::with_capacity(model.chapters.len());
    for (i, (chapter, title)) in model.chapters.iter().zip(titles).enumerate() {
        emit_progress(progress, ExportStage::Chapters, i as u64, Some(total), Some(title.as_str()));

        let extracted = extractor.extract(&chapter.content);
        let html = rewrite_image_sources(&chapter.content, &extracted);
        let html = rewriter.rewrite(chapter, &html);
        let sanitized = sanitize_chapter(&html, &opts.limits);
        if sanitized.degraded {
            tracing::warn!("Chapter {} ('{}') exported with reduced fidelity", i + 1, title);
            report.degraded_chapters.push(i as u32 + 1);
        }
        report.add_chapter_text(&sanitized.xhtml);
        for image in extracted {
            images.insert(image);
        }

        docs.push(ChapterDoc {
            id: format!("chapter{}", i + 1),
            filename: chapter_filename(i),
            title,
            kind: chapter.kind,
        });
        bodies.push(sanitized.xhtml);
    }
    emit_progress(progress, ExportStage::Chapters, total, Some(total), None);
    report.image_count = images.len() as u32;

    emit_progress(progress, ExportStage::Assembly, 0, None, None);
    let cover_filename = cover.as_ref().map(CoverImage::filename);
    let cover_ref = match (&cover, &cover_filename) {
        (Some(c), Some(name)) => Some(CoverRef {
            filename: name,
            media_type: c.media_type(),
        }),
        _ => None,
    };
    let entries = assemble::nav_entries(&docs, cover_ref.is_some());
    let package = Package {
        metadata: &meta,
        identifier: &identifier,
        modified: &modified,
        chapters: &docs,
        images: &images,
        cover: cover_ref,
    };

    let oebps = |name: &str| format!("{}/{}", OEBPS_DIR, name);
    let mut archive = EpubArchive::new().with_compression_level(opts.compression_level);
    archive.add_text(assemble::CONTAINER_PATH, assemble::container_xml());
    archive.add_text(oebps(assemble::OPF_FILENAME), assemble::content_opf(&package));
    archive.add_text(oebps(assemble::NAV_FILENAME), assemble::nav_xhtml(&meta, &entries, &docs));
    archive.add_text(oebps(assemble::NCX_FILENAME), assemble::toc_ncx(&meta, &identifier, &entries));
    archive.add_text(oebps(assemble::TOC_FILENAME), assemble::toc_xhtml(&meta, &docs));
    archive.add_text(oebps(assemble::PUBLISHER_FILENAME), assemble::publisher_xhtml(&meta));
    archive.add_text(oebps(STYLESHEET_FILENAME), stylesheet(preset));
    if let (Some(cover), Some(name)) = (cover, &cover_filename) {
        archive.add_text(oebps(assemble::COVER_PAGE_FILENAME), assemble::cover_xhtml(&meta, name));
        archive.add_binary(oebps(name), cover.data);
    }
    for (doc, body) in docs.iter().zip(&bodies) {
        archive.add_text(oebps(&doc.filename), assemble::chapter_xhtml(doc, &meta.language, body));
    }
    for image in images.iter() {
        archive.add_binary(oebps(&image.href()), image.data.clone());
    }

    emit_progress(progress, ExportStage::Packaging, 0, None, None);
    let bytes = archive.to_bytes()?;
    report.finish(bytes.len() as u64);
    tracing::debug!(
        "Exported '{}': {} chapters, {} images, {} bytes",
        meta.title,
        report.chapter_count,
        report.image_count,
        bytes.len()
    );
    Ok(EpubBuild { bytes, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chapter, ChapterKind, EndnoteReference};
    use chrono::TimeZone;
    use std::io::{Cursor, Read};
    use std::sync::Mutex;

    fn fixed_opts() -> ExportOptions {
        ExportOptions {
            now: Some(Utc.with_ymd_and_hms(2026, 5, 1, 8, 30, 0).unwrap()),
            identifier: Some("urn:uuid:00000000-0000-4000-8000-000000000000".into()),
            ..Default::default()
        }
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = zip.by_name(name).unwrap();
        let mut s = String::new();
        file.read_to_string(&mut s).unwrap();
        s
    }

    fn model() -> BookExportModel {
        BookExportModel {
            title: "Test Book".into(),
            chapters: vec![
                Chapter {
                    id: "c1".into(),
                    title: "Opening".into(),
                    content: r##"<p>Hello<a id="ref1" href="#end1">1</a></p>"##.into(),
                    kind: ChapterKind::Content,
                },
                Chapter {
                    id: "n".into(),
                    title: "Endnotes".into(),
                    content: r##"<p id="end1"><a href="#ref1">1</a> A note.</p>"##.into(),
                    kind: ChapterKind::Backmatter,
                },
            ],
            endnote_references: vec![EndnoteReference {
                id: "r1".into(),
                number: 1,
                chapter_id: "c1".into(),
                endnote_id: "e1".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_clock_and_identifier_are_deterministic() {
        let a = build_epub(&model(), &fixed_opts(), None).unwrap();
        let b = build_epub(&model(), &fixed_opts(), None).unwrap();
        let opf_a = read_entry(&a.bytes, "OEBPS/content.opf");
        assert_eq!(opf_a, read_entry(&b.bytes, "OEBPS/content.opf"));
        assert!(opf_a.contains("<dc:date>2026-05-01</dc:date>"));
        assert!(opf_a.contains(r#"<meta property="dcterms:modified">2026-05-01T08:30:00Z</meta>"#));
        assert!(opf_a.contains("urn:uuid:00000000-0000-4000-8000-000000000000"));
    }

    #[test]
    fn test_isbn_wins_over_identifier_override() {
        let mut m = model();
        m.isbn = "9780000000002".into();
        let build = build_epub(&m, &fixed_opts(), None).unwrap();
        let opf = read_entry(&build.bytes, "OEBPS/content.opf");
        assert!(opf.contains(r#"<dc:identifier id="book-id">9780000000002</dc:identifier>"#));
    }

    #[test]
    fn test_generated_identifier_is_uuid_urn() {
        let build = build_epub(&model(), &ExportOptions::default(), None).unwrap();
        let opf = read_entry(&build.bytes, "OEBPS/content.opf");
        let start = opf.find("urn:uuid:").unwrap() + "urn:uuid:".len();
        assert!(Uuid::parse_str(&opf[start..start + 36]).is_ok());
    }

    #[test]
    fn test_endnotes_linked_across_files() {
        let build = build_epub(&model(), &fixed_opts(), None).unwrap();
        let ch1 = read_entry(&build.bytes, "OEBPS/chapter1.xhtml");
        let notes = read_entry(&build.bytes, "OEBPS/chapter2.xhtml");
        assert!(ch1.contains(r##"href="chapter2.xhtml#end1""##));
        assert!(notes.contains(r##"href="chapter1.xhtml#ref1""##));
        assert!(notes.contains(r#"<body epub:type="backmatter">"#));
    }

    #[test]
    fn test_model_preset_overrides_option() {
        let mut m = model();
        m.typography_preset = Some(TypographyPreset::Poetry);
        let opts = ExportOptions {
            typography: TypographyPreset::Technical,
            ..fixed_opts()
        };
        let build = build_epub(&m, &opts, None).unwrap();
        assert!(read_entry(&build.bytes, "OEBPS/styles.css").starts_with("/* typography: poetry */"));
    }

    #[test]
    fn test_bad_cover_is_fatal() {
        let mut m = model();
        m.cover_image = Some("data:text/plain;base64,aGVsbG8=".into());
        let err = build_epub(&m, &fixed_opts(), None).unwrap_err();
        assert!(matches!(err, ExportError::Cover(CoverError::UnsupportedMediaType(_))));
    }

    #[test]
    fn test_missing_cover_file_is_fatal() {
        let opts = ExportOptions {
            cover_path: Some(PathBuf::from("/nonexistent/cover.png")),
            ..fixed_opts()
        };
        let err = build_epub(&model(), &opts, None).unwrap_err();
        assert!(matches!(err, ExportError::Cover(CoverError::Read { .. })));
    }

    #[test]
    fn test_degraded_chapter_reported() {
        let mut m = model();
        let deep = "<span>".repeat(50) + "x" + &"</span>".repeat(50);
        m.chapters[0].content = deep;
        let opts = ExportOptions {
            limits: SecurityLimits {
                max_nesting_depth: 10,
                ..SecurityLimits::default()
            },
            ..fixed_opts()
        };
        let build = build_epub(&m, &opts, None).unwrap();
        assert_eq!(build.report.degraded_chapters, vec![1]);
        assert_eq!(build.report.chapter_count, 2);
    }

    struct Recorder(Mutex<Vec<ExportStage>>);

    impl ProgressHandler for Recorder {
        fn on_progress(&self, event: crate::progress::ProgressEvent) {
            self.0.lock().unwrap().push(event.stage);
        }
    }

    #[test]
    fn test_progress_stages_in_order() {
        let recorder = Recorder(Mutex::new(Vec::new()));
        build_epub(&model(), &fixed_opts(), Some(&recorder)).unwrap();
        let mut stages = recorder.0.into_inner().unwrap();
        stages.dedup();
        assert_eq!(
            stages,
            vec![ExportStage::Cover, ExportStage::Chapters, ExportStage::Assembly, ExportStage::Packaging]
        );
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("book.epub");
        let outcome = export(&model(), &fixed_opts(), ExportTarget::File(path.clone()), None)
            .await
            .unwrap();
        match outcome {
            ExportOutcome::Written { path: written, report } => {
                assert_eq!(written, path);
                let on_disk = std::fs::metadata(&path).unwrap().len();
                assert_eq!(on_disk, report.archive_size_bytes);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_export_bytes_matches_sync_build() {
        let outcome = export(&model(), &fixed_opts(), ExportTarget::Bytes, None).await.unwrap();
        let sync = build_epub(&model(), &fixed_opts(), None).unwrap();
        match outcome {
            ExportOutcome::Bytes(build) => assert_eq!(
                read_entry(&build.bytes, "OEBPS/chapter1.xhtml"),
                read_entry(&sync.bytes, "OEBPS/chapter1.xhtml")
            ),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
