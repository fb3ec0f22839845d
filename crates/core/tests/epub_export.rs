//! End-to-end export tests: build an archive, read it back with `zip`, and
//! check it with `quick-xml`.

use std::collections::HashSet;
use std::io::{Cursor, Read};

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use quick_xml::events::Event;
use quick_xml::Reader;

use ebook_export_core::export::{build_epub, ExportOptions};
use ebook_export_core::model::{BookExportModel, Chapter, ChapterKind, EndnoteReference};

const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHggJ/PchI7wAAAABJRU5ErkJggg==";

struct Epub {
    zip: zip::ZipArchive<Cursor<Vec<u8>>>,
}

impl Epub {
    fn open(bytes: Vec<u8>) -> Self {
        Self {
            zip: zip::ZipArchive::new(Cursor::new(bytes)).unwrap(),
        }
    }

    fn names(&mut self) -> Vec<String> {
        (0..self.zip.len())
            .map(|i| self.zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn text(&mut self, name: &str) -> String {
        let mut s = String::new();
        self.zip
            .by_name(name)
            .unwrap_or_else(|_| panic!("missing {}", name))
            .read_to_string(&mut s)
            .unwrap();
        s
    }
}

fn chapter(id: &str, title: &str, content: &str, kind: ChapterKind) -> Chapter {
    Chapter {
        id: id.into(),
        title: title.into(),
        content: content.into(),
        kind,
    }
}

fn opts() -> ExportOptions {
    ExportOptions {
        now: Some(Utc.with_ymd_and_hms(2026, 2, 14, 10, 0, 0).unwrap()),
        ..Default::default()
    }
}

/// Attribute values of `attr` on every `tag` start/empty element.
fn attr_values(xml: &str, tag: &[u8], attr: &[u8]) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut values = Vec::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == tag => {
                if let Some(a) = e.try_get_attribute(attr).unwrap() {
                    values.push(a.unescape_value().unwrap().into_owned());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    values
}

fn assert_well_formed(name: &str, xml: &str) {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Text(t)) => {
                if let Err(e) = t.unescape() {
                    panic!("{}: bad entity: {}", name, e);
                }
            }
            Ok(_) => {}
            Err(e) => panic!("{}: not well-formed: {}", name, e),
        }
    }
}

fn sample_model() -> BookExportModel {
    let img = format!(r#"<img src="data:image/png;base64,{}">"#, PIXEL);
    BookExportModel {
        title: "Sample".into(),
        author: "Author".into(),
        language: "en".into(),
        cover_image: Some(format!("data:image/png;base64,{}", PIXEL)),
        chapters: vec![
            chapter("f", "", "<p>Dedication</p>", ChapterKind::Frontmatter),
            chapter(
                "c1",
                "",
                &format!(r##"<p>Start&nbsp;here&rsquo;s &unknownentity; a marker<a id="ref1" href="#end1">1</a></p>{img}{img}"##),
                ChapterKind::Content,
            ),
            chapter("c2", "My Title", "<div>Second</div><h5>Deep</h5>", ChapterKind::Content),
            chapter("c3", "", &format!("<p>Third</p>{img}"), ChapterKind::Content),
            chapter(
                "notes",
                "Endnotes",
                r##"<p id="end1"><a href="#ref1">1</a> The note.</p>"##,
                ChapterKind::Backmatter,
            ),
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
fn archive_layout_and_mimetype() {
    let build = build_epub(&sample_model(), &opts(), None).unwrap();
    let mut epub = Epub::open(build.bytes);

    let first = epub.zip.by_index(0).unwrap();
    assert_eq!(first.name(), "mimetype");
    assert_eq!(first.compression(), zip::CompressionMethod::Stored);
    drop(first);
    assert_eq!(epub.text("mimetype"), "application/epub+zip");

    let names = epub.names();
    for fixed in [
        "META-INF/container.xml",
        "OEBPS/content.opf",
        "OEBPS/nav.xhtml",
        "OEBPS/toc.ncx",
        "OEBPS/toc.xhtml",
        "OEBPS/publisher.xhtml",
        "OEBPS/styles.css",
        "OEBPS/cover.xhtml",
        "OEBPS/cover.png",
    ] {
        assert!(names.iter().any(|n| n == fixed), "missing {}", fixed);
    }
    let chapters: Vec<&String> = names
        .iter()
        .filter(|n| n.starts_with("OEBPS/chapter"))
        .collect();
    assert_eq!(
        chapters,
        vec![
            "OEBPS/chapter1.xhtml",
            "OEBPS/chapter2.xhtml",
            "OEBPS/chapter3.xhtml",
            "OEBPS/chapter4.xhtml",
            "OEBPS/chapter5.xhtml"
        ]
    );
}

#[test]
fn every_manifest_item_exists_and_every_document_parses() {
    let build = build_epub(&sample_model(), &opts(), None).unwrap();
    let mut epub = Epub::open(build.bytes);
    let names: HashSet<String> = epub.names().into_iter().collect();

    let opf = epub.text("OEBPS/content.opf");
    let hrefs = attr_values(&opf, b"item", b"href");
    assert!(!hrefs.is_empty());
    for href in &hrefs {
        assert!(names.contains(&format!("OEBPS/{}", href)), "dangling manifest href {}", href);
    }

    for name in names.iter().filter(|n| n.ends_with(".xhtml") || n.ends_with(".opf") || n.ends_with(".ncx") || n.ends_with(".xml")) {
        let text = epub.text(name);
        assert_well_formed(name, &text);
    }
}

#[test]
fn spine_follows_chapter_order() {
    let build = build_epub(&sample_model(), &opts(), None).unwrap();
    let mut epub = Epub::open(build.bytes);
    let opf = epub.text("OEBPS/content.opf");
    assert_eq!(
        attr_values(&opf, b"itemref", b"idref"),
        vec!["cover", "toc-page", "publisher", "chapter1", "chapter2", "chapter3", "chapter4", "chapter5"]
    );
}

#[test]
fn display_titles_in_navigation() {
    let build = build_epub(&sample_model(), &opts(), None).unwrap();
    let mut epub = Epub::open(build.bytes);
    let nav = epub.text("OEBPS/nav.xhtml");
    for title in ["Front Matter", "Chapter 1", "My Title", "Chapter 2", "Endnotes"] {
        assert!(nav.contains(&format!(">{}</a>", title)), "nav lacks {}", title);
    }
    let ncx = epub.text("OEBPS/toc.ncx");
    assert!(ncx.contains("<text>Chapter 2</text>"));
    assert!(epub.text("OEBPS/chapter4.xhtml").contains(r#"<h1 class="chapter-title">Chapter 2</h1>"#));
}

#[test]
fn entities_are_xml_safe() {
    let build = build_epub(&sample_model(), &opts(), None).unwrap();
    let mut epub = Epub::open(build.bytes);
    let ch = epub.text("OEBPS/chapter2.xhtml");
    assert!(ch.contains("Start&#160;here&#8217;s a marker"));
    assert!(!ch.contains("&nbsp;"));
    assert!(!ch.contains("unknownentity"));
}

#[test]
fn endnote_links_round_trip() {
    let build = build_epub(&sample_model(), &opts(), None).unwrap();
    let mut epub = Epub::open(build.bytes);
    let ch = epub.text("OEBPS/chapter2.xhtml");
    let notes = epub.text("OEBPS/chapter5.xhtml");

    let forward = attr_values(&ch, b"a", b"href");
    assert_eq!(forward, vec!["chapter5.xhtml#end1"]);
    let back = attr_values(&notes, b"a", b"href");
    assert_eq!(back, vec!["chapter2.xhtml#ref1"]);

    // Each target file carries the anchor the other side names.
    assert_eq!(attr_values(&notes, b"p", b"id"), vec!["end1"]);
    assert_eq!(attr_values(&ch, b"a", b"id"), vec!["ref1"]);
}

#[test]
fn embedded_images_extracted_across_chapters() {
    let build = build_epub(&sample_model(), &opts(), None).unwrap();
    assert_eq!(build.report.image_count, 3);
    let mut epub = Epub::open(build.bytes);

    let ch2 = epub.text("OEBPS/chapter2.xhtml");
    assert_eq!(
        attr_values(&ch2, b"img", b"src"),
        vec!["images/image1.png", "images/image2.png"]
    );
    let ch4 = epub.text("OEBPS/chapter4.xhtml");
    assert_eq!(attr_values(&ch4, b"img", b"src"), vec!["images/image3.png"]);
    assert!(!ch2.contains("data:image"));

    let mut png = Vec::new();
    epub.zip
        .by_name("OEBPS/images/image1.png")
        .unwrap()
        .read_to_end(&mut png)
        .unwrap();
    assert!(png.starts_with(b"\x89PNG"));
    assert!(epub.names().iter().any(|n| n == "OEBPS/images/image3.png"));
}

#[test]
fn fallback_metadata_on_blank_model() {
    let model = BookExportModel {
        chapters: vec![chapter("a", "", "<p>x</p>", ChapterKind::Content)],
        ..Default::default()
    };
    let build = build_epub(&model, &opts(), None).unwrap();
    let mut epub = Epub::open(build.bytes);

    let opf = epub.text("OEBPS/content.opf");
    assert!(opf.contains("<dc:title>Untitled</dc:title>"));
    assert!(opf.contains("<dc:creator>Unknown Author</dc:creator>"));
    assert!(opf.contains("<dc:description>N/A</dc:description>"));
    assert!(opf.contains("<dc:publisher>N/A</dc:publisher>"));
    assert!(opf.contains("<dc:date>2026-02-14</dc:date>"));
    assert!(opf.contains("urn:uuid:"));

    let publisher = epub.text("OEBPS/publisher.xhtml");
    assert!(publisher.contains("<p><strong>Author:</strong> Unknown Author</p>"));
    assert!(publisher.contains("<p><strong>Publisher:</strong> N/A</p>"));
    assert!(publisher.contains("<p><strong>Publication Date:</strong> 2026-02-14</p>"));
    assert!(publisher.contains("<p>N/A</p>"));
}

#[test]
fn todays_date_without_clock_override() {
    let model = BookExportModel::default();
    let build = build_epub(&model, &ExportOptions::default(), None).unwrap();
    let mut epub = Epub::open(build.bytes);
    let today = Utc::now().format("%Y-%m-%d").to_string();
    assert!(epub.text("OEBPS/content.opf").contains(&format!("<dc:date>{}</dc:date>", today)));
}

#[test]
fn no_cover_means_no_cover_members() {
    let mut model = sample_model();
    model.cover_image = None;
    let build = build_epub(&model, &opts(), None).unwrap();
    let mut epub = Epub::open(build.bytes);
    assert!(epub.names().iter().all(|n| !n.starts_with("OEBPS/cover")));
    let opf = epub.text("OEBPS/content.opf");
    assert_eq!(attr_values(&opf, b"itemref", b"idref")[0], "toc-page");
}

#[test]
fn empty_book_still_valid() {
    let build = build_epub(&BookExportModel::default(), &opts(), None).unwrap();
    let mut epub = Epub::open(build.bytes);
    assert_eq!(epub.names().len(), 8);
    let opf = epub.text("OEBPS/content.opf");
    assert_well_formed("content.opf", &opf);
}
