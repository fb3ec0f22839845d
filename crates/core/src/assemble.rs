//! Text members of the archive. Each renderer is a pure function of the
//! data it needs.

use std::fmt::Write;

use quick_xml::escape::escape;

use crate::css::STYLESHEET_FILENAME;
use crate::images::ImageSet;
use crate::model::{ChapterKind, ResolvedMetadata};

pub const CONTAINER_PATH: &str = "META-INF/container.xml";
pub const OEBPS_DIR: &str = "OEBPS";
pub const OPF_FILENAME: &str = "content.opf";
pub const NAV_FILENAME: &str = "nav.xhtml";
pub const NCX_FILENAME: &str = "toc.ncx";
pub const TOC_FILENAME: &str = "toc.xhtml";
pub const PUBLISHER_FILENAME: &str = "publisher.xhtml";
pub const COVER_PAGE_FILENAME: &str = "cover.xhtml";

pub const TOC_TITLE: &str = "Table of Contents";
pub const PUBLISHER_TITLE: &str = "Publisher Information";
pub const COVER_TITLE: &str = "Cover";

/// One chapter document as the package and navigation documents see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDoc {
    /// `chapter{N}`
    pub id: String,
    /// `chapter{N}.xhtml`
    pub filename: String,
    pub title: String,
    pub kind: ChapterKind,
}

/// Cover image as referenced by the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverRef<'a> {
    pub filename: &'a str,
    pub media_type: &'a str,
}

/// Inputs for `content.opf`.
#[derive(Debug, Clone, Copy)]
pub struct Package<'a> {
    pub metadata: &'a ResolvedMetadata,
    /// ISBN or `urn:uuid:...`
    pub identifier: &'a str,
    /// `dcterms:modified`, `CCYY-MM-DDThh:mm:ssZ`
    pub modified: &'a str,
    pub chapters: &'a [ChapterDoc],
    pub images: &'a ImageSet,
    pub cover: Option<CoverRef<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub href: String,
    pub title: String,
}

/// Navigation entries in reading order: cover, visible TOC, publisher page,
/// then every chapter.
pub fn nav_entries(chapters: &[ChapterDoc], has_cover: bool) -> Vec<NavEntry> {
    let mut entries = Vec::with_capacity(chapters.len() + 3);
    if has_cover {
        entries.push(NavEntry {
            href: COVER_PAGE_FILENAME.into(),
            title: COVER_TITLE.into(),
        });
    }
    entries.push(NavEntry {
        href: TOC_FILENAME.into(),
        title: TOC_TITLE.into(),
    });
    entries.push(NavEntry {
        href: PUBLISHER_FILENAME.into(),
        title: PUBLISHER_TITLE.into(),
    });
    entries.extend(chapters.iter().map(|ch| NavEntry {
        href: ch.filename.clone(),
        title: ch.title.clone(),
    }));
    entries
}

pub fn container_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{}/{}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#,
        OEBPS_DIR, OPF_FILENAME
    )
}

pub fn content_opf(pkg: &Package<'_>) -> String {
    let meta = pkg.metadata;
    let mut w = String::with_capacity(4096);

    let _ = writeln!(w, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        w,
        r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id" xml:lang="{}">"#,
        escape(&meta.language)
    );
    let _ = writeln!(w, r#"  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">"#);
    let _ = writeln!(w, r#"    <dc:identifier id="book-id">{}</dc:identifier>"#, escape(pkg.identifier));
    let _ = writeln!(w, "    <dc:title>{}</dc:title>", escape(&meta.title));
    let _ = writeln!(w, "    <dc:creator>{}</dc:creator>", escape(&meta.author));
    let _ = writeln!(w, "    <dc:language>{}</dc:language>", escape(&meta.language));
    let _ = writeln!(w, "    <dc:description>{}</dc:description>", escape(&meta.blurb));
    let _ = writeln!(w, "    <dc:publisher>{}</dc:publisher>", escape(&meta.publisher));
    let _ = writeln!(w, "    <dc:date>{}</dc:date>", escape(&meta.pub_date));
    for subject in meta.subjects() {
        let _ = writeln!(w, "    <dc:subject>{}</dc:subject>", escape(subject));
    }
    let _ = writeln!(w, r#"    <meta property="dcterms:modified">{}</meta>"#, escape(pkg.modified));
    if pkg.cover.is_some() {
        let _ = writeln!(w, r#"    <meta name="cover" content="cover-image"/>"#);
    }
    let _ = writeln!(w, "  </metadata>");

    let _ = writeln!(w, "  <manifest>");
    if let Some(cover) = pkg.cover {
        manifest_item(&mut w, "cover-image", cover.filename, cover.media_type, Some("cover-image"));
        manifest_item(&mut w, "cover", COVER_PAGE_FILENAME, XHTML_MEDIA_TYPE, None);
    }
    for ch in pkg.chapters {
        manifest_item(&mut w, &ch.id, &ch.filename, XHTML_MEDIA_TYPE, None);
    }
    for image in pkg.images.iter() {
        manifest_item(&mut w, image.manifest_id(), &image.href(), image.media_type(), None);
    }
    manifest_item(&mut w, "toc-page", TOC_FILENAME, XHTML_MEDIA_TYPE, None);
    manifest_item(&mut w, "publisher", PUBLISHER_FILENAME, XHTML_MEDIA_TYPE, None);
    manifest_item(&mut w, "nav", NAV_FILENAME, XHTML_MEDIA_TYPE, Some("nav"));
    manifest_item(&mut w, "ncx", NCX_FILENAME, "application/x-dtbncx+xml", None);
    manifest_item(&mut w, "css", STYLESHEET_FILENAME, "text/css", None);
    let _ = writeln!(w, "  </manifest>");

    let _ = writeln!(w, r#"  <spine toc="ncx">"#);
    if pkg.cover.is_some() {
        let _ = writeln!(w, r#"    <itemref idref="cover"/>"#);
    }
    let _ = writeln!(w, r#"    <itemref idref="toc-page"/>"#);
    let _ = writeln!(w, r#"    <itemref idref="publisher"/>"#);
    for ch in pkg.chapters {
        let _ = writeln!(w, r#"    <itemref idref="{}"/>"#, ch.id);
    }
    let _ = writeln!(w, "  </spine>");
    let _ = writeln!(w, "</package>");
    w
}

const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

fn manifest_item(w: &mut String, id: &str, href: &str, media_type: &str, properties: Option<&str>) {
    let _ = write!(
        w,
        r#"    <item id="{}" href="{}" media-type="{}""#,
        escape(id),
        escape(href),
        media_type
    );
    if let Some(p) = properties {
        let _ = write!(w, r#" properties="{}""#, p);
    }
    let _ = writeln!(w, "/>");
}

/// EPUB3 navigation document.
pub fn nav_xhtml(meta: &ResolvedMetadata, entries: &[NavEntry], chapters: &[ChapterDoc]) -> String {
    let mut body = String::new();
    let _ = writeln!(body, r#"<nav epub:type="toc" id="toc">"#);
    let _ = writeln!(body, "<h1>{}</h1>", TOC_TITLE);
    let _ = writeln!(body, "<ol>");
    for entry in entries {
        let _ = writeln!(
            body,
            r#"<li><a href="{}">{}</a></li>"#,
            escape(&entry.href),
            escape(&entry.title)
        );
    }
    let _ = writeln!(body, "</ol>");
    let _ = writeln!(body, "</nav>");

    let _ = writeln!(body, r#"<nav epub:type="landmarks" id="landmarks" hidden="hidden">"#);
    let _ = writeln!(body, "<ol>");
    if entries.iter().any(|e| e.href == COVER_PAGE_FILENAME) {
        let _ = writeln!(body, r#"<li><a epub:type="cover" href="{}">{}</a></li>"#, COVER_PAGE_FILENAME, COVER_TITLE);
    }
    let _ = writeln!(body, r#"<li><a epub:type="toc" href="{}">{}</a></li>"#, TOC_FILENAME, TOC_TITLE);
    if let Some(first) = chapters.iter().find(|c| c.kind == ChapterKind::Content) {
        let _ = writeln!(
            body,
            r#"<li><a epub:type="bodymatter" href="{}">{}</a></li>"#,
            escape(&first.filename),
            escape(&first.title)
        );
    }
    let _ = writeln!(body, "</ol>");
    let _ = write!(body, "</nav>");

    xhtml_page(&meta.title, &meta.language, None, None, &body)
}

/// EPUB2 NCX mirroring the navigation entries.
pub fn toc_ncx(meta: &ResolvedMetadata, identifier: &str, entries: &[NavEntry]) -> String {
    let mut w = String::with_capacity(2048);
    let _ = writeln!(w, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        w,
        r#"<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1" xml:lang="{}">"#,
        escape(&meta.language)
    );
    let _ = writeln!(w, "  <head>");
    let _ = writeln!(w, r#"    <meta name="dtb:uid" content="{}"/>"#, escape(identifier));
    let _ = writeln!(w, r#"    <meta name="dtb:depth" content="1"/>"#);
    let _ = writeln!(w, r#"    <meta name="dtb:totalPageCount" content="0"/>"#);
    let _ = writeln!(w, r#"    <meta name="dtb:maxPageNumber" content="0"/>"#);
    let _ = writeln!(w, "  </head>");
    let _ = writeln!(w, "  <docTitle><text>{}</text></docTitle>", escape(&meta.title));
    let _ = writeln!(w, "  <docAuthor><text>{}</text></docAuthor>", escape(&meta.author));
    let _ = writeln!(w, "  <navMap>");
    for (i, entry) in entries.iter().enumerate() {
        let order = i + 1;
        let _ = writeln!(w, r#"    <navPoint id="navpoint-{order}" playOrder="{order}">"#);
        let _ = writeln!(w, "      <navLabel><text>{}</text></navLabel>", escape(&entry.title));
        let _ = writeln!(w, r#"      <content src="{}"/>"#, escape(&entry.href));
        let _ = writeln!(w, "    </navPoint>");
    }
    let _ = writeln!(w, "  </navMap>");
    let _ = writeln!(w, "</ncx>");
    w
}

/// The reader-visible contents page.
pub fn toc_xhtml(meta: &ResolvedMetadata, chapters: &[ChapterDoc]) -> String {
    let mut body = String::new();
    let _ = writeln!(body, r#"<h1 class="chapter-title">{}</h1>"#, TOC_TITLE);
    let _ = writeln!(body, r#"<ol class="toc">"#);
    for ch in chapters {
        let _ = writeln!(
            body,
            r#"<li><a href="{}">{}</a></li>"#,
            escape(&ch.filename),
            escape(&ch.title)
        );
    }
    let _ = write!(body, "</ol>");
    xhtml_page(TOC_TITLE, &meta.language, Some("frontmatter"), None, &body)
}

pub fn publisher_xhtml(meta: &ResolvedMetadata) -> String {
    let mut body = String::new();
    let _ = writeln!(body, r#"<h1 class="chapter-title">{}</h1>"#, escape(&meta.title));
    let _ = writeln!(body, r#"<div class="publisher-info">"#);
    publisher_line(&mut body, "Author", &meta.author);
    publisher_line(&mut body, "Publisher", &meta.publisher);
    publisher_line(&mut body, "Publication Date", &meta.pub_date);
    if let Some(isbn) = &meta.isbn {
        publisher_line(&mut body, "ISBN", isbn);
    }
    if let Some(genre) = &meta.genre {
        publisher_line(&mut body, "Genre", genre);
    }
    let _ = writeln!(body, "</div>");
    let _ = writeln!(body, r#"<div class="blurb">"#);
    let _ = writeln!(body, "<p>{}</p>", escape(&meta.blurb));
    let _ = write!(body, "</div>");
    xhtml_page(PUBLISHER_TITLE, &meta.language, Some("frontmatter"), None, &body)
}

fn publisher_line(body: &mut String, label: &str, value: &str) {
    let _ = writeln!(body, "<p><strong>{}:</strong> {}</p>", label, escape(value));
}

pub fn cover_xhtml(meta: &ResolvedMetadata, cover_filename: &str) -> String {
    let body = format!(
        r#"<div class="cover">
<img src="{}" alt="{}"/>
</div>"#,
        escape(cover_filename),
        escape(&meta.title)
    );
    xhtml_page(COVER_TITLE, &meta.language, Some("cover"), Some("cover"), &body)
}

/// `chapter{N}.xhtml`. `content` must already be a sanitized XHTML fragment.
pub fn chapter_xhtml(chapter: &ChapterDoc, language: &str, content: &str) -> String {
    let body = format!(
        r#"<h1 class="chapter-title">{}</h1>
<div class="chapter-content">
{}
</div>"#,
        escape(&chapter.title),
        content
    );
    xhtml_page(&chapter.title, language, Some(chapter.kind.epub_type()), None, &body)
}

fn xhtml_page(
    title: &str,
    language: &str,
    epub_type: Option<&str>,
    class: Option<&str>,
    body: &str,
) -> String {
    let mut body_attrs = String::new();
    if let Some(t) = epub_type {
        let _ = write!(body_attrs, r#" epub:type="{}""#, t);
    }
    if let Some(c) = class {
        let _ = write!(body_attrs, r#" class="{}""#, c);
    }
    let lang = escape(language);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{lang}" lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="{css}"/>
</head>
<body{body_attrs}>
{body}
</body>
</html>
"#,
        title = escape(title),
        css = STYLESHEET_FILENAME,
    )
}
