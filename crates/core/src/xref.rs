//! Endnote links across chapter documents.
//!
//! In the editor a marker `href="#end{N}"` and its note's back link
//! `href="#ref{N}"` live in one page. Once every chapter is its own file
//! those same-document anchors must name the target file.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::model::{Chapter, EndnoteReference};

pub const ENDNOTES_TITLE: &str = "endnotes";

// `href` as a whole attribute name, with matching quotes around the anchor.
static END_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"(^|\s)href\s*=\s*(?:"#end(\d+)"|'#end(\d+)')"##).expect("valid end href regex")
});

static REF_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"(^|\s)href\s*=\s*(?:"#ref(\d+)"|'#ref(\d+)')"##).expect("valid ref href regex")
});

/// Leading whitespace, quote character and anchor number of one match.
fn href_parts<'c>(caps: &'c Captures<'_>) -> (&'c str, char, &'c str) {
    let lead = caps.get(1).map_or("", |m| m.as_str());
    match (caps.get(2), caps.get(3)) {
        (Some(n), _) => (lead, '"', n.as_str()),
        (None, Some(n)) => (lead, '\'', n.as_str()),
        (None, None) => (lead, '"', ""),
    }
}

/// `chapter{N}.xhtml` for the chapter at 0-based `index`.
pub fn chapter_filename(index: usize) -> String {
    format!("chapter{}.xhtml", index + 1)
}

/// Chapter id → archive filename, from position in the chapter list.
#[derive(Debug, Clone, Default)]
pub struct ChapterFileMap {
    by_id: HashMap<String, String>,
    endnotes_file: Option<String>,
}

impl ChapterFileMap {
    pub fn build(chapters: &[Chapter]) -> Self {
        let mut by_id = HashMap::with_capacity(chapters.len());
        let mut endnotes_file = None;
        for (i, ch) in chapters.iter().enumerate() {
            let filename = chapter_filename(i);
            if by_id.contains_key(&ch.id) {
                tracing::warn!("Duplicate chapter id '{}'; links resolve to its first occurrence", ch.id);
            } else {
                by_id.insert(ch.id.clone(), filename.clone());
            }
            if endnotes_file.is_none() && is_endnotes_chapter(ch) {
                endnotes_file = Some(filename);
            }
        }
        Self { by_id, endnotes_file }
    }

    pub fn filename_for(&self, chapter_id: &str) -> Option<&str> {
        self.by_id.get(chapter_id).map(String::as_str)
    }

    pub fn endnotes_file(&self) -> Option<&str> {
        self.endnotes_file.as_deref()
    }
}

pub fn is_endnotes_chapter(chapter: &Chapter) -> bool {
    chapter.title.trim().eq_ignore_ascii_case(ENDNOTES_TITLE)
}

pub struct CrossReferenceRewriter<'a> {
    files: &'a ChapterFileMap,
    references: &'a [EndnoteReference],
}

impl<'a> CrossReferenceRewriter<'a> {
    pub fn new(files: &'a ChapterFileMap, references: &'a [EndnoteReference]) -> Self {
        Self { files, references }
    }

    /// Rewrite one chapter's endnote hrefs. Links with no resolvable target
    /// are left exactly as they were.
    pub fn rewrite(&self, chapter: &Chapter, html: &str) -> String {
        if is_endnotes_chapter(chapter) {
            self.rewrite_back_links(html)
        } else {
            self.rewrite_forward_links(html)
        }
    }

    fn rewrite_forward_links(&self, html: &str) -> String {
        let Some(target) = self.files.endnotes_file() else {
            if END_HREF_RE.is_match(html) {
                tracing::debug!("Endnote markers present but no Endnotes chapter; links left as-is");
            }
            return html.to_string();
        };
        END_HREF_RE
            .replace_all(html, |caps: &Captures| {
                let (lead, q, n) = href_parts(caps);
                format!("{lead}href={q}{target}#end{n}{q}")
            })
            .into_owned()
    }

    fn rewrite_back_links(&self, html: &str) -> String {
        REF_HREF_RE
            .replace_all(html, |caps: &Captures| {
                let (lead, q, n) = href_parts(caps);
                let resolved = n
                    .parse::<u32>()
                    .ok()
                    .and_then(|n| self.references.iter().find(|r| r.number == n))
                    .and_then(|r| self.files.filename_for(&r.chapter_id));
                match resolved {
                    Some(target) => format!("{lead}href={q}{target}#ref{n}{q}"),
                    None => {
                        tracing::debug!("Unresolved endnote back link #ref{}", n);
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}
