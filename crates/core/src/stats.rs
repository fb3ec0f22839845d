//! Per-export report: what went into the archive.

use scraper::Html;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportReport {
    pub chapter_count: u32,
    pub image_count: u32,
    pub has_cover: bool,
    pub word_count: u64,
    /// Chapters converted with the fallback pass, by 1-based position.
    pub degraded_chapters: Vec<u32>,
    pub archive_size_bytes: u64,
    pub estimated_reading_time_minutes: f32,
}

impl ExportReport {
    pub fn add_chapter_text(&mut self, xhtml: &str) {
        self.word_count += count_words(&text_content(xhtml));
    }

    pub fn finish(&mut self, archive_size_bytes: u64) {
        self.archive_size_bytes = archive_size_bytes;
        self.estimated_reading_time_minutes = self.word_count as f32 / 200.0;
    }
}

pub fn count_words(text: &str) -> u64 {
    text.unicode_words().count() as u64
}

/// Text content of an XHTML fragment, one space between text nodes.
fn text_content(xhtml: &str) -> String {
    Html::parse_fragment(xhtml)
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
}
