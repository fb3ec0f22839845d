use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::ModelError;

/// Everything one export needs, as the editor hands it over. Never mutated
/// by the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookExportModel {
    /// Stable book id; keys the export history. Optional in editor payloads.
    pub id: Option<String>,
    pub title: String,
    pub author: String,
    pub blurb: String,
    pub publisher: String,
    pub pub_date: String,
    pub isbn: String,
    pub language: String,
    pub genre: String,
    pub tags: Vec<String>,
    /// `data:<mime>;base64,<payload>`
    pub cover_image: Option<String>,
    /// Reading order. Never resorted by kind.
    pub chapters: Vec<Chapter>,
    pub endnote_references: Vec<EndnoteReference>,
    pub typography_preset: Option<TypographyPreset>,
}

impl BookExportModel {
    pub fn from_json(s: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(s)?)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: ChapterKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterKind {
    Frontmatter,
    #[default]
    Content,
    Backmatter,
}

impl ChapterKind {
    /// `epub:type` structural semantic for the chapter body.
    pub fn epub_type(self) -> &'static str {
        match self {
            ChapterKind::Frontmatter => "frontmatter",
            ChapterKind::Content => "bodymatter",
            ChapterKind::Backmatter => "backmatter",
        }
    }
}

/// One forward-reference marker (`href="#end{number}"`) living in `chapter_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndnoteReference {
    pub id: String,
    pub number: u32,
    pub chapter_id: String,
    pub endnote_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypographyPreset {
    Novel,
    Nonfiction,
    Technical,
    Poetry,
    #[default]
    Default,
}

impl TypographyPreset {
    pub const ALL: [TypographyPreset; 5] = [
        TypographyPreset::Novel,
        TypographyPreset::Nonfiction,
        TypographyPreset::Technical,
        TypographyPreset::Poetry,
        TypographyPreset::Default,
    ];

    /// Parse from config / CLI string. Unknown names fall back to `Default`.
    pub fn from_name(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "novel" => TypographyPreset::Novel,
            "nonfiction" | "non-fiction" => TypographyPreset::Nonfiction,
            "technical" => TypographyPreset::Technical,
            "poetry" => TypographyPreset::Poetry,
            _ => TypographyPreset::Default,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypographyPreset::Novel => "novel",
            TypographyPreset::Nonfiction => "nonfiction",
            TypographyPreset::Technical => "technical",
            TypographyPreset::Poetry => "poetry",
            TypographyPreset::Default => "default",
        }
    }
}

pub const FALLBACK_TITLE: &str = "Untitled";
pub const FALLBACK_AUTHOR: &str = "Unknown Author";
pub const FALLBACK_TEXT: &str = "N/A";

/// Book metadata with every blank field replaced by its fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMetadata {
    pub title: String,
    pub author: String,
    pub blurb: String,
    pub publisher: String,
    pub pub_date: String,
    pub isbn: Option<String>,
    pub language: String,
    pub genre: Option<String>,
    pub tags: Vec<String>,
}

impl ResolvedMetadata {
    pub fn resolve(model: &BookExportModel, default_language: &str, now: DateTime<Utc>) -> Self {
        Self {
            title: or_fallback(&model.title, FALLBACK_TITLE),
            author: or_fallback(&model.author, FALLBACK_AUTHOR),
            blurb: or_fallback(&model.blurb, FALLBACK_TEXT),
            publisher: or_fallback(&model.publisher, FALLBACK_TEXT),
            pub_date: or_fallback(&model.pub_date, &now.format("%Y-%m-%d").to_string()),
            isbn: non_blank(&model.isbn),
            language: or_fallback(&model.language, default_language),
            genre: non_blank(&model.genre),
            tags: model.tags.iter().filter_map(|t| non_blank(t)).collect(),
        }
    }

    /// `dc:subject` values: genre first, then tags.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.genre
            .as_deref()
            .into_iter()
            .chain(self.tags.iter().map(String::as_str))
    }
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.nfc().collect())
    }
}

fn or_fallback(s: &str, fallback: &str) -> String {
    non_blank(s).unwrap_or_else(|| fallback.to_string())
}

/// Displayed title per chapter. Untitled content chapters are numbered in
/// sequence; front and back matter never take a number.
pub fn display_titles(chapters: &[Chapter]) -> Vec<String> {
    let mut content_count = 0u32;
    chapters
        .iter()
        .map(|ch| {
            if let Some(title) = non_blank(&ch.title) {
                return title;
            }
            match ch.kind {
                ChapterKind::Frontmatter => "Front Matter".to_string(),
                ChapterKind::Backmatter => "Back Matter".to_string(),
                ChapterKind::Content => {
                    content_count += 1;
                    format!("Chapter {}", content_count)
                }
            }
        })
        .collect()
}
