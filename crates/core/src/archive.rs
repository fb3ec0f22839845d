//! OCF ZIP packaging.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArchiveError;

pub const MIMETYPE: &str = "application/epub+zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub data: Vec<u8>,
}

/// Archive members in write order. `mimetype` is not in the list; the
/// writer always emits it first.
#[derive(Debug, Default)]
pub struct EpubArchive {
    entries: Vec<ArchiveEntry>,
    /// Deflate level; `None` means the zip crate's default.
    compression_level: Option<i64>,
}

impl EpubArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression_level(mut self, level: Option<i64>) -> Self {
        self.compression_level = level;
        self
    }

    pub fn add_text(&mut self, path: impl Into<String>, text: String) {
        self.add_binary(path, text.into_bytes());
    }

    pub fn add_binary(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.entries.push(ArchiveEntry {
            path: path.into(),
            data,
        });
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to a ZIP buffer: `mimetype` stored, everything else deflated.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(self.compression_level);

        zip.start_file("mimetype", stored)?;
        zip.write_all(MIMETYPE.as_bytes())?;

        for entry in &self.entries {
            zip.start_file(entry.path.as_str(), deflated)?;
            zip.write_all(&entry.data)?;
        }

        let cursor = zip.finish()?;
        let buffer = cursor.into_inner();
        tracing::debug!("Packed {} entries into {} bytes", self.entries.len() + 1, buffer.len());
        Ok(buffer)
    }
}
