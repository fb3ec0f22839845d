//! Export history: the most recent archives per book, kept on disk.
//!
//! Layout: `{root}/{book_id}/index.json` plus one `{entry_id}.epub` per
//! record. The index lists entries oldest first.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::HistoryError;
use crate::security::check_book_id;

pub const DEFAULT_MAX_ENTRIES: usize = 10;
const INDEX_FILE: &str = "index.json";
const INDEX_TEMP_FILE: &str = "index.json.tmp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Hex SHA-256 of the stored archive.
    pub sha256: String,
}

impl HistoryEntry {
    fn filename(&self) -> String {
        format!("{}.epub", self.id)
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    root: PathBuf,
    max_entries: usize,
}

impl HistoryStore {
    pub fn new(root: PathBuf, max_entries: usize) -> Self {
        Self {
            root,
            max_entries: max_entries.max(1),
        }
    }

    /// `{data_dir}/ebook-export/history`
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|mut p| {
            p.push("ebook-export");
            p.push("history");
            p
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store one archive, then evict the oldest entries beyond capacity.
    ///
    /// The index is loaded before anything is written and replaced only
    /// once the new archive is on disk. Evicted archives are deleted after
    /// the new index is in place.
    pub fn record(&self, book_id: &str, title: &str, data: &[u8]) -> Result<HistoryEntry, HistoryError> {
        let dir = self.book_dir(book_id)?;
        std::fs::create_dir_all(&dir)?;
        let mut index = read_index(&dir)?;

        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().as_simple().to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
            size_bytes: data.len() as u64,
            sha256: sha256_hex(data),
        };
        let path = dir.join(entry.filename());
        std::fs::write(&path, data)?;

        index.push(entry.clone());
        let excess = index.len().saturating_sub(self.max_entries);
        let evicted: Vec<HistoryEntry> = index.drain(..excess).collect();
        if let Err(e) = write_index(&dir, &index) {
            if let Err(cleanup) = std::fs::remove_file(&path) {
                tracing::warn!("Could not remove unindexed archive {}: {}", path.display(), cleanup);
            }
            return Err(e);
        }

        for old in evicted {
            tracing::debug!("Evicting history entry {} for {}", old.id, book_id);
            match std::fs::remove_file(dir.join(old.filename())) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Could not remove evicted archive {}: {}", old.id, e),
            }
        }
        Ok(entry)
    }

    /// Entries for `book_id`, newest first. Unknown books have no entries.
    pub fn list(&self, book_id: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
        let dir = self.book_dir(book_id)?;
        let mut index = read_index(&dir)?;
        index.reverse();
        Ok(index)
    }

    pub fn get(&self, book_id: &str, entry_id: &str) -> Result<(HistoryEntry, Vec<u8>), HistoryError> {
        let dir = self.book_dir(book_id)?;
        let not_found = || HistoryError::NotFound {
            book_id: book_id.to_string(),
            entry: entry_id.to_string(),
        };
        let entry = read_index(&dir)?
            .into_iter()
            .find(|e| e.id == entry_id)
            .ok_or_else(not_found)?;
        let data = match std::fs::read(dir.join(entry.filename())) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if sha256_hex(&data) != entry.sha256 {
            tracing::warn!("Checksum mismatch for history entry {} of {}", entry.id, book_id);
            return Err(HistoryError::Checksum {
                book_id: book_id.to_string(),
                entry: entry.id,
            });
        }
        Ok((entry, data))
    }

    /// Remove every entry for `book_id`. Returns how many were removed.
    pub fn clear(&self, book_id: &str) -> Result<usize, HistoryError> {
        let dir = self.book_dir(book_id)?;
        if !dir.exists() {
            return Ok(0);
        }
        let count = read_index(&dir)?.len();
        std::fs::remove_dir_all(&dir)?;
        Ok(count)
    }

    fn book_dir(&self, book_id: &str) -> Result<PathBuf, HistoryError> {
        check_book_id(book_id)?;
        Ok(self.root.join(book_id))
    }
}

fn read_index(dir: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
    match std::fs::read_to_string(dir.join(INDEX_FILE)) {
        Ok(s) => Ok(serde_json::from_str(&s)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Written to a temporary file and renamed over the old index.
fn write_index(dir: &Path, index: &[HistoryEntry]) -> Result<(), HistoryError> {
    let json = serde_json::to_string_pretty(index)?;
    let temp = dir.join(INDEX_TEMP_FILE);
    std::fs::write(&temp, json)?;
    std::fs::rename(&temp, dir.join(INDEX_FILE))?;
    Ok(())
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
