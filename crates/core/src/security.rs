//! Resource limits for untrusted chapter HTML and path guards for stored artifacts.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::error::{HistoryError, SanitizeError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Maximum DOM nesting depth the sanitizer walks before falling back.
    pub max_nesting_depth: u32,
    /// Maximum size of one chapter's HTML in bytes.
    pub max_chapter_size_bytes: usize,
    /// Maximum decoded size of one embedded image in bytes.
    pub max_resource_size_bytes: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_nesting_depth: 200,
            max_chapter_size_bytes: 64 * 1024 * 1024, // 64 MB
            max_resource_size_bytes: 50 * 1024 * 1024, // 50 MB
        }
    }
}

pub fn check_nesting_depth(depth: u32, limits: &SecurityLimits) -> Result<(), SanitizeError> {
    if depth > limits.max_nesting_depth {
        return Err(SanitizeError::ExcessiveNesting {
            depth,
            limit: limits.max_nesting_depth,
        });
    }
    Ok(())
}

pub fn check_chapter_size(size: usize, limits: &SecurityLimits) -> Result<(), SanitizeError> {
    if size > limits.max_chapter_size_bytes {
        return Err(SanitizeError::OversizedInput {
            size,
            limit: limits.max_chapter_size_bytes,
        });
    }
    Ok(())
}

pub fn resource_within_limit(size_bytes: u64, limits: &SecurityLimits) -> bool {
    size_bytes <= limits.max_resource_size_bytes
}

/// A book id becomes a directory name in the history store. Reject anything
/// that is not a single plain path component.
pub fn check_book_id(book_id: &str) -> Result<(), HistoryError> {
    let invalid = || HistoryError::InvalidBookId(book_id.to_string());

    if book_id.trim().is_empty() || book_id.contains('/') || book_id.contains('\\') {
        return Err(invalid());
    }
    if book_id.len() >= 2 && book_id.as_bytes()[1] == b':' {
        return Err(invalid());
    }
    let mut components = Path::new(book_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}
