//! Embedded base64 images: pull them out of chapter HTML into archive files.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::data_uri::{decode_base64, media_type_for_extension};
use crate::security::{resource_within_limit, SecurityLimits};

pub const IMAGE_DIR: &str = "images";

static EMBEDDED_IMG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<img\b[^>]*?\ssrc\s*=\s*(?:"(data:image/(png|jpe?g);base64,([^"]*))"|'(data:image/(png|jpe?g);base64,([^']*))')[^>]*>"#,
    )
    .expect("valid embedded image regex")
});

/// One embedded image found in a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// The exact `<img ...>` tag text matched.
    pub source_tag: String,
    /// The `data:` URI inside `src`.
    pub data_uri: String,
    /// `png` or `jpg`.
    pub extension: &'static str,
    pub data: Vec<u8>,
    /// `image{N}.{ext}`, unique across the book.
    pub filename: String,
}

impl ExtractedImage {
    pub fn href(&self) -> String {
        format!("{}/{}", IMAGE_DIR, self.filename)
    }

    pub fn media_type(&self) -> &'static str {
        media_type_for_extension(self.extension)
    }

    /// Manifest item id: the filename without its extension.
    pub fn manifest_id(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map_or(self.filename.as_str(), |(stem, _)| stem)
    }
}

/// Hands out `image1`, `image2`, ... across every chapter of one export.
#[derive(Debug)]
pub struct ImageExtractor<'l> {
    next: u32,
    limits: &'l SecurityLimits,
}

impl<'l> ImageExtractor<'l> {
    pub fn new(limits: &'l SecurityLimits) -> Self {
        Self { next: 1, limits }
    }

    /// Find every embedded PNG/JPEG `<img>` in `html`, in document order.
    /// Undecodable or oversize payloads are skipped and keep their data URI.
    pub fn extract(&mut self, html: &str) -> Vec<ExtractedImage> {
        let mut images = Vec::new();
        for caps in EMBEDDED_IMG_RE.captures_iter(html) {
            let (uri, subtype, payload) = match (caps.get(1), caps.get(4)) {
                (Some(uri), _) => (uri, &caps[2], &caps[3]),
                (None, Some(uri)) => (uri, &caps[5], &caps[6]),
                (None, None) => continue,
            };
            let data = match decode_base64(payload) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Skipping embedded image with bad payload: {}", e);
                    continue;
                }
            };
            if !resource_within_limit(data.len() as u64, self.limits) {
                tracing::warn!(
                    "Skipping embedded image of {} bytes (limit {})",
                    data.len(),
                    self.limits.max_resource_size_bytes
                );
                continue;
            }
            let extension = if subtype.eq_ignore_ascii_case("png") { "png" } else { "jpg" };
            let filename = format!("image{}.{}", self.next, extension);
            self.next += 1;
            images.push(ExtractedImage {
                source_tag: caps[0].to_string(),
                data_uri: uri.as_str().to_string(),
                extension,
                data,
                filename,
            });
        }
        if !images.is_empty() {
            tracing::debug!("Extracted {} embedded image(s)", images.len());
        }
        images
    }
}

/// Point each extracted tag's `src` at its archive file. Other attributes
/// are left as they were.
pub fn rewrite_image_sources(html: &str, images: &[ExtractedImage]) -> String {
    let mut out = html.to_string();
    for image in images {
        let new_tag = image.source_tag.replacen(&image.data_uri, &image.href(), 1);
        out = out.replacen(&image.source_tag, &new_tag, 1);
    }
    out
}

/// Images keyed by assigned filename, in first-insertion order. A repeated
/// filename replaces the earlier image (last write wins).
#[derive(Debug, Default)]
pub struct ImageSet {
    order: Vec<String>,
    by_name: HashMap<String, ExtractedImage>,
}

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image: ExtractedImage) {
        if !self.by_name.contains_key(&image.filename) {
            self.order.push(image.filename.clone());
        }
        self.by_name.insert(image.filename.clone(), image);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractedImage> {
        self.order.iter().filter_map(|name| self.by_name.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
