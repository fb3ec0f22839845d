//! `data:` URI parsing for covers and embedded chapter images.

use base64::Engine;

use crate::error::DataUriError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl DataUri {
    /// Parse `data:<mime>;base64,<payload>`. Whitespace inside the payload is
    /// tolerated (editors wrap long lines).
    pub fn parse(uri: &str) -> Result<Self, DataUriError> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or(DataUriError::NotDataUri)?;
        let (header, payload) = rest.split_once(',').ok_or(DataUriError::NotDataUri)?;
        let mut parts = header.split(';');
        let media_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(DataUriError::NotBase64);
        }
        let data = decode_base64(payload)?;
        Ok(Self { media_type, data })
    }

    pub fn extension(&self) -> Option<&'static str> {
        extension_for_media_type(&self.media_type)
    }
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DataUriError> {
    match base64::engine::general_purpose::STANDARD.decode(payload) {
        Ok(d) => Ok(d),
        Err(_) => {
            let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            Ok(base64::engine::general_purpose::STANDARD.decode(cleaned)?)
        }
    }
}

/// Archive extension for an image media type. `jpeg` is written as `jpg`.
pub fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    match media_type {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Manifest media type for an archive image extension.
pub fn media_type_for_extension(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
