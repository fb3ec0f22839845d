//! Cover image resolution: data URI from the editor, or raw file bytes.

use image::ImageFormat;

use crate::data_uri::{media_type_for_extension, DataUri};
use crate::error::CoverError;

/// A cover ready to be written as `OEBPS/cover.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub extension: &'static str,
    pub data: Vec<u8>,
}

impl CoverImage {
    /// Decode an editor-supplied `data:` URI. The declared media type decides
    /// the extension.
    pub fn from_data_uri(uri: &str) -> Result<Self, CoverError> {
        let parsed = DataUri::parse(uri)?;
        let extension = parsed
            .extension()
            .ok_or_else(|| CoverError::UnsupportedMediaType(parsed.media_type.clone()))?;
        Ok(Self {
            extension,
            data: parsed.data,
        })
    }

    /// Wrap file contents, sniffing the format from magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, CoverError> {
        let format = image::guess_format(&data)
            .map_err(|_| CoverError::UnsupportedMediaType("unrecognized image data".into()))?;
        let extension = match format {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
            other => {
                return Err(CoverError::UnsupportedMediaType(format!("{:?}", other)));
            }
        };
        Ok(Self { extension, data })
    }

    pub fn filename(&self) -> String {
        format!("cover.{}", self.extension)
    }

    pub fn media_type(&self) -> &'static str {
        media_type_for_extension(self.extension)
    }
}
