/// Top-level error type. Every fatal export failure surfaces as one of these.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Book model error: {0}")]
    Model(#[from] ModelError),

    #[error("Cover image error: {0}")]
    Cover(#[from] CoverError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Export history error: {0}")]
    History(#[from] HistoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid book model JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Recoverable per-chapter failure. Never escapes an export: the chapter is
/// converted with the fallback pass instead.
#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    #[error("HTML nesting depth {depth} exceeds limit of {limit}")]
    ExcessiveNesting { depth: u32, limit: u32 },

    #[error("Chapter HTML is {size} bytes, exceeding limit of {limit} bytes")]
    OversizedInput { size: usize, limit: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum DataUriError {
    #[error("Not a data URI")]
    NotDataUri,

    #[error("Data URI is not base64 encoded")]
    NotBase64,

    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum CoverError {
    #[error("Unreadable cover data URI: {0}")]
    DataUri(#[from] DataUriError),

    #[error("Unsupported cover media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Cover file {path} could not be read: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("EPUB serialization failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Invalid book id for history storage: {0}")]
    InvalidBookId(String),

    #[error("No history entry {entry} for book {book_id}")]
    NotFound { book_id: String, entry: String },

    #[error("Checksum mismatch for history entry {entry} of book {book_id}")]
    Checksum { book_id: String, entry: String },

    #[error("Corrupt history index: {0}")]
    Index(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}
