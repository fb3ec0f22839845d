pub mod archive;
pub mod assemble;
pub mod config;
pub mod cover;
pub mod css;
pub mod data_uri;
pub mod entities;
pub mod error;
pub mod export;
pub mod history;
pub mod images;
pub mod model;
pub mod progress;
pub mod sanitize;
pub mod security;
pub mod stats;
pub mod xref;

pub mod prelude {
    pub use crate::error::*;
    #[cfg(feature = "async")]
    pub use crate::export::export;
    pub use crate::export::{build_epub, EpubBuild, ExportOptions, ExportOutcome, ExportTarget};
    pub use crate::model::*;
}
