//! Error types for archive operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for packager operations
pub type Result<T> = std::result::Result<T, PackagerError>;

/// Packager errors
#[derive(Debug, Error)]
pub enum PackagerError {
    /// Reading or writing the zip container failed
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// File is not a usable archive
    #[error("Invalid archive {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    /// A required entry is absent
    #[error("{path} is missing required entry {entry}")]
    MissingEntry { path: PathBuf, entry: String },

    /// An entry name that cannot be placed in an archive
    #[error("Invalid entry name '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },

    /// Two inputs map to the same entry
    #[error("Duplicate archive entry '{0}'")]
    DuplicateEntry(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
