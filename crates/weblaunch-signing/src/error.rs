//! Error types for signing operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for signing operations
pub type Result<T> = std::result::Result<T, SigningError>;

/// Signing-related errors.
///
/// Every variant is fatal to the build that raised it; there is no unsigned
/// fallback.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Key tool not installed or not on PATH
    #[error("Signing tool not found: {tool}. {hint}")]
    ToolNotFound { tool: String, hint: String },

    /// Key tool ran but failed
    #[error("Signing tool failed: {tool} - {reason}")]
    ToolFailed { tool: String, reason: String },

    /// Key tool exceeded its time budget
    #[error("Signing tool {tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    /// Key tool claimed success but the keystore is not there
    #[error("Keystore was not created at {0}")]
    KeystoreMissing(PathBuf),

    /// Refusing to overwrite an existing keystore
    #[error("Keystore already exists at {0}")]
    KeystoreExists(PathBuf),

    /// Identity parameters rejected before running any tool
    #[error("Invalid signing identity: {0}")]
    InvalidIdentity(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
