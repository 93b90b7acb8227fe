//! Error types for the build pipeline

use std::path::PathBuf;

use thiserror::Error;
use weblaunch_core::ValidationError;
use weblaunch_packager::PackagerError;
use weblaunch_signing::SigningError;

use crate::artifacts::ArtifactKind;
use crate::job::JobId;
use crate::stage::Stage;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline errors surfaced to callers of the orchestrator
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Build request rejected before any work started
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Project skeleton could not be written
    #[error(transparent)]
    Scaffold(#[from] ScaffoldError),

    /// No signing identity; always fatal
    #[error("Signing identity unavailable: {0}")]
    Signing(#[from] SigningError),

    /// A fatal stage failed
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Finished outputs could not be stored
    #[error("Failed to store artifacts: {0}")]
    Publish(#[from] PublishError),

    /// Archive assembly or verification failed
    #[error(transparent)]
    Packager(#[from] PackagerError),

    /// Unknown build id
    #[error("Build {0} not found")]
    JobNotFound(JobId),

    /// The build exists but has no such artifact
    #[error("Build {job} has no {kind} artifact")]
    ArtifactNotFound { job: JobId, kind: ArtifactKind },

    /// Operation needs a successfully finished build
    #[error("Build {0} has not succeeded")]
    JobNotSucceeded(JobId),

    /// Operation needs a finished build
    #[error("Build {0} is still running")]
    JobActive(JobId),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one external tool invocation or stage step
#[derive(Error, Debug)]
pub enum ToolError {
    /// Tool binary could not be located
    #[error("Required tool '{tool}' not found. {hint}")]
    NotFound { tool: String, hint: String },

    /// Tool could not be started
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool exited unsuccessfully
    #[error("{tool} exited with {}: {stderr}", describe_exit(.code))]
    Exit {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Tool exceeded its time budget and was killed
    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    /// Build was cancelled while the tool ran
    #[error("{tool} cancelled")]
    Cancelled { tool: String },

    /// Tool reported success but did not produce its output
    #[error("Expected output not found at {0}")]
    MissingOutput(PathBuf),

    /// In-process archive work failed
    #[error(transparent)]
    Package(#[from] PackagerError),

    /// Signing credentials problem during a stage
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

impl ToolError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// A stage failed
#[derive(Error, Debug)]
#[error("{stage} stage failed: {cause}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub cause: ToolError,
}

impl StageError {
    pub fn new(stage: Stage, cause: ToolError) -> Self {
        Self { stage, cause }
    }
}

/// Project skeleton errors
#[derive(Error, Debug)]
pub enum ScaffoldError {
    /// File source with nothing in it
    #[error("Content file list is empty")]
    EmptyContent,

    /// Writing a file failed
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Launcher icon could not be decoded or encoded
    #[error("Launcher icon error: {0}")]
    Icon(String),

    /// A content path escapes the assets directory
    #[error("Content path '{0}' is not allowed")]
    InvalidPath(String),

    /// The preparation task did not run to completion
    #[error("Project preparation aborted: {0}")]
    Aborted(String),
}

/// Copying finished outputs into the artifact directory failed
#[derive(Error, Debug)]
pub enum PublishError {
    /// Creating, copying or hashing a file failed
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Credentials record could not be written
    #[error("credentials record: {0}")]
    Record(#[source] SigningError),

    /// The copy task did not run to completion
    #[error("aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_display() {
        let err = ToolError::Exit {
            tool: "aapt2".to_string(),
            code: Some(1),
            stderr: "error: resource not found".to_string(),
        };
        assert_eq!(err.to_string(), "aapt2 exited with code 1: error: resource not found");

        let killed = ToolError::Exit {
            tool: "d8".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("a signal"));
    }

    #[test]
    fn test_stage_error_display() {
        let err = StageError::new(
            Stage::Compile,
            ToolError::Timeout {
                tool: "javac".to_string(),
                seconds: 300,
            },
        );
        assert_eq!(err.to_string(), "compile stage failed: javac timed out after 300s");
        assert_eq!(
            std::error::Error::source(&err).unwrap().to_string(),
            "javac timed out after 300s"
        );
    }

    #[test]
    fn test_publish_error_display() {
        let err = PipelineError::from(PublishError::Io {
            path: PathBuf::from("/srv/artifacts/job"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "Not a directory"),
        });
        assert_eq!(
            err.to_string(),
            "Failed to store artifacts: /srv/artifacts/job: Not a directory"
        );
    }
}
