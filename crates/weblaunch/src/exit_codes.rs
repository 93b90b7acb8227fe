//! Exit codes for the CLI

use std::fmt;

use weblaunch_core::{ConfigError, CoreError, ValidationError};
use weblaunch_pipeline::PipelineError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Validation error
pub const VALIDATION_ERROR: i32 = 5;

/// The build ran and failed
pub const BUILD_FAILED: i32 = 10;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// A command outcome with its own exit code
#[derive(Debug)]
pub struct CommandFailed {
    pub code: i32,
    pub message: String,
}

impl CommandFailed {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandFailed {}

/// Exit code for an error returned by a command
pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(failed) = err.downcast_ref::<CommandFailed>() {
        return failed.code;
    }
    if err.downcast_ref::<ValidationError>().is_some() {
        return VALIDATION_ERROR;
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return CONFIG_ERROR;
    }
    match err.downcast_ref::<CoreError>() {
        Some(CoreError::Validation(_)) => return VALIDATION_ERROR,
        Some(CoreError::Config(_)) => return CONFIG_ERROR,
        _ => {}
    }
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Validation(_)) => VALIDATION_ERROR,
        _ => ERROR,
    }
}
