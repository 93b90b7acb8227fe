//! weblaunch Core - shared foundation for the weblaunch build pipeline
//!
//! This crate provides the error types, host configuration, and the build
//! request validator that turns raw request fields into an immutable
//! [`BuildSpec`] the pipeline can execute.

pub mod config;
pub mod error;
pub mod spec;

pub use config::{Config, HostToolchainConfig, StageTimeouts};
pub use error::{ConfigError, CoreError, Result, ValidationError};
pub use spec::{
    load_request, validate_request, AppOptions, BuildRequest, BuildSpec, ContentFile,
    ContentSource, Orientation, PackageId, SigningOverride, SubjectFields,
};
