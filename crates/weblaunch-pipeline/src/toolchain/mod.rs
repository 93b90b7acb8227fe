//! Toolchain adapters
//!
//! A [`Toolchain`] performs the external steps of a build. The executor
//! decides when each step runs and what it must produce; the adapter only
//! knows how to invoke the host tools.

mod android;

pub use android::AndroidSdkToolchain;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use weblaunch_core::BuildSpec;
use weblaunch_signing::SigningIdentity;

use crate::cancel::CancelToken;
use crate::error::ToolError;
use crate::job::JobId;
use crate::layout::BuildLayout;
use crate::process::{ProcessRunner, ToolInvocation, ToolOutput};
use crate::stage::Stage;

/// Everything a toolchain step may read
pub struct StageContext<'a> {
    pub job_id: JobId,
    pub stage: Stage,
    pub spec: &'a BuildSpec,
    pub layout: &'a BuildLayout,
    pub identity: &'a SigningIdentity,
    pub runner: &'a ProcessRunner,
    /// Budget for a single tool invocation
    pub timeout: Duration,
    pub cancel: &'a CancelToken,
}

impl StageContext<'_> {
    /// Run a tool with this stage's timeout and cancellation
    pub async fn run(&self, inv: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        tracing::debug!(build_id = %self.job_id, stage = %self.stage, tool = %inv.tool, "invoking tool");
        self.runner.run(inv, self.timeout, self.cancel).await
    }
}

/// Adapter over a host toolchain
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Unique identifier, e.g. "android-sdk"
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Check the required tools are installed
    async fn check_prerequisites(&self) -> PrerequisiteStatus;

    /// Compile and link resources into `layout.linked_resources()`, and
    /// generate the resource class into `layout.gen_dir()`
    async fn compile_resources(&self, ctx: &StageContext<'_>) -> Result<(), ToolError>;

    /// Compile generated and entry-point sources into `layout.classes_dir()`
    async fn compile_sources(&self, ctx: &StageContext<'_>) -> Result<(), ToolError>;

    /// Lower compiled classes into `layout.classes_dex()`
    async fn lower_bytecode(&self, ctx: &StageContext<'_>) -> Result<(), ToolError>;

    /// Sign `input` with the job's identity, writing `output`
    async fn sign(&self, ctx: &StageContext<'_>, input: &Path, output: &Path)
        -> Result<(), ToolError>;

    /// Align `input`, writing `output`
    async fn align(&self, ctx: &StageContext<'_>, input: &Path, output: &Path)
        -> Result<(), ToolError>;

    /// Link resources in protobuf form into `layout.proto_resources()`
    async fn link_bundle_resources(&self, ctx: &StageContext<'_>) -> Result<(), ToolError>;

    /// Build `layout.unsigned_bundle()` from the module and config
    async fn build_bundle(&self, ctx: &StageContext<'_>) -> Result<(), ToolError>;
}

/// Status of prerequisites check
#[derive(Debug, Clone, Serialize)]
pub struct PrerequisiteStatus {
    pub satisfied: bool,
    pub tools: Vec<ToolStatus>,
    pub warnings: Vec<String>,
}

impl PrerequisiteStatus {
    pub fn ok() -> Self {
        Self {
            satisfied: true,
            tools: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add a required tool; a missing one unsatisfies the status
    pub fn with_tool(mut self, tool: ToolStatus) -> Self {
        if !tool.available {
            self.satisfied = false;
        }
        self.tools.push(tool);
        self
    }

    /// Add an optional tool; a missing one only warns
    pub fn with_optional_tool(mut self, tool: ToolStatus, consequence: &str) -> Self {
        if !tool.available {
            self.warnings
                .push(format!("{} not found: {}", tool.name, consequence));
        }
        self.tools.push(tool);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn missing(&self) -> impl Iterator<Item = &ToolStatus> {
        self.tools.iter().filter(|t| !t.available)
    }
}

/// Status of one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
    pub path: Option<String>,
    pub install_hint: String,
}

impl ToolStatus {
    pub fn found(name: impl Into<String>, path: &Path) -> Self {
        Self {
            name: name.into(),
            available: true,
            path: Some(path.display().to_string()),
            install_hint: String::new(),
        }
    }

    pub fn missing(name: impl Into<String>, install_hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: false,
            path: None,
            install_hint: install_hint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_tool_missing_unsatisfies() {
        let status = PrerequisiteStatus::ok()
            .with_tool(ToolStatus::found("aapt2", Path::new("/sdk/aapt2")))
            .with_tool(ToolStatus::missing("d8", "Install Android build-tools"));
        assert!(!status.satisfied);
        assert_eq!(status.missing().count(), 1);
    }

    #[test]
    fn test_optional_tool_only_warns() {
        let status = PrerequisiteStatus::ok().with_optional_tool(
            ToolStatus::missing("zipalign", "Install Android build-tools"),
            "packages will not be aligned",
        );
        assert!(status.satisfied);
        assert_eq!(status.warnings.len(), 1);
        assert!(status.warnings[0].starts_with("zipalign"));
    }
}
