//! weblaunch Pipeline - turns a build spec into signed Android artifacts
//!
//! A build runs in its own task through a fixed sequence of stages:
//!
//! 1. **prepare**: scaffold the project and obtain a signing identity
//! 2. **resources**, **compile**, **dex**: host toolchain steps
//! 3. **package**, **sign**: assemble and sign the installable package
//! 4. **align**: may fail; the signed package is used instead
//! 5. **bundle**: may fail; the build succeeds without a bundle
//!
//! [`BuildOrchestrator`] is the entry point. Job state lives in the
//! [`BuildRegistry`]; live progress is fanned out by the [`ProgressBroker`].
//! The host tools sit behind the [`Toolchain`] trait.

pub mod artifacts;
pub mod broker;
pub mod cancel;
pub mod error;
pub mod event;
mod executor;
pub mod icons;
pub mod job;
pub mod layout;
pub mod orchestrator;
pub mod output;
pub mod process;
pub mod registry;
pub mod reporter;
pub mod scaffold;
pub mod stage;
pub mod toolchain;

#[cfg(test)]
mod testing;

pub use artifacts::{Artifact, ArtifactHandle, ArtifactKind, Artifacts};
pub use broker::{ProgressBroker, Subscription};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use error::{PipelineError, PublishError, Result, ScaffoldError, StageError, ToolError};
pub use event::{EventKind, ProgressEvent};
pub use job::{BuildJob, FailurePoint, FailureRecord, JobId, JobNote, JobStatus, NoteKind};
pub use layout::BuildLayout;
pub use orchestrator::{BuildOrchestrator, DeliveryOptions, OrchestratorBuilder};
pub use output::{ArtifactSummary, BuildSummary};
pub use process::{ProcessRunner, ToolInvocation, ToolOutput};
pub use registry::BuildRegistry;
pub use reporter::{CollectingReporter, ProgressReporter, TracingReporter};
pub use scaffold::{scaffold_project, ScaffoldReport};
pub use stage::{FailurePolicy, Stage};
pub use toolchain::{AndroidSdkToolchain, PrerequisiteStatus, StageContext, ToolStatus, Toolchain};
