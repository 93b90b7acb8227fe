//! Build jobs and their lifecycle state

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use weblaunch_core::BuildSpec;

use crate::artifacts::Artifacts;
use crate::stage::Stage;

/// Build identifier, assigned at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of non-fatal note attached to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// A stage failed and the job fell back to the previous output
    Degraded,
    /// An optional stage failed and its artifact is absent
    OptionalSkipped,
}

/// Non-fatal problem recorded on a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNote {
    pub kind: NoteKind,
    pub stage: Stage,
    pub message: String,
}

/// Where a failed job stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "stage", rename_all = "lowercase")]
pub enum FailurePoint {
    /// Writing the project, before the first stage
    Prepare,
    /// A stage, or the signing identity the sign stage needs
    Stage(Stage),
    /// Copying finished outputs into the artifact directory
    Publish,
}

impl FailurePoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Stage(stage) => stage.as_str(),
            Self::Publish => "publish",
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage(stage) => Some(*stage),
            _ => None,
        }
    }
}

impl fmt::Display for FailurePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub at: FailurePoint,
    pub message: String,
}

impl FailureRecord {
    pub fn new(at: FailurePoint, message: impl Into<String>) -> Self {
        Self {
            at,
            message: message.into(),
        }
    }

    pub fn at_stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(FailurePoint::Stage(stage), message)
    }

    /// The failed stage, if the job stopped inside one
    pub fn stage(&self) -> Option<Stage> {
        self.at.stage()
    }

    /// `prepare`, a stage name, or `publish`
    pub fn stage_name(&self) -> &'static str {
        self.at.as_str()
    }
}

/// Snapshot of one build
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub id: JobId,
    pub spec: Arc<BuildSpec>,
    /// Stage currently running, or the last one entered
    pub stage: Option<Stage>,
    /// 0-100, never decreases
    pub percent: u8,
    pub message: String,
    pub status: JobStatus,
    /// Present once the job succeeded
    pub artifacts: Option<Artifacts>,
    pub notes: Vec<JobNote>,
    /// Present once the job failed
    pub failure: Option<FailureRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildJob {
    pub fn new(id: JobId, spec: Arc<BuildSpec>) -> Self {
        let now = Utc::now();
        Self {
            id,
            spec,
            stage: None,
            percent: 0,
            message: "Queued".to_string(),
            status: JobStatus::Pending,
            artifacts: None,
            notes: Vec::new(),
            failure: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock time from submission to completion
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|f| f - self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_round_trip() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_failure_stage_name() {
        let record = FailureRecord::new(FailurePoint::Prepare, "disk full");
        assert_eq!(record.stage_name(), "prepare");
        assert_eq!(record.stage(), None);

        let record = FailureRecord::at_stage(Stage::Sign, "keytool missing");
        assert_eq!(record.stage_name(), "sign");
        assert_eq!(record.stage(), Some(Stage::Sign));

        let record = FailureRecord::new(FailurePoint::Publish, "disk full");
        assert_eq!(record.stage_name(), "publish");
        assert_eq!(record.stage(), None);
    }

    #[test]
    fn test_failure_point_serializes_with_stage() {
        let json = serde_json::to_value(FailurePoint::Stage(Stage::Dex)).unwrap();
        assert_eq!(json, serde_json::json!({"phase": "stage", "stage": "dex"}));
        let json = serde_json::to_value(FailurePoint::Publish).unwrap();
        assert_eq!(json, serde_json::json!({"phase": "publish"}));
    }
}
