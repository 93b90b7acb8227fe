//! Structured build summaries for machine-readable output

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::artifacts::{Artifact, ArtifactKind};
use crate::job::{BuildJob, FailureRecord, JobId, JobNote, JobStatus};
use crate::stage::Stage;

/// Summary of one build, safe to print: no credentials
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub build_id: JobId,
    pub status: JobStatus,
    pub success: bool,
    pub app_name: String,
    pub package_id: String,
    pub version_name: String,
    pub version_code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<JobNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// One produced file
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub kind: ArtifactKind,
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

impl From<&Artifact> for ArtifactSummary {
    fn from(artifact: &Artifact) -> Self {
        Self {
            kind: artifact.kind,
            path: artifact.path.display().to_string(),
            size: artifact.size,
            sha256: artifact.sha256.clone(),
        }
    }
}

/// Failure with the stage rendered by name
#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub stage: &'static str,
    pub message: String,
}

impl From<&FailureRecord> for FailureSummary {
    fn from(record: &FailureRecord) -> Self {
        Self {
            stage: record.stage_name(),
            message: record.message.clone(),
        }
    }
}

impl From<&BuildJob> for BuildSummary {
    fn from(job: &BuildJob) -> Self {
        Self {
            build_id: job.id,
            status: job.status,
            success: job.status == JobStatus::Succeeded,
            app_name: job.spec.app_name.clone(),
            package_id: job.spec.package_id.to_string(),
            version_name: job.spec.version_name.clone(),
            version_code: job.spec.version_code,
            stage: job.stage,
            percent: job.percent,
            message: job.message.clone(),
            artifacts: job
                .artifacts
                .iter()
                .flat_map(|a| a.iter())
                .map(ArtifactSummary::from)
                .collect(),
            notes: job.notes.clone(),
            failure: job.failure.as_ref().map(FailureSummary::from),
            created_at: job.created_at,
            finished_at: job.finished_at,
            duration_ms: job.duration().map(|d| d.num_milliseconds()),
        }
    }
}

impl BuildSummary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::job::FailurePoint;
    use weblaunch_core::{validate_request, BuildRequest};

    #[test]
    fn test_failed_summary_json() {
        let spec = validate_request(&BuildRequest {
            app_name: Some("Demo".to_string()),
            package_name: Some("com.example.demo".to_string()),
            url: Some("https://example.org".to_string()),
            ..Default::default()
        })
        .unwrap();
        let mut job = BuildJob::new(JobId::new(), Arc::new(spec));
        job.status = JobStatus::Failed;
        job.failure = Some(FailureRecord::new(FailurePoint::Prepare, "disk full"));

        let summary = BuildSummary::from(&job);
        assert!(!summary.success);

        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["failure"]["stage"], "prepare");
        assert!(value.get("artifacts").is_none());
    }
}
