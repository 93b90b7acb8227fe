//! Progress events published for every build

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobStatus};
use crate::stage::Stage;

/// Kind of progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Progress,
    Warning,
    Succeeded,
    Failed,
    Cancelled,
}

impl EventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Terminal event kind for a terminal status
    pub fn for_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Succeeded => Some(Self::Succeeded),
            JobStatus::Failed => Some(Self::Failed),
            JobStatus::Cancelled => Some(Self::Cancelled),
            JobStatus::Pending | JobStatus::Running => None,
        }
    }
}

/// One progress update for one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub build_id: JobId,
    pub stage: Option<Stage>,
    pub percent: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl ProgressEvent {
    pub fn new(
        build_id: JobId,
        kind: EventKind,
        stage: Option<Stage>,
        percent: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            build_id,
            stage,
            percent: percent.min(100),
            message: message.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Single-line JSON
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let event = ProgressEvent::new(
            JobId::new(),
            EventKind::Progress,
            Some(Stage::Compile),
            10,
            "Compiling sources",
        );
        let value: serde_json::Value =
            serde_json::from_str(&event.to_json_line().unwrap()).unwrap();
        assert_eq!(value["stage"], "compile");
        assert_eq!(value["kind"], "progress");
        assert_eq!(value["percent"], 10);
    }

    #[test]
    fn test_percent_capped() {
        let event = ProgressEvent::new(JobId::new(), EventKind::Succeeded, None, 250, "done");
        assert_eq!(event.percent, 100);
        assert!(event.is_terminal());
    }
}
