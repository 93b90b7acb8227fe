//! Build progress reporting

use std::sync::{Arc, Mutex, PoisonError};

use crate::artifacts::Artifacts;
use crate::broker::ProgressBroker;
use crate::cancel::CancelToken;
use crate::event::{EventKind, ProgressEvent};
use crate::job::{BuildJob, FailureRecord, JobId, JobNote, JobStatus};
use crate::registry::BuildRegistry;
use crate::stage::Stage;

/// Observer of every progress event, across all builds
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Logs events through tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: &ProgressEvent) {
        let stage = event.stage.map(|s| s.as_str()).unwrap_or("-");
        match event.kind {
            EventKind::Progress => {
                tracing::info!(build_id = %event.build_id, stage, percent = event.percent, "{}", event.message);
            }
            EventKind::Warning => {
                tracing::warn!(build_id = %event.build_id, stage, "{}", event.message);
            }
            EventKind::Succeeded => {
                tracing::info!(build_id = %event.build_id, "Build succeeded: {}", event.message);
            }
            EventKind::Failed => {
                tracing::error!(build_id = %event.build_id, stage, "Build failed: {}", event.message);
            }
            EventKind::Cancelled => {
                tracing::info!(build_id = %event.build_id, "Build cancelled");
            }
        }
    }
}

/// Collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingReporter {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_for(&self, id: &JobId) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|e| &e.build_id == id)
            .collect()
    }
}

impl ProgressReporter for CollectingReporter {
    fn report(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Records one job's transitions.
///
/// Every transition updates the registry first, then publishes the event
/// built from the resulting snapshot, so a subscriber never sees progress
/// the registry does not yet reflect.
#[derive(Clone)]
pub(crate) struct JobReporter {
    id: JobId,
    registry: Arc<BuildRegistry>,
    broker: Arc<ProgressBroker>,
    reporters: Arc<Vec<Arc<dyn ProgressReporter>>>,
}

impl JobReporter {
    pub(crate) fn new(
        id: JobId,
        registry: Arc<BuildRegistry>,
        broker: Arc<ProgressBroker>,
        reporters: Arc<Vec<Arc<dyn ProgressReporter>>>,
    ) -> Self {
        Self {
            id,
            registry,
            broker,
            reporters,
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    fn transition<F>(&self, kind: EventKind, f: F) -> Option<BuildJob>
    where
        F: FnOnce(&mut BuildJob),
    {
        self.transition_with(|job| {
            f(job);
            kind
        })
    }

    /// Like `transition`, with the event kind decided under the job's lock
    fn transition_with<F>(&self, f: F) -> Option<BuildJob>
    where
        F: FnOnce(&mut BuildJob) -> EventKind,
    {
        let mut applied = None;
        let snapshot = self.registry.update(&self.id, |job| applied = Some(f(job)))?;
        // Discarded: the job was already terminal
        let kind = applied?;
        self.emit(ProgressEvent::new(
            self.id,
            kind,
            snapshot.stage,
            snapshot.percent,
            snapshot.message.clone(),
        ));
        Some(snapshot)
    }

    fn emit(&self, event: ProgressEvent) {
        if self.broker.publish(event.clone()) {
            for reporter in self.reporters.iter() {
                reporter.report(&event);
            }
        }
    }

    /// Job picked up; preparing the project
    pub(crate) fn started(&self) {
        self.transition(EventKind::Progress, |job| {
            job.status = JobStatus::Running;
            job.message = "Preparing project".to_string();
        });
    }

    pub(crate) fn stage_started(&self, stage: Stage) {
        self.transition(EventKind::Progress, |job| {
            job.status = JobStatus::Running;
            job.stage = Some(stage);
            job.percent = stage.entry_percent();
            job.message = stage.describe().to_string();
        });
    }

    /// Record a non-fatal problem
    pub(crate) fn warning(&self, note: JobNote) {
        self.transition(EventKind::Warning, |job| {
            job.message = note.message.clone();
            job.notes.push(note);
        });
    }

    /// Record success, or cancellation if it was requested first.
    ///
    /// Returns false when the job ended cancelled instead.
    pub(crate) fn succeeded(&self, artifacts: Artifacts, cancel: &CancelToken) -> bool {
        let snapshot = self.transition_with(|job| {
            if cancel.is_cancelled() {
                job.status = JobStatus::Cancelled;
                job.message = "Build cancelled".to_string();
                return EventKind::Cancelled;
            }
            job.status = JobStatus::Succeeded;
            job.percent = 100;
            job.message = "Build complete".to_string();
            job.artifacts = Some(artifacts);
            EventKind::Succeeded
        });
        snapshot.map_or(false, |job| job.status == JobStatus::Succeeded)
    }

    pub(crate) fn failed(&self, failure: FailureRecord) {
        self.transition(EventKind::Failed, |job| {
            job.status = JobStatus::Failed;
            if let Some(stage) = failure.stage() {
                job.stage = Some(stage);
            }
            job.message = failure.message.clone();
            job.failure = Some(failure);
        });
    }

    pub(crate) fn cancelled(&self) {
        self.transition(EventKind::Cancelled, |job| {
            job.status = JobStatus::Cancelled;
            job.message = "Build cancelled".to_string();
        });
    }
}
