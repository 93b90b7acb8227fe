//! Build registry: the state of record for every job

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::debug;

use crate::artifacts::Artifact;
use crate::job::{BuildJob, JobId};

/// Concurrency-safe map of job id to job state.
///
/// Each job has its own lock, so writers to different jobs never contend.
/// Readers always get a full snapshot. Two rules hold across all updates:
/// progress never goes backwards, and a terminal job is never modified.
#[derive(Default)]
pub struct BuildRegistry {
    jobs: RwLock<HashMap<JobId, Arc<RwLock<BuildJob>>>>,
}

impl BuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: BuildJob) {
        let id = job.id;
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(RwLock::new(job)));
        debug!(build_id = %id, "registered build");
    }

    fn entry(&self, id: &JobId) -> Option<Arc<RwLock<BuildJob>>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Snapshot of one job
    pub fn get(&self, id: &JobId) -> Option<BuildJob> {
        let entry = self.entry(id)?;
        let job = entry.read().unwrap_or_else(PoisonError::into_inner);
        Some(job.clone())
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.entry(id).is_some()
    }

    /// Apply `f` to a job.
    ///
    /// Returns the resulting snapshot, or `None` for an unknown id. Updates
    /// to a terminal job are discarded and the unchanged snapshot returned.
    pub fn update<F>(&self, id: &JobId, f: F) -> Option<BuildJob>
    where
        F: FnOnce(&mut BuildJob),
    {
        let entry = self.entry(id)?;
        let mut job = entry.write().unwrap_or_else(PoisonError::into_inner);

        if job.is_terminal() {
            debug!(build_id = %id, status = %job.status, "ignoring update to finished build");
            return Some(job.clone());
        }

        let previous_percent = job.percent;
        f(&mut job);
        job.percent = job.percent.clamp(previous_percent, 100);
        job.updated_at = Utc::now();
        if job.is_terminal() && job.finished_at.is_none() {
            job.finished_at = Some(job.updated_at);
        }

        Some(job.clone())
    }

    /// Record a delivery archive on a finished job.
    ///
    /// The only change a terminal job accepts: it adds an artifact without
    /// touching status or progress.
    pub fn attach_delivery(&self, id: &JobId, delivery: Artifact) -> Option<BuildJob> {
        let entry = self.entry(id)?;
        let mut job = entry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref mut artifacts) = job.artifacts {
            artifacts.delivery = Some(delivery);
            job.updated_at = Utc::now();
        }
        Some(job.clone())
    }

    /// Drop a finished job.
    ///
    /// Returns the final snapshot, or `None` if the id is unknown or the
    /// job has not reached a terminal state, in which case it is kept.
    pub fn remove(&self, id: &JobId) -> Option<BuildJob> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let snapshot = jobs
            .get(id)?
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if !snapshot.is_terminal() {
            return None;
        }
        jobs.remove(id);
        debug!(build_id = %id, "released build");
        Some(snapshot)
    }

    /// Snapshots of every job, oldest first
    pub fn list(&self) -> Vec<BuildJob> {
        let entries: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut jobs: Vec<BuildJob> = entries
            .iter()
            .map(|e| e.read().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{FailureRecord, JobStatus};
    use crate::stage::Stage;
    use weblaunch_core::{validate_request, BuildRequest};

    fn job() -> BuildJob {
        let spec = validate_request(&BuildRequest {
            app_name: Some("Demo".to_string()),
            package_name: Some("com.example.demo".to_string()),
            url: Some("https://example.org".to_string()),
            ..Default::default()
        })
        .unwrap();
        BuildJob::new(JobId::new(), Arc::new(spec))
    }

    #[test]
    fn test_percent_never_decreases() {
        let registry = BuildRegistry::new();
        let job = job();
        let id = job.id;
        registry.insert(job);

        registry.update(&id, |j| j.percent = 45);
        let snapshot = registry.update(&id, |j| j.percent = 10).unwrap();
        assert_eq!(snapshot.percent, 45);
    }

    #[test]
    fn test_terminal_job_is_frozen() {
        let registry = BuildRegistry::new();
        let job = job();
        let id = job.id;
        registry.insert(job);

        let failed = registry
            .update(&id, |j| {
                j.status = JobStatus::Failed;
                j.failure = Some(FailureRecord::at_stage(Stage::Dex, "d8 failed"));
            })
            .unwrap();
        assert!(failed.finished_at.is_some());

        let after = registry
            .update(&id, |j| {
                j.status = JobStatus::Succeeded;
                j.percent = 100;
            })
            .unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.percent, failed.percent);
        assert_eq!(after.updated_at, failed.updated_at);
    }

    #[test]
    fn test_remove_only_finished_jobs() {
        let registry = BuildRegistry::new();
        let job = job();
        let id = job.id;
        registry.insert(job);

        registry.update(&id, |j| j.status = JobStatus::Running);
        assert!(registry.remove(&id).is_none());
        assert!(registry.contains(&id));

        registry.update(&id, |j| j.status = JobStatus::Cancelled);
        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.status, JobStatus::Cancelled);
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_unknown_job() {
        let registry = BuildRegistry::new();
        let id = JobId::new();
        assert!(registry.get(&id).is_none());
        assert!(registry.update(&id, |j| j.percent = 1).is_none());
    }

    #[test]
    fn test_concurrent_updates_keep_max() {
        let registry = Arc::new(BuildRegistry::new());
        let job = job();
        let id = job.id;
        registry.insert(job);

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for p in 0..=10u8 {
                        registry.update(&id, |j| j.percent = p * 10 - i.min(p * 10));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.get(&id).unwrap().percent, 100);
    }
}
