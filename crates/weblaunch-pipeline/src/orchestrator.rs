//! Build orchestrator: the public entry point of the pipeline
//!
//! Accepts build specs, runs each as an independent task, and answers
//! queries about jobs, progress and artifacts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument};
use weblaunch_core::{validate_request, BuildRequest, BuildSpec, HostToolchainConfig};
use weblaunch_packager::{build_delivery_archive, DeliveryContents, KeystoreCredentials};
use weblaunch_signing::{IdentityManager, IdentityRecord, KeyGenerator, Keytool};

use crate::artifacts::{Artifact, ArtifactHandle, ArtifactKind};
use crate::broker::{ProgressBroker, Subscription};
use crate::cancel::{cancel_pair, CancelHandle};
use crate::error::{PipelineError, Result};
use crate::executor::{Executor, JobRun};
use crate::job::{BuildJob, JobId, JobStatus};
use crate::process::ProcessRunner;
use crate::registry::BuildRegistry;
use crate::reporter::{JobReporter, ProgressReporter};
use crate::toolchain::{AndroidSdkToolchain, PrerequisiteStatus, ToolStatus, Toolchain};

/// Options for [`BuildOrchestrator::create_delivery_archive`]
#[derive(Debug, Clone, Copy)]
pub struct DeliveryOptions {
    /// Print keystore passwords into the README
    pub include_credentials: bool,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            include_credentials: true,
        }
    }
}

/// Builder for [`BuildOrchestrator`]
pub struct OrchestratorBuilder {
    config: HostToolchainConfig,
    toolchain: Option<Arc<dyn Toolchain>>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    reporters: Vec<Arc<dyn ProgressReporter>>,
}

impl OrchestratorBuilder {
    pub fn new(config: HostToolchainConfig) -> Self {
        Self {
            config,
            toolchain: None,
            key_generator: None,
            reporters: Vec::new(),
        }
    }

    /// Use a specific toolchain instead of the Android SDK one
    pub fn toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Use a specific key generator instead of the JDK keytool
    pub fn key_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = Some(generator);
        self
    }

    /// Observe every progress event of every build
    pub fn reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn build(self) -> BuildOrchestrator {
        let config = Arc::new(self.config);
        let runner = ProcessRunner::new(config.max_concurrent_processes);

        let toolchain = self
            .toolchain
            .unwrap_or_else(|| Arc::new(AndroidSdkToolchain::new(&config)));
        let generator = self.key_generator.unwrap_or_else(|| {
            Arc::new(Keytool::locate(config.java_home.as_deref()).with_process_slots(runner.slots()))
        });
        let identities = IdentityManager::new(generator, config.timeouts.identity);

        info!(toolchain = toolchain.id(), processes = config.max_concurrent_processes, "build orchestrator ready");

        BuildOrchestrator {
            inner: Arc::new(Inner {
                registry: Arc::new(BuildRegistry::new()),
                broker: Arc::new(ProgressBroker::new(config.progress_buffer)),
                reporters: Arc::new(self.reporters),
                running: Mutex::new(HashMap::new()),
                executor: Arc::new(Executor {
                    config: config.clone(),
                    toolchain,
                    identities,
                    runner,
                }),
                config,
            }),
        }
    }
}

struct Inner {
    config: Arc<HostToolchainConfig>,
    registry: Arc<BuildRegistry>,
    broker: Arc<ProgressBroker>,
    reporters: Arc<Vec<Arc<dyn ProgressReporter>>>,
    executor: Arc<Executor>,
    /// Cancel handles of jobs still running
    running: Mutex<HashMap<JobId, CancelHandle>>,
}

/// Runs builds concurrently and tracks their state.
///
/// Cheap to clone; clones share all state. Submitting requires a running
/// tokio runtime.
#[derive(Clone)]
pub struct BuildOrchestrator {
    inner: Arc<Inner>,
}

impl BuildOrchestrator {
    /// Orchestrator with the default toolchain and key generator
    pub fn new(config: HostToolchainConfig) -> Self {
        OrchestratorBuilder::new(config).build()
    }

    pub fn builder(config: HostToolchainConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &HostToolchainConfig {
        &self.inner.config
    }

    pub fn toolchain_name(&self) -> &'static str {
        self.inner.executor.toolchain.name()
    }

    /// Validate a raw request and submit it
    pub fn submit_request(&self, request: &BuildRequest) -> Result<JobId> {
        let spec = validate_request(request)?;
        Ok(self.submit(spec))
    }

    /// Start building `spec` in the background
    #[instrument(skip(self, spec), fields(package = %spec.package_id))]
    pub fn submit(&self, spec: BuildSpec) -> JobId {
        let id = JobId::new();
        let spec = Arc::new(spec);
        let inner = &self.inner;

        inner.registry.insert(BuildJob::new(id, spec.clone()));
        inner.broker.register(id);

        let (handle, cancel) = cancel_pair();
        inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle);

        let run = JobRun {
            id,
            spec,
            reporter: JobReporter::new(
                id,
                inner.registry.clone(),
                inner.broker.clone(),
                inner.reporters.clone(),
            ),
            cancel,
        };

        let task_inner = inner.clone();
        tokio::spawn(async move {
            task_inner.executor.run(run).await;
            task_inner
                .running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        });

        info!(build_id = %id, "build submitted");
        id
    }

    /// Snapshot of a job
    pub fn job(&self, id: &JobId) -> Option<BuildJob> {
        self.inner.registry.get(id)
    }

    /// Snapshots of all jobs, oldest first
    pub fn jobs(&self) -> Vec<BuildJob> {
        self.inner.registry.list()
    }

    /// Follow a job's progress from now on
    pub fn subscribe(&self, id: &JobId) -> Option<Subscription> {
        self.inner.broker.subscribe(id)
    }

    /// One artifact of a succeeded job
    pub fn artifact(&self, id: &JobId, kind: ArtifactKind) -> Result<ArtifactHandle> {
        let job = self.succeeded_job(id)?;
        let artifact = job
            .artifacts
            .as_ref()
            .and_then(|a| a.get(kind))
            .cloned()
            .ok_or(PipelineError::ArtifactNotFound { job: *id, kind })?;
        Ok(ArtifactHandle {
            job_id: *id,
            artifact,
        })
    }

    /// Cancel a job.
    ///
    /// Returns true if the job will end `cancelled`, false if it had
    /// already finished. The signal is raised under the job's registry
    /// lock, so a job cannot record success after this returns true.
    pub fn cancel(&self, id: &JobId) -> Result<bool> {
        let running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = running.get(id) else {
            return match self.job(id) {
                Some(_) => Ok(false),
                None => Err(PipelineError::JobNotFound(*id)),
            };
        };

        let mut requested = false;
        self.inner
            .registry
            .update(id, |_| {
                handle.cancel();
                requested = true;
            })
            .ok_or(PipelineError::JobNotFound(*id))?;
        if requested {
            debug!(build_id = %id, "cancellation requested");
        }
        Ok(requested)
    }

    /// Drop a finished job's state and progress channel.
    ///
    /// Files in the artifact directory are left alone. Fails with
    /// [`PipelineError::JobActive`] while the job is still running.
    pub fn forget(&self, id: &JobId) -> Result<BuildJob> {
        let job = self.job(id).ok_or(PipelineError::JobNotFound(*id))?;
        // Terminal in the registry is recorded just before the terminal event
        if !job.is_terminal() || self.inner.broker.terminal_event(id).is_none() {
            return Err(PipelineError::JobActive(*id));
        }
        let job = self
            .inner
            .registry
            .remove(id)
            .ok_or(PipelineError::JobNotFound(*id))?;
        self.inner.broker.remove(id);
        debug!(build_id = %id, "build forgotten");
        Ok(job)
    }

    /// Wait for a job to reach a terminal state
    pub async fn wait(&self, id: &JobId) -> Result<BuildJob> {
        let subscription = self
            .subscribe(id)
            .ok_or(PipelineError::JobNotFound(*id))?;
        subscription.wait_terminal().await;
        self.job(id).ok_or(PipelineError::JobNotFound(*id))
    }

    /// Zip the artifacts of a succeeded job with a README
    #[instrument(skip(self))]
    pub async fn create_delivery_archive(
        &self,
        id: &JobId,
        options: DeliveryOptions,
    ) -> Result<Artifact> {
        let job = self.succeeded_job(id)?;
        let artifacts = job
            .artifacts
            .clone()
            .ok_or(PipelineError::JobNotSucceeded(*id))?;

        let output = self
            .inner
            .config
            .artifact_dir(&id.to_string())
            .join(ArtifactKind::Delivery.file_name(id));
        let spec = job.spec.clone();
        let id = *id;

        let artifact = tokio::task::spawn_blocking(move || -> Result<Artifact> {
            let credentials = if options.include_credentials {
                let record = IdentityRecord::read(&artifacts.identity_record)?;
                Some(KeystoreCredentials {
                    key_alias: record.key_alias,
                    store_password: record.store_password,
                    key_password: record.key_password,
                })
            } else {
                None
            };

            let contents = DeliveryContents {
                base_name: id.to_string(),
                app_name: spec.app_name.clone(),
                package_id: spec.package_id.to_string(),
                version_name: spec.version_name.clone(),
                version_code: spec.version_code,
                apk: artifacts.apk.path.clone(),
                aab: artifacts.aab.as_ref().map(|a| a.path.clone()),
                keystore: artifacts.keystore.path.clone(),
                credentials,
            };
            build_delivery_archive(&contents, &output)?;
            Ok(Artifact::from_file(ArtifactKind::Delivery, output)?)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))??;

        self.inner.registry.attach_delivery(&id, artifact.clone());
        info!(build_id = %id, path = %artifact.path.display(), "delivery archive created");
        Ok(artifact)
    }

    /// Check the toolchain and key tool are installed
    pub async fn check_prerequisites(&self) -> PrerequisiteStatus {
        let executor = &self.inner.executor;
        let status = executor.toolchain.check_prerequisites().await;
        let identities = &executor.identities;
        let keytool = if identities.is_available() {
            ToolStatus {
                name: identities.tool_name().to_string(),
                available: true,
                path: None,
                install_hint: String::new(),
            }
        } else {
            ToolStatus::missing(identities.tool_name(), "Install a JDK or set JAVA_HOME")
        };
        status.with_tool(keytool)
    }

    fn succeeded_job(&self, id: &JobId) -> Result<BuildJob> {
        let job = self.job(id).ok_or(PipelineError::JobNotFound(*id))?;
        if job.status != JobStatus::Succeeded {
            return Err(PipelineError::JobNotSucceeded(*id));
        }
        Ok(job)
    }
}
