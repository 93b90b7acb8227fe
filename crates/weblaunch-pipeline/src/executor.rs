//! Runs one build from project skeleton to published artifacts

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use weblaunch_core::{BuildSpec, HostToolchainConfig};
use weblaunch_packager::{
    build_bundle_module, build_installable, rewrite_canonical, verify_bundle, verify_installable,
    BundleConfig, BundleModuleInputs, InstallableInputs, PackagerError,
};
use weblaunch_signing::{IdentityManager, IdentityRecord, SigningError, SigningIdentity};

use crate::artifacts::{Artifact, ArtifactKind, Artifacts};
use crate::cancel::CancelToken;
use crate::error::{PipelineError, PublishError, ScaffoldError, StageError, ToolError};
use crate::job::{FailurePoint, FailureRecord, JobId, JobNote, NoteKind};
use crate::layout::BuildLayout;
use crate::process::{require_output, ProcessRunner};
use crate::reporter::JobReporter;
use crate::scaffold::scaffold_project;
use crate::stage::{FailurePolicy, Stage};
use crate::toolchain::{StageContext, Toolchain};

/// Why a run stopped early
enum Abort {
    Cancelled,
    Failed(PipelineError),
}

impl From<ScaffoldError> for Abort {
    fn from(err: ScaffoldError) -> Self {
        Self::Failed(err.into())
    }
}

impl From<SigningError> for Abort {
    fn from(err: SigningError) -> Self {
        Self::Failed(err.into())
    }
}

impl From<StageError> for Abort {
    fn from(err: StageError) -> Self {
        Self::Failed(err.into())
    }
}

impl From<PublishError> for Abort {
    fn from(err: PublishError) -> Self {
        Self::Failed(err.into())
    }
}

/// Where a run error leaves the job
fn failure_record(err: &PipelineError) -> FailureRecord {
    match err {
        PipelineError::Stage(stage_err) => {
            FailureRecord::at_stage(stage_err.stage, stage_err.cause.to_string())
        }
        // The identity is obtained for the sign stage
        PipelineError::Signing(_) => FailureRecord::at_stage(Stage::Sign, err.to_string()),
        PipelineError::Publish(_) => FailureRecord::new(FailurePoint::Publish, err.to_string()),
        _ => FailureRecord::new(FailurePoint::Prepare, err.to_string()),
    }
}

/// Final outputs of the stages, before they are published
struct StageOutputs {
    apk: PathBuf,
    aab: Option<PathBuf>,
}

/// One build to run
pub(crate) struct JobRun {
    pub id: JobId,
    pub spec: Arc<BuildSpec>,
    pub reporter: JobReporter,
    pub cancel: CancelToken,
}

/// Drives a job through the stages with a given toolchain
pub(crate) struct Executor {
    pub config: Arc<HostToolchainConfig>,
    pub toolchain: Arc<dyn Toolchain>,
    pub identities: IdentityManager,
    pub runner: ProcessRunner,
}

impl Executor {
    /// Run `job` to a terminal state; never returns an error, every outcome
    /// is recorded through the job's reporter
    #[instrument(skip(self, job), fields(build_id = %job.id))]
    pub(crate) async fn run(&self, job: JobRun) {
        let id_str = job.id.to_string();
        let layout = BuildLayout::new(self.config.work_dir(&id_str));
        let artifact_dir = self.config.artifact_dir(&id_str);

        job.reporter.started();
        let outcome = self.execute(&job, &layout, &artifact_dir).await;

        if !self.config.keep_work_dirs {
            remove_dir(layout.root()).await;
        }

        match outcome {
            Ok(artifacts) => {
                let apk = artifacts.apk.path.clone();
                let bundle = artifacts.aab.is_some();
                if job.reporter.succeeded(artifacts, &job.cancel) {
                    info!(apk = %apk.display(), bundle, "build succeeded");
                } else {
                    info!("build cancelled after its artifacts were stored");
                    remove_dir(&artifact_dir).await;
                }
            }
            Err(Abort::Cancelled) => {
                remove_dir(&artifact_dir).await;
                job.reporter.cancelled();
            }
            Err(Abort::Failed(err)) => {
                let failure = failure_record(&err);
                warn!(stage = failure.stage_name(), error = %err, "build failed");
                remove_dir(&artifact_dir).await;
                job.reporter.failed(failure);
            }
        }
    }

    async fn execute(
        &self,
        job: &JobRun,
        layout: &BuildLayout,
        artifact_dir: &Path,
    ) -> Result<Artifacts, Abort> {
        if job.cancel.is_cancelled() {
            return Err(Abort::Cancelled);
        }

        self.prepare(job, layout).await?;

        let identity_dir = layout.identity_dir();
        let identity = tokio::select! {
            result = self.identities.get_or_create(&job.spec, &identity_dir) => result?,
            _ = job.cancel.cancelled() => return Err(Abort::Cancelled),
        };
        debug!(alias = %identity.key_alias, reused = identity.reused, "signing identity ready");

        let outputs = self.run_stages(job, layout, &identity).await?;

        if job.cancel.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        let artifacts = publish_artifacts(job.id, artifact_dir, &outputs, &identity).await?;
        if job.cancel.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        Ok(artifacts)
    }

    /// Write the project skeleton off the async runtime
    async fn prepare(&self, job: &JobRun, layout: &BuildLayout) -> Result<(), Abort> {
        let spec = job.spec.clone();
        let layout = layout.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<(), ScaffoldError> {
            std::fs::create_dir_all(layout.root()).map_err(|source| ScaffoldError::Write {
                path: layout.root().to_path_buf(),
                source,
            })?;
            scaffold_project(&spec, &layout)?;
            layout
                .create_build_dirs()
                .map_err(|source| ScaffoldError::Write {
                    path: layout.build_dir(),
                    source,
                })
        })
        .await;

        match result {
            Ok(result) => Ok(result?),
            Err(join) => Err(ScaffoldError::Aborted(join.to_string()).into()),
        }
    }

    async fn run_stages(
        &self,
        job: &JobRun,
        layout: &BuildLayout,
        identity: &SigningIdentity,
    ) -> Result<StageOutputs, Abort> {
        let mut outputs = StageOutputs {
            apk: layout.signed_apk(),
            aab: None,
        };

        for stage in Stage::ALL {
            if job.cancel.is_cancelled() {
                return Err(Abort::Cancelled);
            }
            job.reporter.stage_started(stage);

            let timeout = stage.timeout(&self.config.timeouts);
            let ctx = StageContext {
                job_id: job.id,
                stage,
                spec: &job.spec,
                layout,
                identity,
                runner: &self.runner,
                timeout,
                cancel: &job.cancel,
            };

            let result = match tokio::time::timeout(timeout, self.run_stage(&ctx)).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout {
                    tool: stage.to_string(),
                    seconds: timeout.as_secs(),
                }),
            };

            let err = match result {
                Ok(()) => {
                    match stage {
                        Stage::Align => outputs.apk = layout.aligned_apk(),
                        Stage::Bundle => outputs.aab = Some(layout.bundle()),
                        _ => {}
                    }
                    debug!(stage = %stage, "stage complete");
                    continue;
                }
                Err(err) => err,
            };

            if err.is_cancelled() || job.cancel.is_cancelled() {
                return Err(Abort::Cancelled);
            }

            match stage.failure_policy() {
                FailurePolicy::Fatal => {
                    return Err(StageError::new(stage, err).into());
                }
                FailurePolicy::Degrade => {
                    warn!(stage = %stage, error = %err, "continuing with unaligned package");
                    job.reporter.warning(JobNote {
                        kind: NoteKind::Degraded,
                        stage,
                        message: format!("Alignment skipped, package is signed but unaligned: {}", err),
                    });
                }
                FailurePolicy::Optional => {
                    warn!(stage = %stage, error = %err, "continuing without app bundle");
                    job.reporter.warning(JobNote {
                        kind: NoteKind::OptionalSkipped,
                        stage,
                        message: format!("App bundle not produced: {}", err),
                    });
                }
            }
        }

        Ok(outputs)
    }

    async fn run_stage(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        let layout = ctx.layout;
        let toolchain = &self.toolchain;

        match ctx.stage {
            Stage::Resources => {
                toolchain.compile_resources(ctx).await?;
                require_output(&layout.linked_resources())
            }
            Stage::Compile => {
                toolchain.compile_sources(ctx).await?;
                require_output(&layout.classes_dir())
            }
            Stage::Dex => {
                toolchain.lower_bytecode(ctx).await?;
                require_output(&layout.classes_dex())
            }
            Stage::Package => {
                let inputs = InstallableInputs {
                    linked_resources: layout.linked_resources(),
                    classes_dex: layout.classes_dex(),
                    assets_dir: Some(layout.assets_dir()),
                };
                let output = layout.unsigned_apk();
                blocking(move || build_installable(&inputs, &output).map(|_| ())).await?;
                require_output(&layout.unsigned_apk())
            }
            Stage::Sign => {
                toolchain
                    .sign(ctx, &layout.unsigned_apk(), &layout.signed_apk())
                    .await?;
                require_output(&layout.signed_apk())?;
                let signed = layout.signed_apk();
                blocking(move || {
                    rewrite_canonical(&signed)?;
                    verify_installable(&signed, true).map(|_| ())
                })
                .await
            }
            Stage::Align => {
                toolchain
                    .align(ctx, &layout.signed_apk(), &layout.aligned_apk())
                    .await?;
                require_output(&layout.aligned_apk())?;
                let aligned = layout.aligned_apk();
                blocking(move || verify_installable(&aligned, true).map(|_| ())).await
            }
            Stage::Bundle => {
                toolchain.link_bundle_resources(ctx).await?;
                require_output(&layout.proto_resources())?;

                let inputs = BundleModuleInputs {
                    proto_resources: layout.proto_resources(),
                    classes_dex: layout.classes_dex(),
                    assets_dir: Some(layout.assets_dir()),
                };
                let module = layout.bundle_module();
                let config = layout.bundle_config();
                blocking(move || {
                    build_bundle_module(&inputs, &module)?;
                    BundleConfig::default().write(&config)
                })
                .await?;

                toolchain.build_bundle(ctx).await?;
                require_output(&layout.unsigned_bundle())?;

                toolchain
                    .sign(ctx, &layout.unsigned_bundle(), &layout.bundle())
                    .await?;
                require_output(&layout.bundle())?;
                let bundle = layout.bundle();
                blocking(move || verify_bundle(&bundle).map(|_| ())).await
            }
        }
    }
}

/// Run archive work on the blocking pool
async fn blocking<F>(f: F) -> Result<(), ToolError>
where
    F: FnOnce() -> Result<(), PackagerError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ToolError::from),
        Err(join) => Err(ToolError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            join.to_string(),
        ))),
    }
}

/// Copy final outputs into the job's artifact directory
async fn publish_artifacts(
    id: JobId,
    artifact_dir: &Path,
    outputs: &StageOutputs,
    identity: &SigningIdentity,
) -> Result<Artifacts, PublishError> {
    let dir = artifact_dir.to_path_buf();
    let apk = outputs.apk.clone();
    let aab = outputs.aab.clone();
    let identity = identity.clone();

    let result = tokio::task::spawn_blocking(move || -> Result<Artifacts, PublishError> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PublishError::Io { path, source }
        };
        std::fs::create_dir_all(&dir).map_err(io(&dir))?;

        let copy = |kind: ArtifactKind, from: &Path| -> Result<Artifact, PublishError> {
            let to = dir.join(kind.file_name(&id));
            std::fs::copy(from, &to).map_err(io(&to))?;
            Artifact::from_file(kind, &to).map_err(io(&to))
        };

        let apk = copy(ArtifactKind::Apk, &apk)?;
        let aab = aab.as_deref().map(|p| copy(ArtifactKind::Aab, p)).transpose()?;
        let keystore = copy(ArtifactKind::Keystore, &identity.keystore_path)?;

        let record_path = dir.join(format!("{}.identity.json", id));
        let keystore_file = ArtifactKind::Keystore.file_name(&id);
        IdentityRecord::new(&identity, keystore_file)
            .write(&record_path)
            .map_err(PublishError::Record)?;

        Ok(Artifacts {
            apk,
            aab,
            keystore,
            identity_record: record_path,
            delivery: None,
        })
    })
    .await;

    match result {
        Ok(result) => result,
        Err(join) => Err(PublishError::Aborted(join.to_string())),
    }
}

async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "removed directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove directory"),
    }
}
