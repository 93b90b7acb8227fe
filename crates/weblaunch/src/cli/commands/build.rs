//! Build command - turn a request file into an APK, an AAB and a keystore

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use weblaunch_core::{load_request, validate_request, BuildSpec, ContentSource};
use weblaunch_pipeline::{
    BuildJob, BuildOrchestrator, BuildSummary, DeliveryOptions, EventKind, JobStatus,
    ProgressEvent, ProgressReporter, TracingReporter,
};

use super::load_host_config;
use crate::cli::output::{self, format_size, header, key_value, path_style};
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::{self, CommandFailed};

/// Build an app from a request file
#[derive(Debug, Args)]
pub struct BuildCommand {
    /// Build request file (.toml, .yaml or .json)
    pub request: PathBuf,

    /// Also create a delivery zip with all artifacts and a README
    #[arg(long)]
    pub deliver: bool,

    /// Leave keystore passwords out of the delivery README
    #[arg(long, requires = "deliver")]
    pub no_bundle_credentials: bool,

    /// Configuration file (default: search from the working directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory to store artifacts in
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keep the build's working directory for inspection
    #[arg(long)]
    pub keep_work_dir: bool,
}

impl BuildCommand {
    /// Execute the build command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(request = %self.request.display(), deliver = self.deliver, "executing build command");
        // Run async operation in tokio runtime
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let (mut config, _) = load_host_config(self.config.as_deref())?;
        if let Some(ref output) = self.output {
            config.artifact_root = output.clone();
        }
        if self.keep_work_dir {
            config.keep_work_dirs = true;
        }

        let request = load_request(&self.request)?;
        let spec = validate_request(&request)?;

        let mut builder = BuildOrchestrator::builder(config).reporter(Arc::new(TracingReporter));
        let bar = if cli.shows_text() {
            let reporter = Arc::new(BarReporter::new(cli.verbose));
            builder = builder.reporter(reporter.clone());
            Some(reporter)
        } else {
            if cli.format == OutputFormat::Json {
                builder = builder.reporter(Arc::new(JsonLinesReporter));
            }
            None
        };
        let orchestrator = builder.build();

        if cli.shows_text() {
            print_header(&spec, &orchestrator);
        }

        let id = orchestrator.submit(spec);
        let mut job = tokio::select! {
            result = orchestrator.wait(&id) => result?,
            _ = tokio::signal::ctrl_c() => {
                warn!(build_id = %id, "interrupt received, cancelling build");
                orchestrator.cancel(&id)?;
                orchestrator.wait(&id).await?
            }
        };
        if let Some(bar) = bar {
            bar.finish();
        }

        if job.status == JobStatus::Succeeded && self.deliver {
            let options = DeliveryOptions {
                include_credentials: !self.no_bundle_credentials,
            };
            orchestrator.create_delivery_archive(&id, options).await?;
            if let Some(updated) = orchestrator.job(&id) {
                job = updated;
            }
        }

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(&BuildSummary::from(&job))?);
            }
            OutputFormat::Text if !cli.quiet && job.status == JobStatus::Succeeded => {
                print_success(&job);
            }
            OutputFormat::Text => {}
        }

        match job.status {
            JobStatus::Succeeded => Ok(()),
            JobStatus::Cancelled => {
                Err(CommandFailed::new(exit_codes::CANCELLED, "Build cancelled").into())
            }
            _ => {
                let message = match job.failure {
                    Some(ref failure) => format!(
                        "Build failed at {} stage: {}",
                        failure.stage_name(),
                        failure.message
                    ),
                    None => "Build failed".to_string(),
                };
                Err(CommandFailed::new(exit_codes::BUILD_FAILED, message).into())
            }
        }
    }
}

fn describe_source(source: &ContentSource) -> String {
    match source {
        ContentSource::Url(url) => url.clone(),
        ContentSource::Files { files, entry } => {
            let noun = if files.len() == 1 { "file" } else { "files" };
            format!("{} {}, starting at {}", files.len(), noun, entry)
        }
    }
}

fn print_header(spec: &BuildSpec, orchestrator: &BuildOrchestrator) {
    println!("{}", header(&format!("Building {}", spec.app_name)));
    println!("{}", key_value("Package", spec.package_id.as_str()));
    println!(
        "{}",
        key_value(
            "Version",
            &format!("{} ({})", spec.version_name, spec.version_code)
        )
    );
    println!("{}", key_value("Content", &describe_source(&spec.source)));
    println!("{}", key_value("Toolchain", orchestrator.toolchain_name()));
    println!();
}

fn print_success(job: &BuildJob) {
    println!();
    for note in &job.notes {
        output::warning(&note.message);
    }
    output::success(&format!(
        "Built {} {}",
        job.spec.app_name, job.spec.version_name
    ));

    let Some(ref artifacts) = job.artifacts else {
        return;
    };
    println!();
    println!("{}:", style("Artifacts").bold());
    for artifact in artifacts.iter() {
        println!(
            "  • {:<9} {} ({})",
            artifact.kind.to_string(),
            path_style().apply_to(artifact.path.display()),
            format_size(artifact.size)
        );
    }
    println!();
    output::info(&format!(
        "Keep the keystore and {} safe: every update must be signed with the same key",
        path_style().apply_to(artifacts.identity_record.display())
    ));
}

/// Progress bar for one build
struct BarReporter {
    bar: ProgressBar,
    verbose: bool,
}

impl BarReporter {
    fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, verbose }
    }

    fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for BarReporter {
    fn report(&self, event: &ProgressEvent) {
        self.bar.set_position(u64::from(event.percent));
        match event.kind {
            EventKind::Progress => {
                if self.verbose {
                    self.bar.println(format!(
                        "  {} {}",
                        style(format!("{:>3}%", event.percent)).dim(),
                        event.message
                    ));
                }
                self.bar.set_message(event.message.clone());
            }
            EventKind::Warning => {
                self.bar
                    .println(format!("{} {}", style("!").yellow().bold(), event.message));
            }
            EventKind::Succeeded | EventKind::Failed | EventKind::Cancelled => {
                self.bar.finish_and_clear();
            }
        }
    }
}

/// One JSON object per progress event on stdout
struct JsonLinesReporter;

impl ProgressReporter for JsonLinesReporter {
    fn report(&self, event: &ProgressEvent) {
        match event.to_json_line() {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "failed to serialize progress event"),
        }
    }
}
