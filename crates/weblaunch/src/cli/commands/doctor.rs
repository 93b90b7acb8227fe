//! Doctor command - check the host for the tools a build needs

use std::path::PathBuf;

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use weblaunch_pipeline::{BuildOrchestrator, PrerequisiteStatus, ToolStatus};

use super::load_host_config;
use crate::cli::{Cli, OutputFormat};

/// Check that the Android SDK and JDK tools are installed
#[derive(Debug, Args)]
pub struct DoctorCommand {
    /// Configuration file (default: search from the working directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Show install hints for missing tools
    #[arg(long)]
    pub fix: bool,
}

/// Everything doctor found, for JSON output
#[derive(Debug, Serialize)]
struct DoctorReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    config_path: Option<PathBuf>,
    sdk_root: Option<PathBuf>,
    java_home: Option<PathBuf>,
    artifact_root: PathBuf,
    #[serde(flatten)]
    status: PrerequisiteStatus,
}

impl DoctorCommand {
    /// Execute the doctor command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(fix = self.fix, "executing doctor command");
        let (config, config_path) = load_host_config(self.config.as_deref())?;

        let report = DoctorReport {
            config_path,
            sdk_root: config.sdk_root.clone(),
            java_home: config.java_home.clone(),
            artifact_root: config.artifact_root.clone(),
            status: PrerequisiteStatus::ok(),
        };

        let orchestrator = BuildOrchestrator::new(config);
        let runtime = tokio::runtime::Runtime::new()?;
        let status = runtime.block_on(orchestrator.check_prerequisites());
        let report = DoctorReport { status, ..report };

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    self.print_report(&report);
                }
            }
        }

        if !report.status.satisfied {
            anyhow::bail!("Required tools are missing, builds will fail");
        }
        Ok(())
    }

    fn print_report(&self, report: &DoctorReport) {
        println!("{}", style("Checking environment...").bold());
        println!();
        println!("  {}: {}", style("Android SDK").dim(), display_dir(&report.sdk_root));
        println!("  {}: {}", style("Java home").dim(), display_dir(&report.java_home));
        if let Some(ref path) = report.config_path {
            println!("  {}: {}", style("Config").dim(), path.display());
        }
        println!("  {}: {}", style("Artifacts").dim(), report.artifact_root.display());
        println!();

        for tool in &report.status.tools {
            print_tool(tool, self.fix);
        }
        for warning in &report.status.warnings {
            println!("  {} {}", style("!").yellow().bold(), warning);
        }

        println!();
        if report.status.satisfied {
            println!("{} Ready to build", style("✓").green().bold());
        } else if !self.fix {
            println!(
                "{}",
                style("Run with --fix to see how to install missing tools").dim()
            );
        }
    }
}

fn display_dir(dir: &Option<PathBuf>) -> String {
    match dir {
        Some(path) => path.display().to_string(),
        None => "not set".to_string(),
    }
}

fn print_tool(tool: &ToolStatus, fix: bool) {
    if tool.available {
        let location = tool.path.as_deref().unwrap_or("found");
        println!(
            "  {} {:<12} {}",
            style("✓").green(),
            tool.name,
            style(location).dim()
        );
    } else {
        println!("  {} {:<12} {}", style("✗").red(), tool.name, style("missing").red());
        if fix && !tool.install_hint.is_empty() {
            println!("      {}", tool.install_hint);
        }
    }
}
