//! Validate command

use std::path::PathBuf;

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use weblaunch_core::{load_request, validate_request, BuildSpec, ContentSource};

use super::load_host_config;
use crate::cli::{Cli, OutputFormat};

/// Check a request file without building
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Build request file (.toml, .yaml or .json)
    pub request: PathBuf,

    /// Configuration file to check as well
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Validation outcome for JSON output
#[derive(Debug, Serialize)]
struct ValidationReport {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    package_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_path: Option<PathBuf>,
    warnings: Vec<String>,
}

impl ValidationReport {
    fn for_spec(spec: &BuildSpec, config_path: Option<PathBuf>) -> Self {
        let mut warnings = Vec::new();
        if let ContentSource::Url(ref url) = spec.source {
            if url.starts_with("http://") {
                warnings.push("Site uses plain http; cleartext traffic will be allowed".to_string());
            }
        }
        if spec.icon.is_none() {
            warnings.push("No icon given; a generated launcher icon will be used".to_string());
        }
        if let Some(ref signing) = spec.signing {
            if !signing.keystore_path.is_file() {
                warnings.push(format!(
                    "Keystore {} does not exist; a new key will be created",
                    signing.keystore_path.display()
                ));
            }
        }

        Self {
            valid: true,
            app_name: Some(spec.app_name.clone()),
            package_id: Some(spec.package_id.to_string()),
            version_name: Some(spec.version_name.clone()),
            version_code: Some(spec.version_code),
            source: Some(if spec.source.is_url() { "url" } else { "files" }),
            config_path,
            warnings,
        }
    }
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(request = %self.request.display(), "executing validate command");

        let (_, config_path) = load_host_config(self.config.as_deref())?;
        let request = load_request(&self.request)?;
        let spec = validate_request(&request)?;
        let report = ValidationReport::for_spec(&spec, config_path);

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!(
                        "{} {} is valid",
                        style("✓").green().bold(),
                        self.request.display()
                    );
                    println!(
                        "  {} {} {} ({})",
                        style(&spec.app_name).bold(),
                        spec.package_id,
                        spec.version_name,
                        spec.version_code
                    );
                    if cli.verbose {
                        if let Some(ref path) = report.config_path {
                            println!("  {}: {}", style("Config").dim(), path.display());
                        }
                    }
                    for warning in &report.warnings {
                        println!("  {} {}", style("!").yellow(), warning);
                    }
                }
            }
        }

        Ok(())
    }
}
