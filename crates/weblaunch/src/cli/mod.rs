//! CLI definition and command handling

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{BuildCommand, CompletionsCommand, DoctorCommand, KeystoreCommand, ValidateCommand};

/// weblaunch - turn a website or a folder of web files into a signed Android app
#[derive(Debug, Parser)]
#[command(name = "weblaunch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

impl Cli {
    /// Whether human-readable progress and summaries should be printed
    pub fn shows_text(&self) -> bool {
        self.format == OutputFormat::Text && !self.quiet
    }
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build an app from a request file
    Build(BuildCommand),

    /// Check a request file without building
    Validate(ValidateCommand),

    /// Check that the Android SDK and JDK tools are installed
    Doctor(DoctorCommand),

    /// Signing key operations
    Keystore(KeystoreCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Build(ref cmd) => cmd.execute(&self),
            Commands::Validate(ref cmd) => cmd.execute(&self),
            Commands::Doctor(ref cmd) => cmd.execute(&self),
            Commands::Keystore(ref cmd) => cmd.execute(&self),
            Commands::Completions(ref cmd) => cmd.execute(&self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_with_globals() {
        let cli = Cli::try_parse_from([
            "weblaunch",
            "--format",
            "json",
            "-C",
            "/tmp",
            "build",
            "app.toml",
            "--deliver",
            "--no-bundle-credentials",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        assert!(!cli.shows_text());
        match cli.command {
            Commands::Build(ref cmd) => {
                assert_eq!(cmd.request, std::path::PathBuf::from("app.toml"));
                assert!(cmd.deliver);
                assert!(cmd.no_bundle_credentials);
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["weblaunch", "-q", "-v", "doctor"]).is_err());
    }
}
