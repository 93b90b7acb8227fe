//! Keystore command - create a signing identity without running a build

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use weblaunch_core::SubjectFields;
use weblaunch_signing::{
    generate_password, DistinguishedName, IdentityManager, IdentityRecord, KeyRequest, Keytool,
    DEFAULT_KEY_ALIAS, DEFAULT_VALIDITY_DAYS,
};

use super::load_host_config;
use crate::cli::output::path_style;
use crate::cli::{Cli, OutputFormat};

/// Signing key operations
#[derive(Debug, Args)]
pub struct KeystoreCommand {
    #[command(subcommand)]
    pub command: KeystoreSubcommand,
}

/// Keystore subcommands
#[derive(Debug, Subcommand)]
pub enum KeystoreSubcommand {
    /// Create a new PKCS12 keystore with one RSA key pair
    Generate(GenerateCommand),
}

/// Create a new PKCS12 keystore with one RSA key pair
#[derive(Debug, Args)]
pub struct GenerateCommand {
    /// Keystore file to create
    #[arg(short, long, default_value = "release.keystore")]
    pub output: PathBuf,

    /// Key alias
    #[arg(long, default_value = DEFAULT_KEY_ALIAS)]
    pub alias: String,

    /// Keystore password (generated when omitted)
    #[arg(long, env = "WEBLAUNCH_KEYSTORE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Certificate common name
    #[arg(long)]
    pub name: Option<String>,

    /// Certificate organization
    #[arg(long)]
    pub organization: Option<String>,

    /// Certificate organizational unit
    #[arg(long)]
    pub unit: Option<String>,

    /// Certificate city
    #[arg(long)]
    pub city: Option<String>,

    /// Certificate state or province
    #[arg(long)]
    pub state: Option<String>,

    /// Two-letter country code
    #[arg(long)]
    pub country: Option<String>,

    /// Days the certificate stays valid
    #[arg(long, default_value_t = DEFAULT_VALIDITY_DAYS)]
    pub validity_days: u32,

    /// Configuration file (default: search from the working directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl KeystoreCommand {
    /// Execute the keystore command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            KeystoreSubcommand::Generate(cmd) => cmd.execute(cli),
        }
    }
}

impl GenerateCommand {
    fn subject(&self) -> SubjectFields {
        SubjectFields {
            developer: self.name.clone(),
            organization: self.organization.clone(),
            organizational_unit: self.unit.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
        }
    }

    fn request(&self) -> anyhow::Result<KeyRequest> {
        if let Some(ref country) = self.country {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                anyhow::bail!("Country must be a two-letter code, got '{}'", country);
            }
        }
        if self.validity_days == 0 {
            anyhow::bail!("Validity must be at least one day");
        }

        let password = match self.password {
            Some(ref password) if password.len() < 6 => {
                anyhow::bail!("Keystore password must be at least 6 characters")
            }
            Some(ref password) => password.clone(),
            None => generate_password(),
        };

        // PKCS12 has a single password for store and key
        let mut request = KeyRequest::new(
            self.alias.clone(),
            password.clone(),
            password,
            DistinguishedName::from_subject(&self.subject()),
        );
        request.validity_days = self.validity_days;
        Ok(request)
    }

    /// Execute the generate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(output = %self.output.display(), alias = %self.alias, "executing keystore generate command");
        let request = self.request()?;
        let (config, _) = load_host_config(self.config.as_deref())?;

        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let keytool = Keytool::locate(config.java_home.as_deref());
        let manager = IdentityManager::new(Arc::new(keytool), config.timeouts.identity);

        let runtime = tokio::runtime::Runtime::new()?;
        let identity = runtime.block_on(manager.create(request, &self.output))?;

        let keystore_file = self
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = IdentityRecord::new(&identity, keystore_file);
        let record_path = record_path_for(&self.output);
        record.write(&record_path)?;

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!(
                        "{} Created {}",
                        style("✓").green().bold(),
                        path_style().apply_to(self.output.display())
                    );
                    println!("  {}: {}", style("Alias").dim(), identity.key_alias);
                    if self.password.is_none() {
                        println!("  {}: {}", style("Password").dim(), identity.store_password);
                    }
                    println!(
                        "  {}: {}",
                        style("Credentials").dim(),
                        path_style().apply_to(record_path.display())
                    );
                }
            }
        }

        Ok(())
    }
}

/// `release.keystore` → `release.identity.json`
fn record_path_for(keystore: &Path) -> PathBuf {
    keystore.with_extension("identity.json")
}
