//! CLI commands

mod build;
mod completions;
mod doctor;
mod keystore;
mod validate;

pub use build::BuildCommand;
pub use completions::CompletionsCommand;
pub use doctor::DoctorCommand;
pub use keystore::KeystoreCommand;
pub use validate::ValidateCommand;

use std::path::{Path, PathBuf};

use tracing::debug;
use weblaunch_core::config::{load_config, load_config_or_default};
use weblaunch_core::HostToolchainConfig;

/// Load the explicit config file, or search from the working directory, and
/// resolve it against the environment
pub(crate) fn load_host_config(
    explicit: Option<&Path>,
) -> anyhow::Result<(HostToolchainConfig, Option<PathBuf>)> {
    let (config, path) = match explicit {
        Some(path) => (load_config(path)?, Some(path.to_path_buf())),
        None => load_config_or_default(&std::env::current_dir()?)?,
    };
    let host = config.resolve();
    debug!(
        config = ?path,
        sdk_root = ?host.sdk_root,
        java_home = ?host.java_home,
        "host configuration resolved"
    );
    Ok((host, path))
}
