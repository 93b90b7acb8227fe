//! Configuration validation

use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Lowest SDK level the generated WebView shell supports
pub const MIN_SUPPORTED_SDK: u32 = 19;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_toolchain(config)?;
    validate_timeouts(config)?;
    validate_runtime(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_toolchain(config: &Config) -> Result<()> {
    let toolchain = &config.toolchain;

    let platform_re = Regex::new(r"^android-\d+$").map_err(|e| {
        ConfigError::invalid("toolchain.platform", e.to_string())
    })?;
    if !platform_re.is_match(&toolchain.platform) {
        return Err(ConfigError::invalid(
            "toolchain.platform",
            "must look like \"android-<level>\"",
        )
        .into());
    }

    if toolchain.min_sdk < MIN_SUPPORTED_SDK {
        return Err(ConfigError::invalid(
            "toolchain.min_sdk",
            format!("must be at least {}", MIN_SUPPORTED_SDK),
        )
        .into());
    }

    if toolchain.min_sdk > toolchain.target_sdk {
        return Err(ConfigError::invalid(
            "toolchain.min_sdk",
            "cannot be greater than toolchain.target_sdk",
        )
        .into());
    }

    if let Some(ref version) = toolchain.build_tools_version {
        if version.trim().is_empty() {
            return Err(ConfigError::invalid(
                "toolchain.build_tools_version",
                "cannot be empty",
            )
            .into());
        }
    }

    Ok(())
}

fn validate_timeouts(config: &Config) -> Result<()> {
    let t = &config.timeouts;
    let fields = [
        ("timeouts.resources", t.resources),
        ("timeouts.compile", t.compile),
        ("timeouts.dex", t.dex),
        ("timeouts.package", t.package),
        ("timeouts.sign", t.sign),
        ("timeouts.align", t.align),
        ("timeouts.bundle", t.bundle),
        ("timeouts.identity", t.identity),
    ];

    for (field, value) in fields {
        if value == 0 {
            return Err(ConfigError::invalid(field, "timeout must be greater than zero").into());
        }
    }

    Ok(())
}

fn validate_runtime(config: &Config) -> Result<()> {
    if config.runtime.progress_buffer == 0 {
        return Err(ConfigError::invalid(
            "runtime.progress_buffer",
            "must be greater than zero",
        )
        .into());
    }

    if config.runtime.max_concurrent_processes == Some(0) {
        return Err(ConfigError::invalid(
            "runtime.max_concurrent_processes",
            "must be greater than zero",
        )
        .into());
    }

    Ok(())
}
