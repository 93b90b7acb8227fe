//! Base module assembly for distribution bundles

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PackagerError, Result};
use crate::inventory::ArchiveInventory;
use crate::layout::{module, MANIFEST};
use crate::writer::ArchiveBuilder;

/// Inputs of the bundle module
#[derive(Debug, Clone)]
pub struct BundleModuleInputs {
    /// Resources linked in protobuf format (manifest, `res/**`, `resources.pb`)
    pub proto_resources: PathBuf,
    pub classes_dex: PathBuf,
    pub assets_dir: Option<PathBuf>,
}

/// Build the base module zip the bundle tool consumes.
///
/// The manifest moves to `manifest/`, bytecode to `dex/`; resources and
/// assets keep their paths.
pub fn build_bundle_module(inputs: &BundleModuleInputs, output: &Path) -> Result<ArchiveInventory> {
    let mut builder = ArchiveBuilder::new();

    builder.merge_archive(&inputs.proto_resources, |name| match name {
        MANIFEST => Some(module::MANIFEST.to_string()),
        n if n == module::RESOURCE_TABLE || n.starts_with("res/") => Some(n.to_string()),
        _ => None,
    })?;

    for required in [module::MANIFEST, module::RESOURCE_TABLE] {
        if !builder.contains(required) {
            return Err(PackagerError::MissingEntry {
                path: inputs.proto_resources.clone(),
                entry: required.to_string(),
            });
        }
    }

    if let Some(ref assets) = inputs.assets_dir {
        if assets.is_dir() {
            builder.add_dir("assets/", assets)?;
        }
    }

    builder.add_file(module::CLASSES_DEX, &inputs.classes_dex)?;
    builder.write_to(output)?;

    let inventory = ArchiveInventory::read(output)?;
    info!(path = %output.display(), entries = inventory.len(), "assembled bundle module");
    Ok(inventory)
}

/// Bundle tool configuration, in its JSON form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleConfig {
    pub compression: Compression,
    pub optimizations: Optimizations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compression {
    pub uncompressed_glob: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Optimizations {
    pub splits_config: SplitsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitsConfig {
    pub split_dimension: Vec<SplitDimension>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitDimension {
    pub value: String,
    pub negate: bool,
}

impl Default for BundleConfig {
    /// A single universal module: the shell has no native code and only
    /// launcher icons vary by density
    fn default() -> Self {
        let no_split = |value: &str| SplitDimension {
            value: value.to_string(),
            negate: true,
        };
        Self {
            compression: Compression {
                uncompressed_glob: vec!["res/raw/**".to_string()],
            },
            optimizations: Optimizations {
                splits_config: SplitsConfig {
                    split_dimension: vec![
                        no_split("ABI"),
                        no_split("SCREEN_DENSITY"),
                        no_split("LANGUAGE"),
                    ],
                },
            },
        }
    }
}

impl BundleConfig {
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
