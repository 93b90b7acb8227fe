//! Unsigned installable package assembly

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{PackagerError, Result};
use crate::inventory::ArchiveInventory;
use crate::layout::{CLASSES_DEX, MANIFEST, META_INF, RESOURCE_TABLE};
use crate::writer::ArchiveBuilder;

/// Outputs of the earlier stages that make up an installable package
#[derive(Debug, Clone)]
pub struct InstallableInputs {
    /// Linked resources archive (manifest, `res/**`, `resources.arsc`)
    pub linked_resources: PathBuf,
    /// Lowered bytecode
    pub classes_dex: PathBuf,
    /// Web content, added under `assets/`
    pub assets_dir: Option<PathBuf>,
}

/// Assemble an unsigned package at `output`.
///
/// Signing metadata in the inputs is dropped; the signing stage adds its own.
pub fn build_installable(inputs: &InstallableInputs, output: &Path) -> Result<ArchiveInventory> {
    let mut builder = ArchiveBuilder::new();

    builder.merge_archive(&inputs.linked_resources, |name| {
        if name.starts_with(META_INF) || name.starts_with("assets/") || name == CLASSES_DEX {
            None
        } else {
            Some(name.to_string())
        }
    })?;

    for required in [MANIFEST, RESOURCE_TABLE] {
        if !builder.contains(required) {
            return Err(PackagerError::MissingEntry {
                path: inputs.linked_resources.clone(),
                entry: required.to_string(),
            });
        }
    }

    if let Some(ref assets) = inputs.assets_dir {
        if assets.is_dir() {
            builder.add_dir("assets/", assets)?;
        }
    }

    builder.add_file(CLASSES_DEX, &inputs.classes_dex)?;
    builder.write_to(output)?;

    let inventory = ArchiveInventory::read(output)?;
    info!(
        path = %output.display(),
        entries = inventory.len(),
        "assembled installable package"
    );
    Ok(inventory)
}
