//! Delivery archive: everything a customer needs, in one zip

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::inventory::ArchiveInventory;
use crate::writer::ArchiveBuilder;

/// README entry name
pub const README: &str = "README.txt";

/// Keystore credentials printed into the README
#[derive(Clone)]
pub struct KeystoreCredentials {
    pub key_alias: String,
    pub store_password: String,
    pub key_password: String,
}

impl std::fmt::Debug for KeystoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreCredentials")
            .field("key_alias", &self.key_alias)
            .finish_non_exhaustive()
    }
}

/// What goes into a delivery archive
#[derive(Debug, Clone)]
pub struct DeliveryContents {
    /// Base file name of every entry, e.g. the build id
    pub base_name: String,
    pub app_name: String,
    pub package_id: String,
    pub version_name: String,
    pub version_code: u32,
    pub apk: PathBuf,
    pub aab: Option<PathBuf>,
    pub keystore: PathBuf,
    /// Omitted from the README when `None`
    pub credentials: Option<KeystoreCredentials>,
}

impl DeliveryContents {
    pub fn apk_name(&self) -> String {
        format!("{}.apk", self.base_name)
    }

    pub fn aab_name(&self) -> String {
        format!("{}.aab", self.base_name)
    }

    pub fn keystore_name(&self) -> String {
        format!("{}.keystore", self.base_name)
    }

    /// Usage note bundled as `README.txt`
    pub fn render_readme(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {} ({})", self.app_name, self.version_name, self.version_code);
        let _ = writeln!(out, "Package: {}", self.package_id);
        let _ = writeln!(out);
        let _ = writeln!(out, "Files");
        let _ = writeln!(out, "  {}  install directly on a device", self.apk_name());
        if self.aab.is_some() {
            let _ = writeln!(out, "  {}  upload to an app store", self.aab_name());
        }
        let _ = writeln!(out, "  {}  signing key (PKCS12)", self.keystore_name());
        let _ = writeln!(out);
        let _ = writeln!(out, "Installing");
        let _ = writeln!(out, "  adb install {}", self.apk_name());
        let _ = writeln!(out);
        let _ = writeln!(out, "Signing key");
        let _ = writeln!(
            out,
            "  Every update must be signed with this same key. Keep the keystore"
        );
        let _ = writeln!(out, "  and its passwords somewhere safe; they cannot be recovered.");

        match self.credentials {
            Some(ref creds) => {
                let _ = writeln!(out);
                let _ = writeln!(out, "  Key alias:         {}", creds.key_alias);
                let _ = writeln!(out, "  Keystore password: {}", creds.store_password);
                let _ = writeln!(out, "  Key password:      {}", creds.key_password);
            }
            None => {
                let _ = writeln!(out, "  Passwords were delivered separately.");
            }
        }
        out
    }
}

/// Write the delivery archive to `output`
pub fn build_delivery_archive(contents: &DeliveryContents, output: &Path) -> Result<ArchiveInventory> {
    let mut builder = ArchiveBuilder::new();

    // Packages are already compressed
    builder.add_stored(contents.apk_name(), std::fs::read(&contents.apk)?)?;
    if let Some(ref aab) = contents.aab {
        builder.add_stored(contents.aab_name(), std::fs::read(aab)?)?;
    }
    builder.add_stored(contents.keystore_name(), std::fs::read(&contents.keystore)?)?;
    builder.add(README, contents.render_readme().into_bytes())?;

    builder.write_to(output)?;
    let inventory = ArchiveInventory::read(output)?;
    info!(path = %output.display(), entries = inventory.len(), "wrote delivery archive");
    Ok(inventory)
}
