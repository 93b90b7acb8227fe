//! Archive listing and required-entry verification

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use zip::{CompressionMethod, ZipArchive};

use crate::error::{PackagerError, Result};
use crate::layout::{bundle, ASSETS_DIR, CLASSES_DEX, MANIFEST, META_INF, RESOURCE_TABLE, RES_DIR};

/// One entry of an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryEntry {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub stored: bool,
    pub crc32: u32,
}

/// Entries of an archive on disk, in archive order
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInventory {
    pub path: PathBuf,
    pub entries: Vec<InventoryEntry>,
}

impl ArchiveInventory {
    /// List an archive; fails if it is not a readable zip
    pub fn read(path: &Path) -> Result<Self> {
        let mut archive = open(path)?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            entries.push(InventoryEntry {
                name: entry.name().to_string(),
                size: entry.size(),
                compressed_size: entry.compressed_size(),
                stored: entry.compression() == CompressionMethod::Stored,
                crc32: entry.crc32(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn entry(&self, name: &str) -> Option<&InventoryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Names under a directory prefix such as `assets/`
    pub fn names_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .map(|e| e.name.as_str())
            .filter(move |n| n.starts_with(prefix))
    }

    /// Read one entry's content back from the archive
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = open(&self.path)?;
        let mut entry = archive.by_name(name).map_err(|_| PackagerError::MissingEntry {
            path: self.path.clone(),
            entry: name.to_string(),
        })?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Whether the archive carries JAR signing metadata
    pub fn is_signed(&self) -> bool {
        let signing: Vec<String> = self
            .names_under(META_INF)
            .map(str::to_ascii_uppercase)
            .collect();
        let has = |ext: &str| signing.iter().any(|n| n.ends_with(ext));
        has(".SF") && (has(".RSA") || has(".EC") || has(".DSA"))
    }

    fn require(&self, entry: &str) -> Result<()> {
        if self.contains(entry) {
            Ok(())
        } else {
            Err(PackagerError::MissingEntry {
                path: self.path.clone(),
                entry: entry.to_string(),
            })
        }
    }

    fn require_under(&self, prefix: &str) -> Result<()> {
        if self.names_under(prefix).next().is_some() {
            Ok(())
        } else {
            Err(PackagerError::MissingEntry {
                path: self.path.clone(),
                entry: format!("{}**", prefix),
            })
        }
    }
}

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| PackagerError::InvalidArchive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Check an installable package for its required entries
pub fn verify_installable(path: &Path, require_signature: bool) -> Result<ArchiveInventory> {
    let inventory = ArchiveInventory::read(path)?;
    for entry in [MANIFEST, RESOURCE_TABLE, CLASSES_DEX] {
        inventory.require(entry)?;
    }
    // Launcher icons and web content
    for prefix in [RES_DIR, ASSETS_DIR] {
        inventory.require_under(prefix)?;
    }

    if let Some(arsc) = inventory.entry(RESOURCE_TABLE) {
        if !arsc.stored {
            return Err(PackagerError::InvalidArchive {
                path: path.to_path_buf(),
                reason: format!("{} must be stored uncompressed", RESOURCE_TABLE),
            });
        }
    }

    if require_signature && !inventory.is_signed() {
        return Err(PackagerError::MissingEntry {
            path: path.to_path_buf(),
            entry: format!("{}*.SF and signature block", META_INF),
        });
    }

    debug!(path = %path.display(), entries = inventory.len(), "installable package verified");
    Ok(inventory)
}

/// Check a distribution bundle for its required entries
pub fn verify_bundle(path: &Path) -> Result<ArchiveInventory> {
    let inventory = ArchiveInventory::read(path)?;
    for entry in [bundle::MANIFEST, bundle::CLASSES_DEX, bundle::CONFIG] {
        inventory.require(entry)?;
    }
    debug!(path = %path.display(), entries = inventory.len(), "bundle verified");
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ArchiveBuilder;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, entries: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut builder = ArchiveBuilder::new();
        for entry in entries {
            builder.add(*entry, entry.as_bytes().to_vec()).unwrap();
        }
        builder.write_to(&path).unwrap();
        path
    }

    #[test]
    fn test_verify_unsigned_and_signed() {
        let temp = TempDir::new().unwrap();
        let unsigned = write(
            temp.path(),
            "unsigned.apk",
            &[
                "AndroidManifest.xml",
                "res/mipmap-mdpi-v4/ic_launcher.png",
                "resources.arsc",
                "assets/loader.html",
                "classes.dex",
            ],
        );
        assert!(verify_installable(&unsigned, false).is_ok());
        assert!(verify_installable(&unsigned, true).is_err());

        let signed = write(
            temp.path(),
            "signed.apk",
            &[
                "AndroidManifest.xml",
                "res/mipmap-mdpi-v4/ic_launcher.png",
                "resources.arsc",
                "assets/index.html",
                "classes.dex",
                "META-INF/MANIFEST.MF",
                "META-INF/RELEASE.SF",
                "META-INF/RELEASE.RSA",
            ],
        );
        let inventory = verify_installable(&signed, true).unwrap();
        assert!(inventory.is_signed());
        assert_eq!(inventory.names_under("META-INF/").count(), 3);
    }

    #[test]
    fn test_verify_missing_dex() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "x.apk", &["AndroidManifest.xml", "resources.arsc"]);
        let err = verify_installable(&path, false).unwrap_err();
        assert!(matches!(err, PackagerError::MissingEntry { entry, .. } if entry == "classes.dex"));
    }

    #[test]
    fn test_verify_requires_icons_and_content() {
        let temp = TempDir::new().unwrap();
        let no_res = write(
            temp.path(),
            "no-res.apk",
            &["AndroidManifest.xml", "resources.arsc", "assets/index.html", "classes.dex"],
        );
        let err = verify_installable(&no_res, false).unwrap_err();
        assert!(matches!(err, PackagerError::MissingEntry { entry, .. } if entry == "res/**"));

        let no_assets = write(
            temp.path(),
            "no-assets.apk",
            &[
                "AndroidManifest.xml",
                "res/mipmap-mdpi-v4/ic_launcher.png",
                "resources.arsc",
                "classes.dex",
            ],
        );
        let err = verify_installable(&no_assets, false).unwrap_err();
        assert!(matches!(err, PackagerError::MissingEntry { entry, .. } if entry == "assets/**"));
    }

    #[test]
    fn test_not_a_zip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("junk.apk");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        assert!(matches!(
            ArchiveInventory::read(&path),
            Err(PackagerError::InvalidArchive { .. })
        ));
    }

    #[test]
    fn test_verify_bundle() {
        let temp = TempDir::new().unwrap();
        let good = write(
            temp.path(),
            "app.aab",
            &[
                "BundleConfig.pb",
                "base/manifest/AndroidManifest.xml",
                "base/dex/classes.dex",
                "base/resources.pb",
            ],
        );
        assert!(verify_bundle(&good).is_ok());

        let bad = write(temp.path(), "bad.aab", &["base/manifest/AndroidManifest.xml"]);
        assert!(verify_bundle(&bad).is_err());
    }
}
