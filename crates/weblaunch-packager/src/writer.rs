//! Deterministic zip writer

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{PackagerError, Result};
use crate::layout::{check_entry_name, compare_entries, must_store};

#[derive(Debug, Clone)]
struct PendingEntry {
    data: Vec<u8>,
    method: CompressionMethod,
}

/// Collects entries in memory and writes them in canonical order.
///
/// Every entry gets the zip epoch timestamp and fixed permissions, so the
/// output depends only on names, content and compression.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: BTreeMap<String, PendingEntry>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Add an entry, deflated unless it must be stored
    pub fn add(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<()> {
        let name = name.into();
        let method = if must_store(&name) {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        self.insert(name, data, method)
    }

    /// Add an entry without compression
    pub fn add_stored(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<()> {
        self.insert(name.into(), data, CompressionMethod::Stored)
    }

    fn insert(&mut self, name: String, data: Vec<u8>, method: CompressionMethod) -> Result<()> {
        check_entry_name(&name).map_err(|reason| PackagerError::InvalidEntry {
            name: name.clone(),
            reason: reason.to_string(),
        })?;
        if self.entries.contains_key(&name) {
            return Err(PackagerError::DuplicateEntry(name));
        }
        self.entries.insert(name, PendingEntry { data, method });
        Ok(())
    }

    /// Add a file from disk
    pub fn add_file(&mut self, name: impl Into<String>, path: &Path) -> Result<()> {
        let data = std::fs::read(path)?;
        self.add(name, data)
    }

    /// Add every file under `dir`, named `prefix` + relative path
    pub fn add_dir(&mut self, prefix: &str, dir: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| PackagerError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| PackagerError::InvalidEntry {
                    name: entry.path().display().to_string(),
                    reason: e.to_string(),
                })?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            self.add_file(format!("{}{}", prefix, rel), entry.path())?;
            count += 1;
        }
        Ok(count)
    }

    /// Copy entries from an existing archive.
    ///
    /// `rename` maps each source name to its new name, or `None` to drop it.
    /// Stored entries stay stored.
    pub fn merge_archive<F>(&mut self, path: &Path, mut rename: F) -> Result<usize>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| PackagerError::InvalidArchive {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut count = 0;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let Some(name) = rename(entry.name()) else {
                continue;
            };

            let stored = entry.compression() == CompressionMethod::Stored;
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            drop(entry);

            if stored || must_store(&name) {
                self.add_stored(name, data)?;
            } else {
                self.add(name, data)?;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Entry names in the order they will be written
    pub fn ordered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_by(|a, b| compare_entries(a, b));
        names
    }

    /// Write the archive to `output`, replacing any existing file
    pub fn write_to(&self, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(output)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));

        for name in self.ordered_names() {
            let Some(entry) = self.entries.get(name) else {
                continue;
            };
            let options = SimpleFileOptions::default()
                .compression_method(entry.method)
                .last_modified_time(zip::DateTime::default())
                .unix_permissions(0o644);
            zip.start_file(name, options)?;
            zip.write_all(&entry.data)?;
        }

        let mut writer = zip.finish()?;
        writer.flush()?;

        debug!(path = %output.display(), entries = self.entries.len(), "wrote archive");
        Ok(())
    }
}

/// Rewrite an archive in place in canonical entry order.
///
/// Signing tools put `META-INF/` first; entry order is not covered by a
/// JAR signature, so the signed package can be reordered without
/// invalidating it.
pub fn rewrite_canonical(path: &Path) -> Result<usize> {
    let mut builder = ArchiveBuilder::new();
    let count = builder.merge_archive(path, |name| Some(name.to_string()))?;
    builder.write_to(path)?;
    debug!(path = %path.display(), entries = count, "rewrote archive in canonical order");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ArchiveBuilder {
        let mut builder = ArchiveBuilder::new();
        builder.add("classes.dex", b"dex\n035".to_vec()).unwrap();
        builder.add("assets/index.html", b"<h1>hi</h1>".to_vec()).unwrap();
        builder.add("resources.arsc", vec![0u8; 64]).unwrap();
        builder.add("AndroidManifest.xml", b"manifest".to_vec()).unwrap();
        builder
    }

    #[test]
    fn test_written_order_and_storage() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out.zip");
        sample().write_to(&out).unwrap();

        let mut archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let names: Vec<_> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names.len(), 4);

        let ordered: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            ordered,
            vec!["AndroidManifest.xml", "resources.arsc", "assets/index.html", "classes.dex"]
        );

        let arsc = archive.by_name("resources.arsc").unwrap();
        assert_eq!(arsc.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn test_output_is_byte_stable() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.zip");
        let b = temp.path().join("b.zip");
        sample().write_to(&a).unwrap();
        sample().write_to(&b).unwrap();
        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let mut builder = ArchiveBuilder::new();
        builder.add("assets/a", vec![1]).unwrap();
        assert!(matches!(
            builder.add("assets/a", vec![2]),
            Err(PackagerError::DuplicateEntry(_))
        ));
        assert!(matches!(
            builder.add("../evil", vec![]),
            Err(PackagerError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn test_merge_archive_renames_and_drops() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.zip");
        sample().write_to(&src).unwrap();

        let mut builder = ArchiveBuilder::new();
        let count = builder
            .merge_archive(&src, |name| match name {
                "classes.dex" => None,
                "AndroidManifest.xml" => Some("manifest/AndroidManifest.xml".to_string()),
                other => Some(other.to_string()),
            })
            .unwrap();

        assert_eq!(count, 3);
        assert!(builder.contains("manifest/AndroidManifest.xml"));
        assert!(!builder.contains("classes.dex"));
    }

    #[test]
    fn test_rewrite_canonical_moves_signing_metadata_last() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("signed.apk");

        // Same layout a signing tool leaves behind
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        for name in [
            "META-INF/MANIFEST.MF",
            "META-INF/RELEASE.SF",
            "META-INF/RELEASE.RSA",
            "classes.dex",
            "AndroidManifest.xml",
            "resources.arsc",
        ] {
            let method = if name == "resources.arsc" {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            zip.start_file(name, SimpleFileOptions::default().compression_method(method))
                .unwrap();
            zip.write_all(name.as_bytes()).unwrap();
        }
        zip.finish().unwrap();

        assert_eq!(rewrite_canonical(&path).unwrap(), 6);

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let ordered: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            ordered,
            vec![
                "AndroidManifest.xml",
                "resources.arsc",
                "classes.dex",
                "META-INF/MANIFEST.MF",
                "META-INF/RELEASE.RSA",
                "META-INF/RELEASE.SF",
            ]
        );

        let mut sf = archive.by_name("META-INF/RELEASE.SF").unwrap();
        let mut content = String::new();
        sf.read_to_string(&mut content).unwrap();
        assert_eq!(content, "META-INF/RELEASE.SF");
        drop(sf);
        assert_eq!(
            archive.by_name("resources.arsc").unwrap().compression(),
            CompressionMethod::Stored
        );
    }

    #[test]
    fn test_add_dir_uses_forward_slashes() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("assets");
        std::fs::create_dir_all(dir.join("css")).unwrap();
        std::fs::write(dir.join("index.html"), "x").unwrap();
        std::fs::write(dir.join("css").join("site.css"), "y").unwrap();

        let mut builder = ArchiveBuilder::new();
        assert_eq!(builder.add_dir("assets/", &dir).unwrap(), 2);
        assert_eq!(
            builder.ordered_names(),
            vec!["assets/css/site.css", "assets/index.html"]
        );
    }
}
