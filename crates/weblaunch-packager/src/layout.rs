//! Entry names and their canonical ordering

use std::cmp::Ordering;

/// Manifest entry of an installable package
pub const MANIFEST: &str = "AndroidManifest.xml";

/// Compiled resource table of an installable package
pub const RESOURCE_TABLE: &str = "resources.arsc";

/// Entry-point bytecode
pub const CLASSES_DEX: &str = "classes.dex";

/// Signing metadata directory
pub const META_INF: &str = "META-INF/";

/// Compiled resources directory
pub const RES_DIR: &str = "res/";

/// Web content directory
pub const ASSETS_DIR: &str = "assets/";

/// Bundle module paths
pub mod module {
    pub const MANIFEST: &str = "manifest/AndroidManifest.xml";
    pub const RESOURCE_TABLE: &str = "resources.pb";
    pub const CLASSES_DEX: &str = "dex/classes.dex";
}

/// Entries the bundle tool must produce
pub mod bundle {
    pub const MANIFEST: &str = "base/manifest/AndroidManifest.xml";
    pub const CLASSES_DEX: &str = "base/dex/classes.dex";
    pub const CONFIG: &str = "BundleConfig.pb";
}

/// Ordering group of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryGroup {
    Manifest,
    Resources,
    Assets,
    Other,
    Bytecode,
    Signing,
}

impl EntryGroup {
    /// Classify an entry of an installable package or bundle module
    pub fn classify(name: &str) -> Self {
        if name == MANIFEST || name == module::MANIFEST {
            Self::Manifest
        } else if name.starts_with(META_INF) {
            Self::Signing
        } else if name == RESOURCE_TABLE || name == module::RESOURCE_TABLE || name.starts_with(RES_DIR) {
            Self::Resources
        } else if name.starts_with(ASSETS_DIR) {
            Self::Assets
        } else if is_dex(name) {
            Self::Bytecode
        } else {
            Self::Other
        }
    }
}

fn is_dex(name: &str) -> bool {
    let file = name.rsplit('/').next().unwrap_or(name);
    file.starts_with("classes") && file.ends_with(".dex")
}

/// Canonical entry order: by group, then lexicographically
pub fn compare_entries(a: &str, b: &str) -> Ordering {
    EntryGroup::classify(a)
        .cmp(&EntryGroup::classify(b))
        .then_with(|| a.cmp(b))
}

/// Entries that must never be compressed
pub fn must_store(name: &str) -> bool {
    name == RESOURCE_TABLE
}

/// Check that `name` is a safe relative archive path
pub fn check_entry_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }
    if name.starts_with('/') || name.contains('\\') {
        return Err("must be a relative forward-slash path");
    }
    if name.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return Err("contains an empty, '.' or '..' segment");
    }
    Ok(())
}
