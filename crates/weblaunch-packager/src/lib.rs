//! weblaunch Packager - zip archives for generated apps
//!
//! Everything written here is byte-stable: entries go out in a fixed group
//! order (manifest, resources, assets, bytecode, signing metadata), sorted
//! within each group, with a fixed timestamp. Building the same inputs twice
//! gives identical files.

pub mod bundle;
pub mod delivery;
pub mod error;
pub mod installable;
pub mod inventory;
pub mod layout;
pub mod writer;

pub use bundle::{build_bundle_module, BundleConfig, BundleModuleInputs};
pub use delivery::{build_delivery_archive, DeliveryContents, KeystoreCredentials};
pub use error::{PackagerError, Result};
pub use installable::{build_installable, InstallableInputs};
pub use inventory::{verify_bundle, verify_installable, ArchiveInventory, InventoryEntry};
pub use layout::EntryGroup;
pub use writer::{rewrite_canonical, ArchiveBuilder};
