//! weblaunch Signing - signing identities for generated apps
//!
//! Every build is signed. This crate either reuses a keystore the caller
//! already owns or creates a fresh RSA key pair in a PKCS12 keystore:
//! - [`IdentityManager`] decides between reuse and creation
//! - [`KeyGenerator`] is the seam to the key tool, [`Keytool`] the JDK one
//! - [`IdentityRecord`] persists credentials next to the keystore artifact

pub mod error;
pub mod identity;
pub mod keytool;
pub mod manager;

pub use error::{Result, SigningError};
pub use identity::{
    generate_password, DistinguishedName, IdentityRecord, SigningIdentity, DEFAULT_KEY_ALIAS,
    DEFAULT_KEY_SIZE, DEFAULT_VALIDITY_DAYS, GENERATED_PASSWORD_LEN,
};
pub use keytool::{KeyGenerator, KeyRequest, Keytool};
pub use manager::{IdentityManager, GENERATED_KEYSTORE_NAME};
