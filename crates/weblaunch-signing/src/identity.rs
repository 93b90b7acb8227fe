//! Signing identity types

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use weblaunch_core::SubjectFields;

use crate::error::Result;

/// Alias used when the caller does not name one
pub const DEFAULT_KEY_ALIAS: &str = "release";

/// Certificate validity for generated identities (roughly 27 years)
pub const DEFAULT_VALIDITY_DAYS: u32 = 10_000;

/// RSA modulus size for generated identities
pub const DEFAULT_KEY_SIZE: u32 = 2048;

/// Length of generated passwords
pub const GENERATED_PASSWORD_LEN: usize = 24;

const PLACEHOLDER: &str = "Unknown";
const DEFAULT_COUNTRY: &str = "US";

/// Generate a random alphanumeric password
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// X.500 distinguished name of a generated certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    pub common_name: String,
    pub organizational_unit: String,
    pub organization: String,
    pub locality: String,
    pub state: String,
    pub country: String,
}

impl DistinguishedName {
    /// Build from optional subject fields; blanks become placeholders
    pub fn from_subject(subject: &SubjectFields) -> Self {
        let or_placeholder = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(PLACEHOLDER)
                .to_string()
        };

        Self {
            common_name: or_placeholder(&subject.developer),
            organizational_unit: or_placeholder(&subject.organizational_unit),
            organization: or_placeholder(&subject.organization),
            locality: or_placeholder(&subject.city),
            state: or_placeholder(&subject.state),
            country: subject
                .country
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_COUNTRY)
                .to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for DistinguishedName {
    /// keytool `-dname` syntax, with RFC 2253 special characters escaped
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CN={}, OU={}, O={}, L={}, ST={}, C={}",
            escape_rdn(&self.common_name),
            escape_rdn(&self.organizational_unit),
            escape_rdn(&self.organization),
            escape_rdn(&self.locality),
            escape_rdn(&self.state),
            escape_rdn(&self.country),
        )
    }
}

fn escape_rdn(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Credentials and metadata for one keystore
#[derive(Clone, Serialize, Deserialize)]
pub struct SigningIdentity {
    /// Keystore file on disk
    pub keystore_path: PathBuf,

    pub store_password: String,
    pub key_alias: String,
    pub key_password: String,

    /// Only known for identities created by this build
    pub distinguished_name: Option<DistinguishedName>,

    /// Only known for identities created by this build
    pub validity_days: Option<u32>,

    pub created_at: DateTime<Utc>,

    /// The keystore was supplied by the caller rather than generated
    pub reused: bool,
}

// Passwords stay out of logs
impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("keystore_path", &self.keystore_path)
            .field("key_alias", &self.key_alias)
            .field("distinguished_name", &self.distinguished_name)
            .field("validity_days", &self.validity_days)
            .field("created_at", &self.created_at)
            .field("reused", &self.reused)
            .finish_non_exhaustive()
    }
}

/// Serialized form of an identity, stored beside the keystore artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Keystore file name, relative to the record
    pub keystore: String,
    pub keystore_type: String,
    pub key_alias: String,
    pub store_password: String,
    pub key_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinguished_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_days: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Describe `identity` whose keystore was saved as `keystore_file`
    pub fn new(identity: &SigningIdentity, keystore_file: impl Into<String>) -> Self {
        Self {
            keystore: keystore_file.into(),
            keystore_type: "PKCS12".to_string(),
            key_alias: identity.key_alias.clone(),
            store_password: identity.store_password.clone(),
            key_password: identity.key_password.clone(),
            distinguished_name: identity.distinguished_name.as_ref().map(|d| d.to_string()),
            validity_days: identity.validity_days,
            created_at: identity.created_at,
        }
    }

    /// Write as pretty JSON, readable only by the owner on unix
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %path.display(), "wrote identity record");
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }
}
