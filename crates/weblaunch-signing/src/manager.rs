//! Get-or-create logic for build signing identities

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};
use weblaunch_core::BuildSpec;

use crate::error::{Result, SigningError};
use crate::identity::{generate_password, DistinguishedName, SigningIdentity, DEFAULT_KEY_ALIAS};
use crate::keytool::{KeyGenerator, KeyRequest};

/// File name of a keystore generated inside a build's working directory
pub const GENERATED_KEYSTORE_NAME: &str = "release.keystore";

/// Hands out one signing identity per build
#[derive(Clone)]
pub struct IdentityManager {
    generator: Arc<dyn KeyGenerator>,
    timeout: Duration,
}

impl IdentityManager {
    pub fn new(generator: Arc<dyn KeyGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Name of the underlying key tool
    pub fn tool_name(&self) -> &str {
        self.generator.name()
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_available()
    }

    /// Reuse the override keystore when it exists, otherwise create one in `dir`.
    ///
    /// A signing override whose keystore is missing still contributes its
    /// alias and store password to the new identity.
    #[instrument(skip(self, spec), fields(package = %spec.package_id))]
    pub async fn get_or_create(&self, spec: &BuildSpec, dir: &Path) -> Result<SigningIdentity> {
        if let Some(ref signing) = spec.signing {
            if signing.keystore_path.is_file() {
                info!(keystore = %signing.keystore_path.display(), "reusing supplied keystore");
                return Ok(SigningIdentity {
                    keystore_path: signing.keystore_path.clone(),
                    store_password: signing.keystore_password.clone(),
                    key_alias: signing.key_alias.clone(),
                    key_password: signing.effective_key_password().to_string(),
                    distinguished_name: None,
                    validity_days: None,
                    created_at: Utc::now(),
                    reused: true,
                });
            }

            warn!(
                keystore = %signing.keystore_path.display(),
                "supplied keystore does not exist, creating a new identity"
            );
        }

        let alias = spec
            .signing
            .as_ref()
            .map(|s| s.key_alias.clone())
            .unwrap_or_else(|| DEFAULT_KEY_ALIAS.to_string());
        let store_password = spec
            .signing
            .as_ref()
            .map(|s| s.keystore_password.clone())
            .unwrap_or_else(generate_password);

        if let Some(ref signing) = spec.signing {
            if signing.effective_key_password() != signing.keystore_password {
                warn!("PKCS12 keystores use the store password for the key; ignoring key password");
            }
        }

        // PKCS12 has a single password for store and key
        let request = KeyRequest::new(
            alias,
            store_password.clone(),
            store_password,
            DistinguishedName::from_subject(&spec.subject),
        );

        tokio::fs::create_dir_all(dir).await?;
        self.create(request, &dir.join(GENERATED_KEYSTORE_NAME)).await
    }

    /// Create a brand-new identity at `keystore`; never overwrites
    pub async fn create(&self, request: KeyRequest, keystore: &Path) -> Result<SigningIdentity> {
        if request.alias.trim().is_empty() {
            return Err(SigningError::InvalidIdentity("key alias is empty".to_string()));
        }
        if keystore.exists() {
            return Err(SigningError::KeystoreExists(keystore.to_path_buf()));
        }

        self.generator
            .generate(&request, keystore, self.timeout)
            .await?;

        if !keystore.is_file() {
            return Err(SigningError::KeystoreMissing(keystore.to_path_buf()));
        }

        info!(keystore = %keystore.display(), alias = %request.alias, "created signing identity");

        Ok(SigningIdentity {
            keystore_path: keystore.to_path_buf(),
            store_password: request.store_password,
            key_alias: request.alias,
            key_password: request.key_password,
            distinguished_name: Some(request.distinguished_name),
            validity_days: Some(request.validity_days),
            created_at: Utc::now(),
            reused: false,
        })
    }
}

impl std::fmt::Debug for IdentityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityManager")
            .field("generator", &self.generator.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
