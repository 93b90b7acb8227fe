//! Build requests and the validated build specification
//!
//! A [`BuildRequest`] is what an external collaborator hands in: every field
//! optional, nothing checked. [`validate_request`] turns it into an
//! immutable [`BuildSpec`] with all defaults applied, or a
//! [`ValidationError`](crate::ValidationError) naming the offending field.

mod request;
mod validate;

pub use request::{load_request, FileSource, RequestFile, SigningFile};
pub use validate::validate_request;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default version name when none is supplied
pub const DEFAULT_VERSION_NAME: &str = "1.0.0";

/// Default theme colour
pub const DEFAULT_THEME_COLOR: &str = "#2196F3";

/// Raw, unvalidated build request fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildRequest {
    /// Application display name
    pub app_name: Option<String>,

    /// Reverse-domain package identifier
    pub package_name: Option<String>,

    /// Numeric version code (defaults to 1)
    pub version_code: Option<i64>,

    /// Free-form version name (defaults to "1.0.0")
    pub version_name: Option<String>,

    /// Remote URL content source
    pub url: Option<String>,

    /// Uploaded file content source
    pub files: Option<Vec<ContentFile>>,

    /// Existing signing identity to reuse
    pub signing: Option<SigningOverride>,

    /// Certificate subject fields for a newly generated identity
    pub subject: SubjectFields,

    /// Shell behaviour options
    pub options: AppOptions,

    /// Uploaded launcher icon (PNG or JPEG bytes)
    #[serde(skip)]
    pub icon: Option<Vec<u8>>,
}

/// One uploaded web file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFile {
    /// Path relative to the web root (forward slashes)
    pub path: String,

    /// File content, copied verbatim
    pub content: Vec<u8>,
}

impl ContentFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A previously created signing identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningOverride {
    pub keystore_path: PathBuf,
    pub keystore_password: String,
    pub key_alias: String,
    /// Defaults to the keystore password
    #[serde(default)]
    pub key_password: Option<String>,
}

impl SigningOverride {
    /// Key password, falling back to the keystore password
    pub fn effective_key_password(&self) -> &str {
        self.key_password
            .as_deref()
            .unwrap_or(&self.keystore_password)
    }
}

/// Distinguished-name fields for a generated certificate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectFields {
    pub developer: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Two-letter country code
    pub country: Option<String>,
}

/// Screen orientation lock for the generated activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Unspecified,
    Portrait,
    Landscape,
}

impl Orientation {
    /// Value for `android:screenOrientation`
    pub fn as_manifest_value(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
        }
    }
}

/// Shell behaviour options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOptions {
    pub orientation: Orientation,
    /// `#RRGGBB`
    pub theme_color: String,
    pub fullscreen: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            orientation: Orientation::Unspecified,
            theme_color: DEFAULT_THEME_COLOR.to_string(),
            fullscreen: false,
        }
    }
}

/// Validated reverse-domain package identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    pub(crate) fn new_unchecked(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dot-separated segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Relative source directory, e.g. `com/example/demo`
    pub fn as_path(&self) -> PathBuf {
        self.segments().collect()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the application content comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// Load a remote site
    Url(String),
    /// Bundle the given files; `entry` is the page loaded at launch
    Files {
        files: Vec<ContentFile>,
        entry: String,
    },
}

impl ContentSource {
    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

/// Immutable, fully-defaulted description of what to build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub app_name: String,
    pub package_id: PackageId,
    pub version_code: u32,
    pub version_name: String,
    pub source: ContentSource,
    pub signing: Option<SigningOverride>,
    pub subject: SubjectFields,
    pub options: AppOptions,
    #[serde(skip)]
    pub icon: Option<Vec<u8>>,
}
