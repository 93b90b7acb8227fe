//! Build request files
//!
//! A request file is the on-disk form of a [`BuildRequest`]: the same
//! fields, but content and icons are referenced by path instead of being
//! inlined. Relative paths resolve against the request file's directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{ConfigError, Result};

use super::{AppOptions, BuildRequest, ContentFile, SigningOverride, SubjectFields};

/// Build request as written in `app.toml` / `app.yaml` / `app.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestFile {
    /// Application display name
    pub name: Option<String>,

    /// Reverse-domain package identifier
    pub package: Option<String>,

    pub version_code: Option<i64>,
    pub version_name: Option<String>,

    /// Remote site to wrap
    pub url: Option<String>,

    /// Directory whose whole tree becomes the app content
    pub content_dir: Option<PathBuf>,

    /// Explicit file list, mapping app paths to files on disk
    pub files: Vec<FileSource>,

    /// Launcher icon image
    pub icon: Option<PathBuf>,

    pub signing: Option<SigningFile>,
    pub subject: SubjectFields,
    pub options: AppOptions,
}

/// One explicitly listed content file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSource {
    /// Path inside the app's web root
    pub path: String,
    /// File on disk to read it from
    pub source: PathBuf,
}

/// Signing override as written in a request file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningFile {
    pub keystore: PathBuf,
    pub keystore_password: String,
    #[serde(default = "default_alias")]
    pub alias: String,
    #[serde(default)]
    pub key_password: Option<String>,
}

fn default_alias() -> String {
    "release".to_string()
}

/// Load a request file and read all referenced content
pub fn load_request(path: &Path) -> Result<BuildRequest> {
    info!(path = %path.display(), "loading build request");

    let content = std::fs::read_to_string(path).map_err(|e| request_error(path, e))?;
    let file = parse_request(path, &content)?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    file.into_request(path, &base)
}

fn parse_request(path: &Path, content: &str) -> Result<RequestFile> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let file = match ext.as_deref() {
        Some("toml") => toml::from_str(content).map_err(ConfigError::TomlError)?,
        Some("json") => serde_json::from_str(content).map_err(ConfigError::JsonError)?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(content).map_err(ConfigError::YamlError)?
        }
        _ => {
            return Err(request_error(
                path,
                "unsupported extension, expected .toml, .yaml or .json",
            ))
        }
    };
    Ok(file)
}

impl RequestFile {
    /// Resolve paths against `base` and read everything into memory
    pub fn into_request(self, origin: &Path, base: &Path) -> Result<BuildRequest> {
        let files = match (self.content_dir, self.files.is_empty()) {
            (Some(_), false) => {
                return Err(request_error(
                    origin,
                    "use either content_dir or files, not both",
                ))
            }
            (Some(dir), true) => Some(read_content_dir(origin, &base.join(dir))?),
            (None, false) => Some(read_listed_files(origin, base, &self.files)?),
            (None, true) => None,
        };

        let icon = self
            .icon
            .map(|icon| {
                let icon = base.join(icon);
                std::fs::read(&icon).map_err(|e| request_error(&icon, e))
            })
            .transpose()?;

        let signing = self.signing.map(|s| SigningOverride {
            keystore_path: base.join(s.keystore),
            keystore_password: s.keystore_password,
            key_alias: s.alias,
            key_password: s.key_password,
        });

        Ok(BuildRequest {
            app_name: self.name,
            package_name: self.package,
            version_code: self.version_code,
            version_name: self.version_name,
            url: self.url,
            files,
            signing,
            subject: self.subject,
            options: self.options,
            icon,
        })
    }
}

fn read_content_dir(origin: &Path, dir: &Path) -> Result<Vec<ContentFile>> {
    if !dir.is_dir() {
        return Err(request_error(
            origin,
            format!("content_dir {} is not a directory", dir.display()),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| request_error(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| request_error(entry.path(), e))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let content = std::fs::read(entry.path()).map_err(|e| request_error(entry.path(), e))?;
        files.push(ContentFile::new(rel, content));
    }

    debug!(dir = %dir.display(), count = files.len(), "read content directory");
    Ok(files)
}

fn read_listed_files(origin: &Path, base: &Path, list: &[FileSource]) -> Result<Vec<ContentFile>> {
    list.iter()
        .map(|f| {
            let source = base.join(&f.source);
            let content = std::fs::read(&source).map_err(|e| {
                request_error(origin, format!("{} ({}): {}", f.path, source.display(), e))
            })?;
            Ok(ContentFile::new(f.path.clone(), content))
        })
        .collect()
}

fn request_error(path: &Path, message: impl ToString) -> crate::CoreError {
    ConfigError::Request {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::validate_request;
    use crate::CoreError;
    use tempfile::TempDir;

    #[test]
    fn test_load_url_request_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.toml");
        std::fs::write(
            &path,
            r#"
name = "Demo"
package = "com.example.demo"
version_code = 7
url = "https://example.org"

[options]
orientation = "portrait"
"#,
        )
        .unwrap();

        let request = load_request(&path).unwrap();
        assert_eq!(request.app_name.as_deref(), Some("Demo"));
        assert_eq!(request.version_code, Some(7));
        assert!(request.files.is_none());

        let spec = validate_request(&request).unwrap();
        assert_eq!(spec.options.orientation, crate::Orientation::Portrait);
    }

    #[test]
    fn test_content_dir_is_sorted_and_relative() {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("site");
        std::fs::create_dir_all(site.join("js")).unwrap();
        std::fs::write(site.join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(site.join("js").join("app.js"), "1").unwrap();

        let path = temp.path().join("app.yaml");
        std::fs::write(
            &path,
            "name: Demo\npackage: com.example.demo\ncontent_dir: site\n",
        )
        .unwrap();

        let request = load_request(&path).unwrap();
        let files = request.files.unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["index.html", "js/app.js"]);
        assert_eq!(files[0].content, b"<h1>hi</h1>");
    }

    #[test]
    fn test_listed_files_and_signing_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("page.html"), "x").unwrap();

        let path = temp.path().join("app.json");
        std::fs::write(
            &path,
            r#"{
                "name": "Demo",
                "package": "com.example.demo",
                "files": [{ "path": "index.html", "source": "page.html" }],
                "signing": { "keystore": "keys/app.p12", "keystore_password": "secret123" }
            }"#,
        )
        .unwrap();

        let request = load_request(&path).unwrap();
        assert_eq!(request.files.unwrap()[0].path, "index.html");

        let signing = request.signing.unwrap();
        assert_eq!(signing.key_alias, "release");
        assert_eq!(signing.keystore_path, temp.path().join("keys/app.p12"));
    }

    #[test]
    fn test_missing_listed_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.toml");
        std::fs::write(
            &path,
            "name = \"Demo\"\nfiles = [{ path = \"index.html\", source = \"nope.html\" }]\n",
        )
        .unwrap();

        let err = load_request(&path).unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::Request { .. })));
        assert!(err.to_string().contains("index.html"));
    }

    #[test]
    fn test_both_content_dir_and_files_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.toml");
        std::fs::write(
            &path,
            "content_dir = \"site\"\nfiles = [{ path = \"a\", source = \"a\" }]\n",
        )
        .unwrap();

        assert!(load_request(&path).is_err());
    }

    #[test]
    fn test_unknown_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.ini");
        std::fs::write(&path, "name = x").unwrap();
        assert!(load_request(&path).is_err());
    }
}
