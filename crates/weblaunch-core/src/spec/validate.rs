//! Build request validation and normalisation

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use crate::error::ValidationError;

use super::{
    AppOptions, BuildRequest, BuildSpec, ContentFile, ContentSource, PackageId, SigningOverride,
    SubjectFields, DEFAULT_VERSION_NAME,
};

/// Highest version code the platform accepts
pub const MAX_VERSION_CODE: i64 = 2_100_000_000;

/// Maximum display name length
pub const MAX_APP_NAME_LEN: usize = 50;

/// keytool refuses shorter passwords
pub const MIN_PASSWORD_LEN: usize = 6;

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final",
    "finally", "float", "for", "goto", "if", "implements", "import", "instanceof", "int",
    "interface", "long", "native", "new", "null", "package", "private", "protected", "public",
    "return", "short", "static", "strictfp", "super", "switch", "synchronized", "this", "throw",
    "throws", "transient", "true", "try", "void", "volatile", "while",
];

/// Files that uploads routinely drag along and that never belong in the app
const JUNK_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

type Result<T> = std::result::Result<T, ValidationError>;

/// Validate a raw request and produce an immutable build specification
pub fn validate_request(request: &BuildRequest) -> Result<BuildSpec> {
    debug!("validating build request");

    let app_name = validate_app_name(request.app_name.as_deref())?;
    let package_id = validate_package_name(request.package_name.as_deref())?;
    let version_code = validate_version_code(request.version_code)?;
    let version_name = normalize_version_name(request.version_name.as_deref())?;
    let source = validate_source(request.url.as_deref(), request.files.as_deref())?;
    let signing = request
        .signing
        .as_ref()
        .map(validate_signing)
        .transpose()?;
    let subject = validate_subject(&request.subject)?;
    let options = validate_options(&request.options)?;

    if let Some(ref icon) = request.icon {
        if icon.is_empty() {
            return Err(ValidationError::new("icon", "icon file is empty"));
        }
    }

    debug!(package = %package_id, version_code, "build request valid");

    Ok(BuildSpec {
        app_name,
        package_id,
        version_code,
        version_name,
        source,
        signing,
        subject,
        options,
        icon: request.icon.clone(),
    })
}

fn validate_app_name(name: Option<&str>) -> Result<String> {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ValidationError::new("app_name", "is required"));
    }
    if name.chars().count() > MAX_APP_NAME_LEN {
        return Err(ValidationError::new(
            "app_name",
            format!("must be at most {} characters", MAX_APP_NAME_LEN),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "app_name",
            "must not contain control characters",
        ));
    }
    Ok(name.to_string())
}

fn validate_package_name(name: Option<&str>) -> Result<PackageId> {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ValidationError::new("package_name", "is required"));
    }

    let re = Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*(\.[a-zA-Z][a-zA-Z0-9_]*)+$")
        .map_err(|e| ValidationError::new("package_name", e.to_string()))?;
    if !re.is_match(name) {
        return Err(ValidationError::new(
            "package_name",
            format!(
                "'{}' is not a reverse-domain identifier (e.g. com.example.app)",
                name
            ),
        ));
    }

    if let Some(keyword) = name.split('.').find(|s| JAVA_KEYWORDS.contains(s)) {
        return Err(ValidationError::new(
            "package_name",
            format!("segment '{}' is a reserved word", keyword),
        ));
    }

    Ok(PackageId::new_unchecked(name.to_string()))
}

fn validate_version_code(code: Option<i64>) -> Result<u32> {
    let code = code.unwrap_or(1);
    if code < 1 {
        return Err(ValidationError::new(
            "version_code",
            "must be a positive integer",
        ));
    }
    if code > MAX_VERSION_CODE {
        return Err(ValidationError::new(
            "version_code",
            format!("must not exceed {}", MAX_VERSION_CODE),
        ));
    }
    // MAX_VERSION_CODE fits in u32
    Ok(code as u32)
}

fn normalize_version_name(name: Option<&str>) -> Result<String> {
    let name = name.map(str::trim).filter(|n| !n.is_empty());
    match name {
        None => Ok(DEFAULT_VERSION_NAME.to_string()),
        Some(n) if n.chars().any(char::is_control) => Err(ValidationError::new(
            "version_name",
            "must not contain control characters",
        )),
        Some(n) => Ok(n.to_string()),
    }
}

fn validate_source(url: Option<&str>, files: Option<&[ContentFile]>) -> Result<ContentSource> {
    let url = url.map(str::trim).filter(|u| !u.is_empty());

    match (url, files) {
        (Some(_), Some(_)) => Err(ValidationError::new(
            "source",
            "provide either a url or files, not both",
        )),
        (None, None) => Err(ValidationError::new(
            "source",
            "a url or at least one file is required",
        )),
        (Some(url), None) => validate_url(url).map(ContentSource::Url),
        (None, Some(files)) => {
            let files = normalize_files(files)?;
            let entry = select_entry(&files)
                .ok_or_else(|| ValidationError::new("files", "no usable files after filtering"))?;
            Ok(ContentSource::Files { files, entry })
        }
    }
}

fn validate_url(raw: &str) -> Result<String> {
    let parsed =
        url::Url::parse(raw).map_err(|e| ValidationError::new("url", format!("{}: {}", raw, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::new(
            "url",
            format!("scheme '{}' is not supported, use http or https", parsed.scheme()),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::new("url", "missing host"));
    }

    // The generated shell loads the URL exactly as given
    Ok(raw.to_string())
}

/// Normalise upload paths, drop junk, reject anything escaping the web root
pub(crate) fn normalize_files(files: &[ContentFile]) -> Result<Vec<ContentFile>> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(files.len());

    for (i, file) in files.iter().enumerate() {
        let field = || format!("files[{}].path", i);
        let path = normalize_path(&file.path);

        if path.is_empty() || is_junk(&path) {
            debug!(path = %file.path, "skipping file");
            continue;
        }
        if file.path.starts_with('/') || has_drive_prefix(&path) {
            return Err(ValidationError::new(field(), "must be a relative path"));
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(ValidationError::new(field(), "must not contain '..'"));
        }
        if !seen.insert(path.clone()) {
            return Err(ValidationError::new(
                field(),
                format!("duplicate path '{}'", path),
            ));
        }

        normalized.push(ContentFile {
            path,
            content: file.content.clone(),
        });
    }

    if normalized.is_empty() {
        return Err(ValidationError::new(
            "files",
            "file list is empty after filtering",
        ));
    }

    Ok(normalized)
}

fn normalize_path(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let mut path = unified.as_str();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn is_junk(path: &str) -> bool {
    if path.starts_with("__MACOSX/") {
        return true;
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    JUNK_FILES.contains(&name)
}

/// `index.html` if present, else the first HTML file, else the first file
fn select_entry(files: &[ContentFile]) -> Option<String> {
    let is_html = |p: &str| {
        let lower = p.to_ascii_lowercase();
        lower.ends_with(".html") || lower.ends_with(".htm")
    };

    files
        .iter()
        .find(|f| f.path.eq_ignore_ascii_case("index.html"))
        .or_else(|| files.iter().find(|f| is_html(&f.path)))
        .or_else(|| files.first())
        .map(|f| f.path.clone())
}

fn validate_signing(signing: &SigningOverride) -> Result<SigningOverride> {
    if signing.keystore_path.as_os_str().is_empty() {
        return Err(ValidationError::new(
            "signing.keystore_path",
            "cannot be empty",
        ));
    }
    if signing.key_alias.trim().is_empty() {
        return Err(ValidationError::new("signing.key_alias", "cannot be empty"));
    }
    if signing.keystore_password.len() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "signing.keystore_password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    if signing.effective_key_password().len() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "signing.key_password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }

    Ok(SigningOverride {
        keystore_path: signing.keystore_path.clone(),
        keystore_password: signing.keystore_password.clone(),
        key_alias: signing.key_alias.trim().to_string(),
        key_password: Some(signing.effective_key_password().to_string()),
    })
}

fn validate_subject(subject: &SubjectFields) -> Result<SubjectFields> {
    let clean = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let country = clean(&subject.country).map(|c| c.to_ascii_uppercase());
    if let Some(ref c) = country {
        if c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(ValidationError::new(
                "subject.country",
                "must be a two-letter country code",
            ));
        }
    }

    Ok(SubjectFields {
        developer: clean(&subject.developer),
        organization: clean(&subject.organization),
        organizational_unit: clean(&subject.organizational_unit),
        city: clean(&subject.city),
        state: clean(&subject.state),
        country,
    })
}

fn validate_options(options: &AppOptions) -> Result<AppOptions> {
    let color = options.theme_color.trim();
    let re = Regex::new(r"^#[0-9a-fA-F]{6}$")
        .map_err(|e| ValidationError::new("options.theme_color", e.to_string()))?;
    if !re.is_match(color) {
        return Err(ValidationError::new(
            "options.theme_color",
            "must be a #RRGGBB colour",
        ));
    }

    Ok(AppOptions {
        orientation: options.orientation,
        theme_color: color.to_ascii_uppercase(),
        fullscreen: options.fullscreen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn url_request() -> BuildRequest {
        BuildRequest {
            app_name: Some("Demo".to_string()),
            package_name: Some("com.example.demo".to_string()),
            url: Some("https://example.org".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_url_request_defaults() {
        let spec = validate_request(&url_request()).unwrap();
        assert_eq!(spec.app_name, "Demo");
        assert_eq!(spec.package_id.as_str(), "com.example.demo");
        assert_eq!(spec.version_code, 1);
        assert_eq!(spec.version_name, "1.0.0");
        assert_eq!(spec.source, ContentSource::Url("https://example.org".to_string()));
        assert!(spec.signing.is_none());
        assert_eq!(spec.options.theme_color, "#2196F3");
    }

    #[test]
    fn test_missing_app_name() {
        let mut request = url_request();
        request.app_name = Some("   ".to_string());
        let err = validate_request(&request).unwrap_err();
        assert_eq!(err.field, "app_name");
    }

    #[test]
    fn test_bad_package_names() {
        for bad in ["demo", "com..demo", "1com.example", "com.example-app", "com.new.app"] {
            let mut request = url_request();
            request.package_name = Some(bad.to_string());
            let err = validate_request(&request).unwrap_err();
            assert_eq!(err.field, "package_name", "accepted {}", bad);
        }
    }

    #[test]
    fn test_version_code_bounds() {
        let mut request = url_request();
        request.version_code = Some(0);
        assert_eq!(validate_request(&request).unwrap_err().field, "version_code");

        request.version_code = Some(-5);
        assert_eq!(validate_request(&request).unwrap_err().field, "version_code");

        request.version_code = Some(42);
        assert_eq!(validate_request(&request).unwrap().version_code, 42);
    }

    #[test]
    fn test_blank_version_name_defaults() {
        let mut request = url_request();
        request.version_name = Some("  ".to_string());
        assert_eq!(validate_request(&request).unwrap().version_name, "1.0.0");
    }

    #[test]
    fn test_source_exclusivity() {
        let mut request = url_request();
        request.files = Some(vec![ContentFile::new("index.html", "<h1>hi</h1>")]);
        assert_eq!(validate_request(&request).unwrap_err().field, "source");

        request.url = None;
        request.files = None;
        assert_eq!(validate_request(&request).unwrap_err().field, "source");
    }

    #[test]
    fn test_url_scheme_rejected() {
        let mut request = url_request();
        request.url = Some("ftp://example.org".to_string());
        assert_eq!(validate_request(&request).unwrap_err().field, "url");

        request.url = Some("not a url".to_string());
        assert_eq!(validate_request(&request).unwrap_err().field, "url");
    }

    #[test]
    fn test_files_source_selects_index() {
        let mut request = url_request();
        request.url = None;
        request.files = Some(vec![
            ContentFile::new("css/site.css", "body{}"),
            ContentFile::new("./index.html", "<h1>hi</h1>"),
        ]);

        let spec = validate_request(&request).unwrap();
        match spec.source {
            ContentSource::Files { files, entry } => {
                assert_eq!(entry, "index.html");
                assert_eq!(files[1].path, "index.html");
                assert_eq!(files[1].content, b"<h1>hi</h1>");
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_entry_falls_back_to_first_html() {
        let files = vec![
            ContentFile::new("app.js", "1"),
            ContentFile::new("pages/home.htm", "2"),
        ];
        assert_eq!(select_entry(&files), Some("pages/home.htm".to_string()));

        let files = vec![ContentFile::new("app.js", "1")];
        assert_eq!(select_entry(&files), Some("app.js".to_string()));
    }

    #[test]
    fn test_junk_only_upload_is_empty() {
        let mut request = url_request();
        request.url = None;
        request.files = Some(vec![
            ContentFile::new(".DS_Store", "x"),
            ContentFile::new("__MACOSX/._index.html", "x"),
        ]);
        assert_eq!(validate_request(&request).unwrap_err().field, "files");
    }

    #[test]
    fn test_path_traversal_rejected() {
        let files = vec![ContentFile::new("../etc/passwd", "x")];
        assert_eq!(normalize_files(&files).unwrap_err().field, "files[0].path");

        let files = vec![ContentFile::new("/abs/index.html", "x")];
        assert!(normalize_files(&files).is_err());

        let files = vec![ContentFile::new("C:\\site\\index.html", "x")];
        assert!(normalize_files(&files).is_err());
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let files = vec![
            ContentFile::new("index.html", "a"),
            ContentFile::new("./index.html", "b"),
        ];
        assert_eq!(normalize_files(&files).unwrap_err().field, "files[1].path");
    }

    #[test]
    fn test_signing_override_normalised() {
        let mut request = url_request();
        request.signing = Some(SigningOverride {
            keystore_path: PathBuf::from("/keys/app.keystore"),
            keystore_password: "secret123".to_string(),
            key_alias: " upload ".to_string(),
            key_password: None,
        });

        let spec = validate_request(&request).unwrap();
        let signing = spec.signing.unwrap();
        assert_eq!(signing.key_alias, "upload");
        assert_eq!(signing.key_password.as_deref(), Some("secret123"));
    }

    #[test]
    fn test_short_password_rejected() {
        let mut request = url_request();
        request.signing = Some(SigningOverride {
            keystore_path: PathBuf::from("/keys/app.keystore"),
            keystore_password: "abc".to_string(),
            key_alias: "upload".to_string(),
            key_password: None,
        });
        assert_eq!(
            validate_request(&request).unwrap_err().field,
            "signing.keystore_password"
        );
    }

    #[test]
    fn test_subject_and_options() {
        let mut request = url_request();
        request.subject.country = Some("nl".to_string());
        request.subject.city = Some("  ".to_string());
        request.options.theme_color = "#ff0000".to_string();

        let spec = validate_request(&request).unwrap();
        assert_eq!(spec.subject.country.as_deref(), Some("NL"));
        assert!(spec.subject.city.is_none());
        assert_eq!(spec.options.theme_color, "#FF0000");

        request.options.theme_color = "red".to_string();
        assert_eq!(
            validate_request(&request).unwrap_err().field,
            "options.theme_color"
        );
    }
}
