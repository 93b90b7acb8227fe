//! Project skeleton generation
//!
//! Writes everything the toolchain needs into a job's working directory:
//! manifest, launcher activity source, string resources, launcher icons,
//! and the web payload under `assets/`. The same spec always produces the
//! same tree.

use std::path::{Component, Path, PathBuf};

use tracing::debug;
use weblaunch_core::{BuildSpec, ContentFile, ContentSource};

use crate::error::ScaffoldError;
use crate::icons::launcher_icons;
use crate::layout::BuildLayout;

/// Offline page bundled with URL-sourced apps
pub const LOADER_PAGE: &str = "loader.html";

const ASSET_URL_PREFIX: &str = "file:///android_asset/";

/// What was written
#[derive(Debug, Clone)]
pub struct ScaffoldReport {
    /// URL the activity loads at launch
    pub start_url: String,
    /// Asset paths, relative to `assets/`
    pub assets: Vec<String>,
    pub files_written: usize,
}

/// Write the project skeleton for `spec` under `layout`
pub fn scaffold_project(spec: &BuildSpec, layout: &BuildLayout) -> Result<ScaffoldReport, ScaffoldError> {
    let mut writer = TreeWriter::default();

    let (start_url, assets) = match spec.source {
        ContentSource::Url(ref url) => {
            writer.write(
                &layout.assets_dir().join(LOADER_PAGE),
                render_loader_page(spec, url).as_bytes(),
            )?;
            (url.clone(), vec![LOADER_PAGE.to_string()])
        }
        ContentSource::Files {
            ref files,
            ref entry,
        } => {
            if files.is_empty() {
                return Err(ScaffoldError::EmptyContent);
            }
            let assets = write_assets(&mut writer, &layout.assets_dir(), files)?;
            (asset_url(entry), assets)
        }
    };

    writer.write(&layout.manifest(), render_manifest(spec).as_bytes())?;
    writer.write(
        &layout.res_dir().join("values").join("strings.xml"),
        render_strings(spec).as_bytes(),
    )?;

    for icon in launcher_icons(spec.package_id.as_str(), spec.icon.as_deref())? {
        writer.write(&layout.res_dir().join(icon.resource_path()), &icon.png)?;
    }

    let activity = layout
        .java_dir()
        .join(spec.package_id.as_path())
        .join("MainActivity.java");
    writer.write(&activity, render_activity(spec, &start_url).as_bytes())?;

    debug!(
        package = %spec.package_id,
        files = writer.count,
        start_url = %start_url,
        "project scaffolded"
    );

    Ok(ScaffoldReport {
        start_url,
        assets,
        files_written: writer.count,
    })
}

#[derive(Default)]
struct TreeWriter {
    count: usize,
}

impl TreeWriter {
    fn write(&mut self, path: &Path, content: &[u8]) -> Result<(), ScaffoldError> {
        let to_error = |source| ScaffoldError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(to_error)?;
        }
        std::fs::write(path, content).map_err(to_error)?;
        self.count += 1;
        Ok(())
    }
}

fn write_assets(
    writer: &mut TreeWriter,
    assets_dir: &Path,
    files: &[ContentFile],
) -> Result<Vec<String>, ScaffoldError> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let relative = safe_relative_path(&file.path)?;
        writer.write(&assets_dir.join(relative), &file.content)?;
        written.push(file.path.clone());
    }
    Ok(written)
}

/// Reject anything that could land outside the assets directory
fn safe_relative_path(path: &str) -> Result<PathBuf, ScaffoldError> {
    let invalid = || ScaffoldError::InvalidPath(path.to_string());
    if path.is_empty() || path.contains('\\') || path.split('/').any(str::is_empty) {
        return Err(invalid());
    }
    let relative = PathBuf::from(path);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(invalid());
    }
    Ok(relative)
}

/// URL of a bundled asset, each path segment percent-encoded
pub fn asset_url(path: &str) -> String {
    let encoded: Vec<String> = path.split('/').map(percent_encode).collect();
    format!("{}{}", ASSET_URL_PREFIX, encoded.join("/"))
}

fn percent_encode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn render_manifest(spec: &BuildSpec) -> String {
    let theme = if spec.options.fullscreen {
        "@android:style/Theme.DeviceDefault.Light.NoActionBar.Fullscreen"
    } else {
        "@android:style/Theme.DeviceDefault.Light.NoActionBar"
    };
    let cleartext = match spec.source {
        ContentSource::Url(ref url) if url.starts_with("http://") => {
            "\n        android:usesCleartextTraffic=\"true\""
        }
        _ => "",
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="{package}"
    android:versionCode="{version_code}"
    android:versionName="{version_name}">

    <uses-permission android:name="android.permission.INTERNET" />
    <uses-permission android:name="android.permission.ACCESS_NETWORK_STATE" />

    <application
        android:label="@string/app_name"
        android:icon="@mipmap/ic_launcher"
        android:allowBackup="true"
        android:hardwareAccelerated="true"{cleartext}
        android:theme="{theme}">
        <activity
            android:name=".MainActivity"
            android:exported="true"
            android:screenOrientation="{orientation}"
            android:configChanges="orientation|screenSize|keyboardHidden">
            <intent-filter>
                <action android:name="android.intent.action.MAIN" />
                <category android:name="android.intent.category.LAUNCHER" />
            </intent-filter>
        </activity>
    </application>
</manifest>
"#,
        package = spec.package_id,
        version_code = spec.version_code,
        version_name = xml_escape(&spec.version_name),
        cleartext = cleartext,
        theme = theme,
        orientation = spec.options.orientation.as_manifest_value(),
    )
}

fn render_strings(spec: &BuildSpec) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <string name="app_name">{}</string>
</resources>
"#,
        android_string_escape(&spec.app_name)
    )
}

fn render_activity(spec: &BuildSpec, start_url: &str) -> String {
    let fallback = if spec.source.is_url() {
        format!("\"{}{}\"", ASSET_URL_PREFIX, LOADER_PAGE)
    } else {
        "null".to_string()
    };

    format!(
        r#"package {package};

import android.app.Activity;
import android.graphics.Color;
import android.os.Build;
import android.os.Bundle;
import android.webkit.WebSettings;
import android.webkit.WebView;
import android.webkit.WebViewClient;

public class MainActivity extends Activity {{
    private static final String START_URL = "{start_url}";
    private static final String FALLBACK_URL = {fallback};
    private static final String THEME_COLOR = "{theme_color}";

    private WebView webView;

    @Override
    protected void onCreate(Bundle savedInstanceState) {{
        super.onCreate(savedInstanceState);

        if (Build.VERSION.SDK_INT >= 21) {{
            getWindow().setStatusBarColor(Color.parseColor(THEME_COLOR));
        }}

        webView = new WebView(this);
        WebSettings settings = webView.getSettings();
        settings.setJavaScriptEnabled(true);
        settings.setDomStorageEnabled(true);
        settings.setAllowFileAccess(true);
        settings.setLoadWithOverviewMode(true);
        settings.setUseWideViewPort(true);

        webView.setWebViewClient(new WebViewClient() {{
            @Override
            public void onReceivedError(WebView view, int errorCode, String description, String failingUrl) {{
                if (FALLBACK_URL != null && START_URL.equals(failingUrl)) {{
                    view.loadUrl(FALLBACK_URL);
                }}
            }}
        }});

        setContentView(webView);

        if (savedInstanceState != null) {{
            webView.restoreState(savedInstanceState);
        }} else {{
            webView.loadUrl(START_URL);
        }}
    }}

    @Override
    protected void onSaveInstanceState(Bundle outState) {{
        super.onSaveInstanceState(outState);
        webView.saveState(outState);
    }}

    @Override
    public void onBackPressed() {{
        if (webView.canGoBack()) {{
            webView.goBack();
        }} else {{
            super.onBackPressed();
        }}
    }}
}}
"#,
        package = spec.package_id,
        start_url = java_string_escape(start_url),
        fallback = fallback,
        theme_color = spec.options.theme_color,
    )
}

fn render_loader_page(spec: &BuildSpec, url: &str) -> String {
    let name = xml_escape(&spec.app_name);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{name}</title>
<style>
body {{ margin: 0; height: 100vh; display: flex; align-items: center; justify-content: center; font-family: sans-serif; text-align: center; background: {color}; color: #fff; }}
a {{ color: #fff; font-weight: bold; }}
</style>
</head>
<body>
<main>
<h1>{name}</h1>
<p>Unable to reach the server. Check your connection.</p>
<p><a href="{url}">Try again</a></p>
</main>
</body>
</html>
"#,
        name = name,
        color = spec.options.theme_color,
        url = xml_escape(url),
    )
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape for a `<string>` resource: aapt treats quotes, backslashes and a
/// leading `@` or `?` specially
fn android_string_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    if s.starts_with('@') || s.starts_with('?') {
        out.push('\\');
    }
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn java_string_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out
}
