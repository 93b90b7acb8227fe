//! Android SDK command-line toolchain
//!
//! aapt2, d8 and zipalign come from the SDK build-tools, javac and
//! jarsigner from the JDK, bundletool from a jar or PATH. Locations are
//! resolved once at construction from [`HostToolchainConfig`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;
use weblaunch_core::HostToolchainConfig;

use super::{PrerequisiteStatus, StageContext, ToolStatus, Toolchain};
use crate::error::ToolError;
use crate::process::ToolInvocation;

const STOREPASS_ENV: &str = "WEBLAUNCH_STOREPASS";
const KEYPASS_ENV: &str = "WEBLAUNCH_KEYPASS";

const SDK_HINT: &str = "Install Android SDK build-tools and set ANDROID_HOME";
const JDK_HINT: &str = "Install JDK 11 or later and set JAVA_HOME";

/// A located (or not) host tool
#[derive(Debug, Clone)]
struct HostTool {
    name: &'static str,
    path: Option<PathBuf>,
    hint: &'static str,
}

impl HostTool {
    fn new(name: &'static str, path: Option<PathBuf>, hint: &'static str) -> Self {
        Self { name, path, hint }
    }

    fn invocation(&self) -> Result<ToolInvocation, ToolError> {
        match self.path {
            Some(ref path) => Ok(ToolInvocation::new(self.name, path)),
            None => Err(ToolError::NotFound {
                tool: self.name.to_string(),
                hint: self.hint.to_string(),
            }),
        }
    }

    fn status(&self) -> ToolStatus {
        match self.path {
            Some(ref path) => ToolStatus::found(self.name, path),
            None => ToolStatus::missing(self.name, self.hint),
        }
    }
}

/// How bundletool is launched
#[derive(Debug, Clone)]
enum Bundletool {
    Jar { java: PathBuf, jar: PathBuf },
    Binary(PathBuf),
    Missing,
}

/// Toolchain built on the Android SDK command-line tools
#[derive(Debug, Clone)]
pub struct AndroidSdkToolchain {
    aapt2: HostTool,
    d8: HostTool,
    zipalign: HostTool,
    javac: HostTool,
    jarsigner: HostTool,
    bundletool: Bundletool,
    android_jar: Option<PathBuf>,
    min_sdk: u32,
    target_sdk: u32,
}

impl AndroidSdkToolchain {
    pub fn new(config: &HostToolchainConfig) -> Self {
        let build_tools = config
            .sdk_root
            .as_deref()
            .and_then(|sdk| build_tools_dir(sdk, config.build_tools_version.as_deref()));
        if let Some(ref dir) = build_tools {
            debug!(build_tools = %dir.display(), "resolved android build-tools");
        }

        let sdk_tool = |name: &str, file: String| -> Option<PathBuf> {
            build_tools
                .as_ref()
                .map(|dir| dir.join(&file))
                .filter(|p| p.is_file())
                .or_else(|| which::which(name).ok())
        };
        let jdk_tool = |name: &str| -> Option<PathBuf> {
            config
                .java_home
                .as_ref()
                .map(|home| home.join("bin").join(exe_name(name)))
                .filter(|p| p.is_file())
                .or_else(|| which::which(name).ok())
        };

        let android_jar = config
            .sdk_root
            .as_ref()
            .map(|sdk| sdk.join("platforms").join(&config.platform).join("android.jar"))
            .filter(|p| p.is_file());

        let bundletool = match (config.bundletool_jar.as_ref(), jdk_tool("java")) {
            (Some(jar), Some(java)) if jar.is_file() => Bundletool::Jar {
                java,
                jar: jar.clone(),
            },
            _ => match which::which("bundletool") {
                Ok(path) => Bundletool::Binary(path),
                Err(_) => Bundletool::Missing,
            },
        };

        Self {
            aapt2: HostTool::new("aapt2", sdk_tool("aapt2", exe_name("aapt2")), SDK_HINT),
            d8: HostTool::new("d8", sdk_tool("d8", script_name("d8")), SDK_HINT),
            zipalign: HostTool::new(
                "zipalign",
                sdk_tool("zipalign", exe_name("zipalign")),
                SDK_HINT,
            ),
            javac: HostTool::new("javac", jdk_tool("javac"), JDK_HINT),
            jarsigner: HostTool::new("jarsigner", jdk_tool("jarsigner"), JDK_HINT),
            bundletool,
            android_jar,
            min_sdk: config.min_sdk,
            target_sdk: config.target_sdk,
        }
    }

    fn android_jar(&self) -> Result<&Path, ToolError> {
        self.android_jar
            .as_deref()
            .ok_or_else(|| ToolError::NotFound {
                tool: "android.jar".to_string(),
                hint: "Install the compile platform with sdkmanager".to_string(),
            })
    }

    fn bundletool(&self) -> Result<ToolInvocation, ToolError> {
        match self.bundletool {
            Bundletool::Jar { ref java, ref jar } => {
                Ok(ToolInvocation::new("bundletool", java).arg("-jar").arg(jar))
            }
            Bundletool::Binary(ref path) => Ok(ToolInvocation::new("bundletool", path)),
            Bundletool::Missing => Err(ToolError::NotFound {
                tool: "bundletool".to_string(),
                hint: "Download bundletool and set toolchain.bundletool_jar".to_string(),
            }),
        }
    }

    /// aapt2 link arguments shared by the binary and protobuf outputs
    fn link_args(&self, ctx: &StageContext<'_>) -> Result<Vec<OsString>, ToolError> {
        let spec = ctx.spec;
        Ok(vec![
            "link".into(),
            "-I".into(),
            self.android_jar()?.into(),
            "--manifest".into(),
            ctx.layout.manifest().into(),
            "--min-sdk-version".into(),
            self.min_sdk.to_string().into(),
            "--target-sdk-version".into(),
            self.target_sdk.to_string().into(),
            "--version-code".into(),
            spec.version_code.to_string().into(),
            "--version-name".into(),
            spec.version_name.clone().into(),
            "--auto-add-overlay".into(),
        ])
    }
}

#[async_trait]
impl Toolchain for AndroidSdkToolchain {
    fn id(&self) -> &'static str {
        "android-sdk"
    }

    fn name(&self) -> &'static str {
        "Android SDK"
    }

    async fn check_prerequisites(&self) -> PrerequisiteStatus {
        let mut status = PrerequisiteStatus::ok()
            .with_tool(self.aapt2.status())
            .with_tool(self.d8.status())
            .with_tool(self.javac.status())
            .with_tool(self.jarsigner.status());

        status = match self.android_jar {
            Some(ref jar) => status.with_tool(ToolStatus::found("android.jar", jar)),
            None => status.with_tool(ToolStatus::missing(
                "android.jar",
                "Install the compile platform with sdkmanager",
            )),
        };

        status = status.with_optional_tool(
            self.zipalign.status(),
            "packages will be delivered unaligned",
        );

        let bundletool = match self.bundletool {
            Bundletool::Jar { ref jar, .. } => ToolStatus::found("bundletool", jar),
            Bundletool::Binary(ref path) => ToolStatus::found("bundletool", path),
            Bundletool::Missing => ToolStatus::missing(
                "bundletool",
                "Download bundletool and set toolchain.bundletool_jar",
            ),
        };
        status.with_optional_tool(bundletool, "no app bundle will be produced")
    }

    async fn compile_resources(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        let layout = ctx.layout;

        let compile = self
            .aapt2
            .invocation()?
            .arg("compile")
            .arg("--dir")
            .arg(layout.res_dir())
            .arg("-o")
            .arg(layout.compiled_resources());
        ctx.run(&compile).await?;

        let link = self
            .aapt2
            .invocation()?
            .args(self.link_args(ctx)?)
            .arg("--java")
            .arg(layout.gen_dir())
            .arg("-o")
            .arg(layout.linked_resources())
            .arg(layout.compiled_resources());
        ctx.run(&link).await?;
        Ok(())
    }

    async fn compile_sources(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        let layout = ctx.layout;
        let sources = files_with_extension(&[layout.java_dir(), layout.gen_dir()], "java");
        if sources.is_empty() {
            return Err(ToolError::MissingOutput(layout.java_dir()));
        }

        let javac = self
            .javac
            .invocation()?
            .args(["-source", "8", "-target", "8", "-encoding", "UTF-8", "-nowarn"])
            .arg("-Xlint:-options")
            .arg("-classpath")
            .arg(self.android_jar()?)
            .arg("-d")
            .arg(layout.classes_dir())
            .args(sources);
        ctx.run(&javac).await?;
        Ok(())
    }

    async fn lower_bytecode(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        let layout = ctx.layout;
        let classes = files_with_extension(&[layout.classes_dir()], "class");
        if classes.is_empty() {
            return Err(ToolError::MissingOutput(layout.classes_dir()));
        }

        let d8 = self
            .d8
            .invocation()?
            .arg("--release")
            .arg("--min-api")
            .arg(self.min_sdk.to_string())
            .arg("--lib")
            .arg(self.android_jar()?)
            .arg("--output")
            .arg(layout.dex_dir())
            .args(classes);
        ctx.run(&d8).await?;
        Ok(())
    }

    async fn sign(
        &self,
        ctx: &StageContext<'_>,
        input: &Path,
        output: &Path,
    ) -> Result<(), ToolError> {
        let identity = ctx.identity;
        let mut jarsigner = self
            .jarsigner
            .invocation()?
            .arg("-keystore")
            .arg(&identity.keystore_path);
        if !identity.reused {
            jarsigner = jarsigner.arg("-storetype").arg("PKCS12");
        }
        let jarsigner = jarsigner
            .args(["-storepass:env", STOREPASS_ENV, "-keypass:env", KEYPASS_ENV])
            .args(["-sigalg", "SHA256withRSA", "-digestalg", "SHA-256"])
            .arg("-signedjar")
            .arg(output)
            .arg(input)
            .arg(&identity.key_alias)
            .env(STOREPASS_ENV, identity.store_password.clone())
            .env(KEYPASS_ENV, identity.key_password.clone());
        ctx.run(&jarsigner).await?;
        Ok(())
    }

    async fn align(
        &self,
        ctx: &StageContext<'_>,
        input: &Path,
        output: &Path,
    ) -> Result<(), ToolError> {
        let zipalign = self
            .zipalign
            .invocation()?
            .args(["-p", "-f", "4"])
            .arg(input)
            .arg(output);
        ctx.run(&zipalign).await?;
        Ok(())
    }

    async fn link_bundle_resources(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        let layout = ctx.layout;
        let link = self
            .aapt2
            .invocation()?
            .args(self.link_args(ctx)?)
            .arg("--proto-format")
            .arg("-o")
            .arg(layout.proto_resources())
            .arg(layout.compiled_resources());
        ctx.run(&link).await?;
        Ok(())
    }

    async fn build_bundle(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        let layout = ctx.layout;
        let mut modules = OsString::from("--modules=");
        modules.push(layout.bundle_module());
        let mut config = OsString::from("--config=");
        config.push(layout.bundle_config());
        let mut output = OsString::from("--output=");
        output.push(layout.unsigned_bundle());

        let build = self
            .bundletool()?
            .arg("build-bundle")
            .arg(modules)
            .arg(config)
            .arg(output)
            .arg("--overwrite");
        ctx.run(&build).await?;
        Ok(())
    }
}

/// Pick the build-tools directory: the requested version, or the highest
/// numerically ordered one installed
fn build_tools_dir(sdk_root: &Path, version: Option<&str>) -> Option<PathBuf> {
    let base = sdk_root.join("build-tools");
    if let Some(version) = version {
        let dir = base.join(version);
        return dir.is_dir().then_some(dir);
    }

    let mut installed: Vec<(Vec<u32>, PathBuf)> = std::fs::read_dir(&base)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let version = parse_version(&entry.file_name().to_string_lossy())?;
            Some((version, entry.path()))
        })
        .collect();
    installed.sort();
    installed.pop().map(|(_, path)| path)
}

/// "34.0.0" -> [34, 0, 0]; pre-release names are not considered
fn parse_version(name: &str) -> Option<Vec<u32>> {
    name.split('.').map(|part| part.parse().ok()).collect()
}

/// Files under `dirs` with the given extension, in sorted order
fn files_with_extension(dirs: &[PathBuf], ext: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = dirs
        .iter()
        .filter(|dir| dir.is_dir())
        .flat_map(|dir| WalkDir::new(dir).sort_by_file_name())
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|e| e == ext))
        .collect();
    files.sort();
    files
}

fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

fn script_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.bat", name)
    } else {
        name.to_string()
    }
}
