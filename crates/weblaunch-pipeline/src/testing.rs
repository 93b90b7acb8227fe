//! In-process toolchain and key generator for pipeline tests
//!
//! [`ScriptedToolchain`] writes small but structurally valid archives in
//! place of the real SDK tools, and can be told to fail, or to run a shell
//! command through the process runner, at any stage. Like `jarsigner`, its
//! signing step writes `META-INF/` ahead of the other entries.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use weblaunch_packager::{ArchiveBuilder, ArchiveInventory, PackagerError};
use weblaunch_signing::{KeyGenerator, KeyRequest, SigningError};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ToolError;
use crate::process::ToolInvocation;
use crate::stage::Stage;
use crate::toolchain::{PrerequisiteStatus, StageContext, Toolchain};

/// What a stage does instead of its normal work
#[derive(Debug, Clone)]
pub enum Script {
    /// Fail as if the tool exited with code 1
    Fail(String),
    /// Run `sh -c` through the process runner first; on success continue
    Shell(String),
    /// Report success without writing any output
    NoOutput,
}

#[derive(Default)]
pub struct ScriptedToolchain {
    scripts: HashMap<Stage, Script>,
}

impl ScriptedToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: Stage, script: Script) -> Self {
        self.scripts.insert(stage, script);
        self
    }

    /// Returns `Some` when the step should stop here
    async fn intercept(
        &self,
        ctx: &StageContext<'_>,
        step: &'static str,
    ) -> Option<Result<(), ToolError>> {
        match self.scripts.get(&ctx.stage)? {
            Script::Fail(stderr) => Some(Err(ToolError::Exit {
                tool: step.to_string(),
                code: Some(1),
                stderr: stderr.clone(),
            })),
            Script::Shell(script) => {
                let inv = ToolInvocation::new("sh", "sh").arg("-c").arg(script);
                match ctx.run(&inv).await {
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            }
            Script::NoOutput => Some(Ok(())),
        }
    }
}

fn write(path: &Path, data: &[u8]) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

/// Entry the scripted align step adds, so aligned output differs from its input
pub const ALIGNED_MARKER: &str = "META-INF/ALIGNED";

fn zip_error(err: zip::result::ZipError) -> ToolError {
    PackagerError::from(err).into()
}

fn manifest_bytes(ctx: &StageContext<'_>) -> Result<Vec<u8>, ToolError> {
    Ok(std::fs::read(ctx.layout.manifest())?)
}

#[async_trait]
impl Toolchain for ScriptedToolchain {
    fn id(&self) -> &'static str {
        "scripted"
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }

    async fn check_prerequisites(&self) -> PrerequisiteStatus {
        PrerequisiteStatus::ok()
    }

    async fn compile_resources(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        if let Some(result) = self.intercept(ctx, "aapt2").await {
            return result;
        }
        let layout = ctx.layout;
        let mut linked = ArchiveBuilder::new();
        linked.add("AndroidManifest.xml", manifest_bytes(ctx)?)?;
        linked.add("resources.arsc", ctx.spec.app_name.as_bytes().to_vec())?;
        linked.add_dir("res/", &layout.res_dir())?;
        linked.write_to(&layout.linked_resources())?;

        let r_java = layout
            .gen_dir()
            .join(ctx.spec.package_id.as_path())
            .join("R.java");
        write(&r_java, format!("package {};\npublic final class R {{}}\n", ctx.spec.package_id).as_bytes())
    }

    async fn compile_sources(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        if let Some(result) = self.intercept(ctx, "javac").await {
            return result;
        }
        let layout = ctx.layout;
        let source = layout
            .java_dir()
            .join(ctx.spec.package_id.as_path())
            .join("MainActivity.java");
        let class = layout
            .classes_dir()
            .join(ctx.spec.package_id.as_path())
            .join("MainActivity.class");
        write(&class, &std::fs::read(source)?)
    }

    async fn lower_bytecode(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        if let Some(result) = self.intercept(ctx, "d8").await {
            return result;
        }
        let mut dex = b"dex\n035\0".to_vec();
        dex.extend_from_slice(ctx.spec.package_id.as_str().as_bytes());
        write(&ctx.layout.classes_dex(), &dex)
    }

    async fn sign(&self, ctx: &StageContext<'_>, input: &Path, output: &Path) -> Result<(), ToolError> {
        if let Some(result) = self.intercept(ctx, "jarsigner").await {
            return result;
        }
        let unsigned = ArchiveInventory::read(input)?;
        let alias = ctx.identity.key_alias.to_ascii_uppercase();
        let mut entries = vec![
            ("META-INF/MANIFEST.MF".to_string(), b"Manifest-Version: 1.0\n".to_vec(), false),
            (format!("META-INF/{}.SF", alias), b"Signature-Version: 1.0\n".to_vec(), false),
            (format!("META-INF/{}.RSA", alias), ctx.identity.key_alias.as_bytes().to_vec(), false),
        ];
        for entry in &unsigned.entries {
            entries.push((entry.name.clone(), unsigned.read_entry(&entry.name)?, entry.stored));
        }

        let mut zip = ZipWriter::new(File::create(output)?);
        for (name, data, stored) in entries {
            let method = if stored {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            let options = SimpleFileOptions::default()
                .compression_method(method)
                .last_modified_time(zip::DateTime::default());
            zip.start_file(name, options).map_err(zip_error)?;
            zip.write_all(&data)?;
        }
        zip.finish().map_err(zip_error)?;
        Ok(())
    }

    async fn align(&self, ctx: &StageContext<'_>, input: &Path, output: &Path) -> Result<(), ToolError> {
        if let Some(result) = self.intercept(ctx, "zipalign").await {
            return result;
        }
        let mut aligned = ArchiveBuilder::new();
        aligned.merge_archive(input, |name| Some(name.to_string()))?;
        aligned.add(ALIGNED_MARKER, b"4".to_vec())?;
        aligned.write_to(output)?;
        Ok(())
    }

    async fn link_bundle_resources(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        if let Some(result) = self.intercept(ctx, "aapt2").await {
            return result;
        }
        let layout = ctx.layout;
        let mut proto = ArchiveBuilder::new();
        proto.add("AndroidManifest.xml", manifest_bytes(ctx)?)?;
        proto.add("resources.pb", ctx.spec.app_name.as_bytes().to_vec())?;
        proto.add_dir("res/", &layout.res_dir())?;
        proto.write_to(&layout.proto_resources())?;
        Ok(())
    }

    async fn build_bundle(&self, ctx: &StageContext<'_>) -> Result<(), ToolError> {
        if let Some(result) = self.intercept(ctx, "bundletool").await {
            return result;
        }
        let layout = ctx.layout;
        let mut bundle = ArchiveBuilder::new();
        bundle.merge_archive(&layout.bundle_module(), |name| Some(format!("base/{}", name)))?;
        bundle.add("BundleConfig.pb", std::fs::read(layout.bundle_config())?)?;
        bundle.write_to(&layout.unsigned_bundle())?;
        Ok(())
    }
}

/// Writes a placeholder keystore, or fails on demand
#[derive(Debug, Default)]
pub struct FakeKeyGenerator {
    pub fail: bool,
}

impl FakeKeyGenerator {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl KeyGenerator for FakeKeyGenerator {
    fn name(&self) -> &str {
        "fake-keytool"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        request: &KeyRequest,
        keystore: &Path,
        _timeout: Duration,
    ) -> weblaunch_signing::Result<()> {
        if self.fail {
            return Err(SigningError::ToolFailed {
                tool: "keytool".to_string(),
                reason: "keytool error: java.lang.Exception: simulated failure".to_string(),
            });
        }
        std::fs::write(keystore, format!("keystore:{}", request.alias))?;
        Ok(())
    }
}
