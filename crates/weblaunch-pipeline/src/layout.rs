//! On-disk layout of a job's working directory

use std::path::{Path, PathBuf};

use crate::stage::Stage;

/// Paths of every input and output inside one working directory.
///
/// Stage contracts are expressed in terms of these paths, so any
/// toolchain adapter produces its outputs in the same places.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    root: PathBuf,
}

impl BuildLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // Project skeleton

    pub fn project_dir(&self) -> PathBuf {
        self.root.join("project")
    }

    pub fn manifest(&self) -> PathBuf {
        self.project_dir().join("AndroidManifest.xml")
    }

    pub fn res_dir(&self) -> PathBuf {
        self.project_dir().join("res")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.project_dir().join("assets")
    }

    pub fn java_dir(&self) -> PathBuf {
        self.project_dir().join("src")
    }

    /// Generated sources such as `R.java`
    pub fn gen_dir(&self) -> PathBuf {
        self.root.join("gen")
    }

    // Intermediates

    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    pub fn compiled_resources(&self) -> PathBuf {
        self.build_dir().join("compiled-res.zip")
    }

    pub fn linked_resources(&self) -> PathBuf {
        self.build_dir().join("linked.apk")
    }

    pub fn classes_dir(&self) -> PathBuf {
        self.build_dir().join("classes")
    }

    pub fn dex_dir(&self) -> PathBuf {
        self.build_dir().join("dex")
    }

    pub fn classes_dex(&self) -> PathBuf {
        self.dex_dir().join("classes.dex")
    }

    pub fn proto_resources(&self) -> PathBuf {
        self.build_dir().join("proto.apk")
    }

    pub fn bundle_module(&self) -> PathBuf {
        self.build_dir().join("base.zip")
    }

    pub fn bundle_config(&self) -> PathBuf {
        self.build_dir().join("BundleConfig.json")
    }

    pub fn unsigned_bundle(&self) -> PathBuf {
        self.build_dir().join("app-unsigned.aab")
    }

    // Stage outputs

    pub fn unsigned_apk(&self) -> PathBuf {
        self.root.join("app-unsigned.apk")
    }

    pub fn signed_apk(&self) -> PathBuf {
        self.root.join("app-signed.apk")
    }

    pub fn aligned_apk(&self) -> PathBuf {
        self.root.join("app-aligned.apk")
    }

    pub fn bundle(&self) -> PathBuf {
        self.root.join("app.aab")
    }

    /// Where a newly generated keystore is written
    pub fn identity_dir(&self) -> PathBuf {
        self.root.join("identity")
    }

    /// The output a stage must leave behind
    pub fn stage_output(&self, stage: Stage) -> PathBuf {
        match stage {
            Stage::Resources => self.linked_resources(),
            Stage::Compile => self.classes_dir(),
            Stage::Dex => self.classes_dex(),
            Stage::Package => self.unsigned_apk(),
            Stage::Sign => self.signed_apk(),
            Stage::Align => self.aligned_apk(),
            Stage::Bundle => self.bundle(),
        }
    }

    /// Directories the stages write into
    pub fn create_build_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.gen_dir(),
            self.build_dir(),
            self.classes_dir(),
            self.dex_dir(),
            self.identity_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_outputs_are_distinct() {
        let layout = BuildLayout::new("/work/job");
        let mut outputs: Vec<PathBuf> = Stage::ALL.iter().map(|s| layout.stage_output(*s)).collect();
        outputs.sort();
        outputs.dedup();
        assert_eq!(outputs.len(), Stage::ALL.len());
    }

    #[test]
    fn test_paths_under_root() {
        let layout = BuildLayout::new("/work/job");
        assert_eq!(
            layout.manifest(),
            PathBuf::from("/work/job/project/AndroidManifest.xml")
        );
        assert_eq!(
            layout.classes_dex(),
            PathBuf::from("/work/job/build/dex/classes.dex")
        );
        assert!(layout.stage_output(Stage::Bundle).starts_with(layout.root()));
    }
}
