//! Build artifacts produced by a successful job

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::job::JobId;

/// Kind of artifact a caller can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Installable package
    Apk,
    /// Store distribution bundle
    Aab,
    /// Signing keystore
    Keystore,
    /// Zip of everything above plus a README
    Delivery,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [Self::Apk, Self::Aab, Self::Keystore, Self::Delivery];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Apk => "apk",
            Self::Aab => "aab",
            Self::Keystore => "keystore",
            Self::Delivery => "zip",
        }
    }

    /// File name inside a job's artifact directory
    pub fn file_name(&self, job: &JobId) -> String {
        format!("{}.{}", job, self.extension())
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "apk" => Some(Self::Apk),
            "aab" | "bundle" => Some(Self::Aab),
            "keystore" | "key" => Some(Self::Keystore),
            "delivery" | "zip" => Some(Self::Delivery),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Apk => "apk",
            Self::Aab => "aab",
            Self::Keystore => "keystore",
            Self::Delivery => "delivery",
        })
    }
}

/// A file in a job's artifact directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// SHA-256, hex encoded
    pub sha256: String,
}

impl Artifact {
    /// Describe an existing file, hashing its content
    pub fn from_file(kind: ArtifactKind, path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let (size, sha256) = hash_file(&path)?;
        Ok(Self {
            kind,
            path,
            size,
            sha256,
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

fn hash_file(path: &Path) -> std::io::Result<(u64, String)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, format!("{:x}", hasher.finalize())))
}

/// Everything a successful job produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    pub apk: Artifact,
    /// Absent when the bundle stage was skipped
    pub aab: Option<Artifact>,
    pub keystore: Artifact,
    /// Credentials for the keystore
    pub identity_record: PathBuf,
    /// Created on request after the build
    pub delivery: Option<Artifact>,
}

impl Artifacts {
    pub fn get(&self, kind: ArtifactKind) -> Option<&Artifact> {
        match kind {
            ArtifactKind::Apk => Some(&self.apk),
            ArtifactKind::Aab => self.aab.as_ref(),
            ArtifactKind::Keystore => Some(&self.keystore),
            ArtifactKind::Delivery => self.delivery.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        ArtifactKind::ALL.into_iter().filter_map(|k| self.get(k))
    }
}

/// Read access to one artifact of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactHandle {
    pub job_id: JobId,
    pub artifact: Artifact,
}

impl ArtifactHandle {
    pub fn path(&self) -> &Path {
        &self.artifact.path
    }

    pub fn open(&self) -> std::io::Result<std::fs::File> {
        std::fs::File::open(&self.artifact.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifact_hash() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.apk");
        std::fs::write(&path, b"hello").unwrap();

        let artifact = Artifact::from_file(ArtifactKind::Apk, &path).unwrap();
        assert_eq!(artifact.size, 5);
        assert_eq!(
            artifact.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_file_names() {
        let id: JobId = "0b6c5a4e-8f5e-4c83-9a51-3f0f1b0e2d11".parse().unwrap();
        assert_eq!(
            ArtifactKind::Aab.file_name(&id),
            "0b6c5a4e-8f5e-4c83-9a51-3f0f1b0e2d11.aab"
        );
        assert_eq!(
            ArtifactKind::Delivery.file_name(&id),
            "0b6c5a4e-8f5e-4c83-9a51-3f0f1b0e2d11.zip"
        );
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(ArtifactKind::parse("APK"), Some(ArtifactKind::Apk));
        assert_eq!(ArtifactKind::parse("bundle"), Some(ArtifactKind::Aab));
        assert_eq!(ArtifactKind::parse("ipa"), None);
    }
}
