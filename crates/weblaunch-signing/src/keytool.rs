//! Key pair generation through the JDK `keytool`

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{Result, SigningError};
use crate::identity::{DistinguishedName, DEFAULT_KEY_SIZE, DEFAULT_VALIDITY_DAYS};

const STOREPASS_ENV: &str = "WEBLAUNCH_STOREPASS";
const KEYPASS_ENV: &str = "WEBLAUNCH_KEYPASS";

/// Parameters for one new key pair
#[derive(Clone)]
pub struct KeyRequest {
    pub alias: String,
    pub store_password: String,
    pub key_password: String,
    pub distinguished_name: DistinguishedName,
    pub validity_days: u32,
    pub key_size: u32,
}

impl KeyRequest {
    pub fn new(
        alias: impl Into<String>,
        store_password: impl Into<String>,
        key_password: impl Into<String>,
        distinguished_name: DistinguishedName,
    ) -> Self {
        Self {
            alias: alias.into(),
            store_password: store_password.into(),
            key_password: key_password.into(),
            distinguished_name,
            validity_days: DEFAULT_VALIDITY_DAYS,
            key_size: DEFAULT_KEY_SIZE,
        }
    }
}

/// Something that can create a keystore holding one RSA key pair
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Tool name for messages
    fn name(&self) -> &str;

    /// Whether the tool can be run on this host
    fn is_available(&self) -> bool;

    /// Create `keystore` containing a key pair described by `request`.
    ///
    /// Must give up after `timeout`; dropping the future must stop any
    /// process it started.
    async fn generate(&self, request: &KeyRequest, keystore: &Path, timeout: Duration)
        -> Result<()>;
}

/// JDK keytool
#[derive(Debug, Clone)]
pub struct Keytool {
    program: PathBuf,
    process_slots: Option<Arc<Semaphore>>,
}

impl Keytool {
    /// Use an explicit keytool binary
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            process_slots: None,
        }
    }

    /// `$JAVA_HOME/bin/keytool` when it exists, otherwise whatever is on PATH
    pub fn locate(java_home: Option<&Path>) -> Self {
        let from_home = java_home
            .map(|home| home.join("bin").join(exe_name("keytool")))
            .filter(|p| p.exists());

        let program = from_home
            .or_else(|| which::which("keytool").ok())
            .unwrap_or_else(|| PathBuf::from("keytool"));

        debug!(program = %program.display(), "resolved keytool");
        Self::new(program)
    }

    /// Share a host-wide cap on concurrently running tools
    pub fn with_process_slots(mut self, slots: Arc<Semaphore>) -> Self {
        self.process_slots = Some(slots);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments; passwords travel through the environment
    fn args(request: &KeyRequest, keystore: &Path) -> Vec<String> {
        vec![
            "-genkeypair".to_string(),
            "-noprompt".to_string(),
            "-keystore".to_string(),
            keystore.to_string_lossy().into_owned(),
            "-storetype".to_string(),
            "PKCS12".to_string(),
            "-storepass:env".to_string(),
            STOREPASS_ENV.to_string(),
            "-keypass:env".to_string(),
            KEYPASS_ENV.to_string(),
            "-alias".to_string(),
            request.alias.clone(),
            "-keyalg".to_string(),
            "RSA".to_string(),
            "-keysize".to_string(),
            request.key_size.to_string(),
            "-validity".to_string(),
            request.validity_days.to_string(),
            "-dname".to_string(),
            request.distinguished_name.to_string(),
        ]
    }
}

fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

#[async_trait]
impl KeyGenerator for Keytool {
    fn name(&self) -> &str {
        "keytool"
    }

    fn is_available(&self) -> bool {
        self.program.is_file() || which::which(&self.program).is_ok()
    }

    async fn generate(
        &self,
        request: &KeyRequest,
        keystore: &Path,
        timeout: Duration,
    ) -> Result<()> {
        let _permit = match &self.process_slots {
            Some(slots) => Some(slots.clone().acquire_owned().await.map_err(|_| {
                SigningError::ToolFailed {
                    tool: "keytool".to_string(),
                    reason: "process pool closed".to_string(),
                }
            })?),
            None => None,
        };

        info!(keystore = %keystore.display(), alias = %request.alias, "generating signing key");

        let child = Command::new(&self.program)
            .args(Self::args(request, keystore))
            .env(STOREPASS_ENV, &request.store_password)
            .env(KEYPASS_ENV, &request.key_password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SigningError::ToolNotFound {
                        tool: "keytool".to_string(),
                        hint: "Install a JDK or set JAVA_HOME".to_string(),
                    }
                } else {
                    SigningError::ToolFailed {
                        tool: "keytool".to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(SigningError::Timeout {
                    tool: "keytool".to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let reason = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(SigningError::ToolFailed {
                tool: "keytool".to_string(),
                reason: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    reason
                ),
            });
        }

        if !keystore.is_file() {
            return Err(SigningError::KeystoreMissing(keystore.to_path_buf()));
        }

        debug!(keystore = %keystore.display(), "keystore created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weblaunch_core::SubjectFields;

    fn request() -> KeyRequest {
        KeyRequest::new(
            "release",
            "storepass1",
            "storepass1",
            DistinguishedName::from_subject(&SubjectFields::default()),
        )
    }

    #[test]
    fn test_args_keep_passwords_off_command_line() {
        let args = Keytool::args(&request(), Path::new("/tmp/release.keystore"));
        assert!(!args.iter().any(|a| a.contains("storepass1")));
        assert!(args.windows(2).any(|w| w[0] == "-keysize" && w[1] == "2048"));
        assert!(args.windows(2).any(|w| w[0] == "-validity" && w[1] == "10000"));
        assert!(args.windows(2).any(|w| w[0] == "-storetype" && w[1] == "PKCS12"));
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let tool = Keytool::new("/nonexistent/bin/keytool");
        assert!(!tool.is_available());

        let temp = tempfile::TempDir::new().unwrap();
        let err = tool
            .generate(
                &request(),
                &temp.path().join("k.keystore"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_reports_exit_code() {
        let tool = Keytool::new("false");
        let temp = tempfile::TempDir::new().unwrap();
        let err = tool
            .generate(
                &request(),
                &temp.path().join("k.keystore"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        match err {
            SigningError::ToolFailed { reason, .. } => assert!(reason.contains("exit code 1")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
