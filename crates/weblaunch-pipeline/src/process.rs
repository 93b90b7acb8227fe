//! Bounded, cancellable execution of external tools

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::ToolError;

/// Lines of stderr kept in an exit error
const STDERR_TAIL_LINES: usize = 20;

/// One external command to run
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Short tool name for logs and errors, e.g. "aapt2"
    pub tool: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable for the child only
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command line for logs. Environment values are never included.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured result of a successful invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Runs external tools under a host-wide concurrency cap.
///
/// Cloning shares the same slots.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    slots: Arc<Semaphore>,
}

impl ProcessRunner {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Shared slot pool, for other components that spawn processes
    pub fn slots(&self) -> Arc<Semaphore> {
        self.slots.clone()
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run `inv` to completion.
    ///
    /// The child is killed if it outlives `timeout` or if `cancel` fires.
    /// A non-zero exit becomes [`ToolError::Exit`] carrying the stderr tail.
    pub async fn run(
        &self,
        inv: &ToolInvocation,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ToolOutput, ToolError> {
        let _permit = tokio::select! {
            permit = self.slots.acquire() => permit.map_err(|_| ToolError::Cancelled {
                tool: inv.tool.clone(),
            })?,
            _ = cancel.cancelled() => {
                return Err(ToolError::Cancelled { tool: inv.tool.clone() });
            }
        };

        debug!(tool = %inv.tool, command = %inv.display(), "running tool");

        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args)
            .envs(&inv.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = inv.cwd {
            cmd.current_dir(cwd);
        }

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| spawn_error(inv, e))?;

        let output = tokio::select! {
            result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
                Ok(output) => output.map_err(|e| ToolError::Spawn {
                    tool: inv.tool.clone(),
                    source: e,
                })?,
                Err(_) => {
                    warn!(tool = %inv.tool, seconds = timeout.as_secs(), "tool timed out, killed");
                    return Err(ToolError::Timeout {
                        tool: inv.tool.clone(),
                        seconds: timeout.as_secs(),
                    });
                }
            },
            _ = cancel.cancelled() => {
                debug!(tool = %inv.tool, "tool cancelled, killed");
                return Err(ToolError::Cancelled { tool: inv.tool.clone() });
            }
        };

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            debug!(tool = %inv.tool, status = %output.status, "tool failed");
            return Err(ToolError::Exit {
                tool: inv.tool.clone(),
                code: output.status.code(),
                stderr: stderr_tail(&stderr, &stdout),
            });
        }

        debug!(tool = %inv.tool, elapsed_ms = duration.as_millis() as u64, "tool finished");
        Ok(ToolOutput {
            code: output.status.code().unwrap_or(0),
            stdout,
            stderr,
            duration,
        })
    }
}

fn spawn_error(inv: &ToolInvocation, e: std::io::Error) -> ToolError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ToolError::NotFound {
            tool: inv.tool.clone(),
            hint: format!("Looked for {}", inv.program.display()),
        }
    } else {
        ToolError::Spawn {
            tool: inv.tool.clone(),
            source: e,
        }
    }
}

/// Last lines of stderr, or of stdout when stderr is empty
fn stderr_tail(stderr: &str, stdout: &str) -> String {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Check a tool produced a non-empty file or directory
pub fn require_output(path: &Path) -> Result<(), ToolError> {
    let present = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len() > 0,
        Ok(meta) if meta.is_dir() => std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false),
        _ => false,
    };
    if present {
        Ok(())
    } else {
        Err(ToolError::MissingOutput(path.to_path_buf()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;

    fn sh(script: &str) -> ToolInvocation {
        ToolInvocation::new("sh", "sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let runner = ProcessRunner::new(2);
        let output = runner
            .run(&sh("echo hello"), Duration::from_secs(10), &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.code, 0);
    }

    #[tokio::test]
    async fn test_exit_code_and_stderr() {
        let runner = ProcessRunner::new(2);
        let err = runner
            .run(
                &sh("echo boom >&2; exit 3"),
                Duration::from_secs(10),
                &CancelToken::never(),
            )
            .await
            .unwrap_err();
        match err {
            ToolError::Exit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let runner = ProcessRunner::new(1);
        let output = runner
            .run(
                &sh("printf %s \"$WEBLAUNCH_TEST\"").env("WEBLAUNCH_TEST", "secret"),
                Duration::from_secs(10),
                &CancelToken::never(),
            )
            .await
            .unwrap();
        assert_eq!(output.stdout, "secret");
    }

    #[tokio::test]
    async fn test_timeout_kills() {
        let runner = ProcessRunner::new(1);
        let start = Instant::now();
        let err = runner
            .run(&sh("sleep 30"), Duration::from_millis(200), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(runner.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_cancel_kills() {
        let runner = ProcessRunner::new(1);
        let (handle, token) = cancel_pair();
        let task = tokio::spawn({
            let runner = runner.clone();
            async move {
                runner
                    .run(&sh("sleep 30"), Duration::from_secs(60), &token)
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runner = ProcessRunner::new(1);
        let err = runner
            .run(
                &ToolInvocation::new("nope", "/definitely/not/a/tool"),
                Duration::from_secs(1),
                &CancelToken::never(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let text: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&text, "");
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 49"));
        assert_eq!(stderr_tail("  ", "only stdout"), "only stdout");
    }

    #[test]
    fn test_require_output() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("out.apk");
        assert!(require_output(&file).is_err());
        std::fs::write(&file, b"").unwrap();
        assert!(require_output(&file).is_err());
        std::fs::write(&file, b"PK").unwrap();
        assert!(require_output(&file).is_ok());

        let dir = temp.path().join("classes");
        std::fs::create_dir(&dir).unwrap();
        assert!(require_output(&dir).is_err());
        std::fs::write(dir.join("A.class"), b"x").unwrap();
        assert!(require_output(&dir).is_ok());
    }

    #[test]
    fn test_display_omits_env() {
        let inv = ToolInvocation::new("jarsigner", "jarsigner")
            .arg("-storepass:env")
            .arg("STOREPASS")
            .env("STOREPASS", "hunter22");
        assert!(!inv.display().contains("hunter22"));
    }
}
