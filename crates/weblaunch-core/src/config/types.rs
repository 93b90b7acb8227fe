//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration for weblaunch, as written in `weblaunch.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host toolchain locations and target SDK levels
    pub toolchain: ToolchainConfig,

    /// Per-stage timeouts in seconds
    pub timeouts: TimeoutConfig,

    /// Working and artifact directories
    pub paths: PathsConfig,

    /// Runtime limits
    pub runtime: RuntimeConfig,
}

/// Host toolchain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Android SDK root (falls back to ANDROID_HOME / ANDROID_SDK_ROOT)
    pub sdk_root: Option<PathBuf>,

    /// Build-tools version directory to use (latest installed if unset)
    pub build_tools_version: Option<String>,

    /// Compile platform, e.g. "android-34"
    pub platform: String,

    /// JDK home (falls back to JAVA_HOME, then PATH)
    pub java_home: Option<PathBuf>,

    /// Path to bundletool.jar (falls back to `bundletool` on PATH)
    pub bundletool_jar: Option<PathBuf>,

    /// Minimum supported SDK level written into the manifest
    pub min_sdk: u32,

    /// Target SDK level written into the manifest
    pub target_sdk: u32,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            sdk_root: None,
            build_tools_version: None,
            platform: DEFAULT_PLATFORM.to_string(),
            java_home: None,
            bundletool_jar: None,
            min_sdk: DEFAULT_MIN_SDK,
            target_sdk: DEFAULT_TARGET_SDK,
        }
    }
}

/// Per-stage timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub resources: u64,
    pub compile: u64,
    pub dex: u64,
    pub package: u64,
    pub sign: u64,
    pub align: u64,
    pub bundle: u64,
    /// Keystore generation
    pub identity: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            resources: 120,
            compile: 300,
            dex: 180,
            package: 120,
            sign: 60,
            align: 30,
            bundle: 300,
            identity: 30,
        }
    }
}

/// Directory configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root under which one working directory per job is created
    pub work_root: Option<PathBuf>,

    /// Root under which one artifact directory per job is created
    pub artifact_root: Option<PathBuf>,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Host-wide cap on concurrently running external processes
    pub max_concurrent_processes: Option<usize>,

    /// Events buffered per build before slow subscribers start lagging
    pub progress_buffer: usize,

    /// Keep working directories after a job finishes (debugging aid)
    pub keep_work_dirs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_processes: None,
            progress_buffer: DEFAULT_PROGRESS_BUFFER,
            keep_work_dirs: false,
        }
    }
}

/// Default compile platform
pub const DEFAULT_PLATFORM: &str = "android-34";

/// Default minimum SDK level
pub const DEFAULT_MIN_SDK: u32 = 21;

/// Default target SDK level
pub const DEFAULT_TARGET_SDK: u32 = 34;

/// Default progress buffer per build
pub const DEFAULT_PROGRESS_BUFFER: usize = 64;

/// Stage timeouts resolved to durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub resources: Duration,
    pub compile: Duration,
    pub dex: Duration,
    pub package: Duration,
    pub sign: Duration,
    pub align: Duration,
    pub bundle: Duration,
    pub identity: Duration,
}

impl From<&TimeoutConfig> for StageTimeouts {
    fn from(t: &TimeoutConfig) -> Self {
        Self {
            resources: Duration::from_secs(t.resources),
            compile: Duration::from_secs(t.compile),
            dex: Duration::from_secs(t.dex),
            package: Duration::from_secs(t.package),
            sign: Duration::from_secs(t.sign),
            align: Duration::from_secs(t.align),
            bundle: Duration::from_secs(t.bundle),
            identity: Duration::from_secs(t.identity),
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

/// Fully resolved host configuration handed to the pipeline at construction.
///
/// Every environment lookup happens while building this value; stage logic
/// never consults the process environment.
#[derive(Debug, Clone)]
pub struct HostToolchainConfig {
    pub sdk_root: Option<PathBuf>,
    pub build_tools_version: Option<String>,
    pub platform: String,
    pub java_home: Option<PathBuf>,
    pub bundletool_jar: Option<PathBuf>,
    pub min_sdk: u32,
    pub target_sdk: u32,
    pub timeouts: StageTimeouts,
    pub work_root: PathBuf,
    pub artifact_root: PathBuf,
    pub max_concurrent_processes: usize,
    pub progress_buffer: usize,
    pub keep_work_dirs: bool,
}

impl HostToolchainConfig {
    /// Configuration rooted at `root` with defaults everywhere else and no
    /// environment lookups. Mostly useful for tests and embedding.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let toolchain = ToolchainConfig::default();
        Self {
            sdk_root: None,
            build_tools_version: None,
            platform: toolchain.platform,
            java_home: None,
            bundletool_jar: None,
            min_sdk: toolchain.min_sdk,
            target_sdk: toolchain.target_sdk,
            timeouts: StageTimeouts::default(),
            work_root: root.join("work"),
            artifact_root: root.join("artifacts"),
            max_concurrent_processes: default_process_slots(),
            progress_buffer: DEFAULT_PROGRESS_BUFFER,
            keep_work_dirs: false,
        }
    }

    /// Directory holding one job's artifacts
    pub fn artifact_dir(&self, job_id: &str) -> PathBuf {
        self.artifact_root.join(job_id)
    }

    /// Directory holding one job's working tree
    pub fn work_dir(&self, job_id: &str) -> PathBuf {
        self.work_root.join(job_id)
    }
}

/// Default number of concurrent external processes
pub fn default_process_slots() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Config {
    /// Resolve against the process environment
    pub fn resolve(&self) -> HostToolchainConfig {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve using the given environment lookup
    pub fn resolve_with<F>(&self, env: F) -> HostToolchainConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let sdk_root = self
            .toolchain
            .sdk_root
            .clone()
            .or_else(|| env("ANDROID_HOME").map(PathBuf::from))
            .or_else(|| env("ANDROID_SDK_ROOT").map(PathBuf::from));

        let java_home = self
            .toolchain
            .java_home
            .clone()
            .or_else(|| env("JAVA_HOME").map(PathBuf::from));

        let base = dirs::data_local_dir()
            .map(|d| d.join("weblaunch"))
            .unwrap_or_else(|| std::env::temp_dir().join("weblaunch"));

        HostToolchainConfig {
            sdk_root,
            build_tools_version: self.toolchain.build_tools_version.clone(),
            platform: self.toolchain.platform.clone(),
            java_home,
            bundletool_jar: self.toolchain.bundletool_jar.clone(),
            min_sdk: self.toolchain.min_sdk,
            target_sdk: self.toolchain.target_sdk,
            timeouts: StageTimeouts::from(&self.timeouts),
            work_root: self
                .paths
                .work_root
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("weblaunch").join("work")),
            artifact_root: self
                .paths
                .artifact_root
                .clone()
                .unwrap_or_else(|| base.join("artifacts")),
            max_concurrent_processes: self
                .runtime
                .max_concurrent_processes
                .unwrap_or_else(default_process_slots),
            progress_buffer: self.runtime.progress_buffer,
            keep_work_dirs: self.runtime.keep_work_dirs,
        }
    }
}
