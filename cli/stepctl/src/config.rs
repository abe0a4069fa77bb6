//! Configuration.
//!
//! Handles:
//! - JSON-RPC endpoint and default coordinator/sender
//! - Artifacts directory
//! - Executor tuning (padding, backoff, grace, receipt polling)
//!
//! Stored as JSON in the platform config directory. Command-line flags (and
//! their `STEP_*` environment variables) override stored values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use stepchain_abi::Address;
use stepchain_reconcile::{
    BackoffPolicy, ExecutorConfig, DEFAULT_BACKOFF_CAP, DEFAULT_BACKOFF_FLOOR, DEFAULT_GAS_PADDING,
    DEFAULT_GRACE, DEFAULT_JITTER_MAX,
};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("dev", "stepchain", "step")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// JSON-RPC endpoint URL.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Default coordinator address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<String>,

    /// Default sender; the node's first account when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Directory searched for compiled contract artifacts.
    #[serde(default = "default_artifacts")]
    pub artifacts: PathBuf,

    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub executor: ExecutorSettings,
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_artifacts() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            coordinator: None,
            from: None,
            artifacts: default_artifacts(),
            log_level: default_log_level(),
            executor: ExecutorSettings::default(),
        }
    }
}

/// Executor tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Gas added above each operation's declared limit.
    pub gas_padding: u64,
    pub backoff_floor_ms: u64,
    pub jitter_max_ms: u64,
    pub backoff_cap_ms: u64,
    /// Wait before re-checking a pointer that did not advance by one.
    pub grace_ms: u64,
    /// Interval between receipt polls.
    pub receipt_poll_ms: u64,
    /// Give up waiting for a receipt after this long.
    pub inclusion_timeout_secs: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            gas_padding: DEFAULT_GAS_PADDING,
            backoff_floor_ms: DEFAULT_BACKOFF_FLOOR.as_millis() as u64,
            jitter_max_ms: DEFAULT_JITTER_MAX.as_millis() as u64,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP.as_millis() as u64,
            grace_ms: DEFAULT_GRACE.as_millis() as u64,
            receipt_poll_ms: 1_000,
            inclusion_timeout_secs: 300,
        }
    }
}

impl ExecutorSettings {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            gas_padding: self.gas_padding,
            grace: Duration::from_millis(self.grace_ms),
            backoff: BackoffPolicy {
                floor: Duration::from_millis(self.backoff_floor_ms),
                jitter_max: Duration::from_millis(self.jitter_max_ms),
                cap: Duration::from_millis(self.backoff_cap_ms),
            },
            ..ExecutorConfig::default()
        }
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn inclusion_timeout(&self) -> Duration {
        Duration::from_secs(self.inclusion_timeout_secs)
    }
}

/// Keys accepted by `step config set`.
pub const CONFIG_KEYS: &[&str] = &[
    "rpc_url",
    "coordinator",
    "from",
    "artifacts",
    "log_level",
    "executor.gas_padding",
    "executor.backoff_floor_ms",
    "executor.jitter_max_ms",
    "executor.backoff_cap_ms",
    "executor.grace_ms",
    "executor.receipt_poll_ms",
    "executor.inclusion_timeout_secs",
];

impl Config {
    /// Load config from disk, or return default.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Save config to disk. Returns the path written.
    pub fn save(&self) -> Result<PathBuf> {
        let path = config_dir()?.join(CONFIG_FILE);
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {:?}", dir))?;
        }
        let contents = serde_json::to_string_pretty(self)?;

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;

            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to write config to {:?}", path))?;
            file.write_all(contents.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, contents)
                .with_context(|| format!("Failed to write config to {:?}", path))?;
        }

        Ok(())
    }

    /// Set one value by dotted key. Addresses are validated.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let number = || -> Result<u64> {
            value
                .parse::<u64>()
                .with_context(|| format!("{key} expects a non-negative integer, got {value:?}"))
        };
        let address = || -> Result<Option<String>> {
            if value.is_empty() {
                return Ok(None);
            }
            value
                .parse::<Address>()
                .with_context(|| format!("{key} expects a 0x address"))?;
            Ok(Some(value.to_string()))
        };

        match key {
            "rpc_url" => self.rpc_url = value.to_string(),
            "coordinator" => self.coordinator = address()?,
            "from" => self.from = address()?,
            "artifacts" => self.artifacts = PathBuf::from(value),
            "log_level" => self.log_level = value.to_string(),
            "executor.gas_padding" => self.executor.gas_padding = number()?,
            "executor.backoff_floor_ms" => self.executor.backoff_floor_ms = number()?,
            "executor.jitter_max_ms" => self.executor.jitter_max_ms = number()?,
            "executor.backoff_cap_ms" => self.executor.backoff_cap_ms = number()?,
            "executor.grace_ms" => self.executor.grace_ms = number()?,
            "executor.receipt_poll_ms" => self.executor.receipt_poll_ms = number()?,
            "executor.inclusion_timeout_secs" => {
                self.executor.inclusion_timeout_secs = number()?
            }
            _ => bail!(
                "Unknown config key {key:?}. Known keys: {}",
                CONFIG_KEYS.join(", ")
            ),
        }
        Ok(())
    }
}
