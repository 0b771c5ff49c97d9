//! Explicit configuration values threaded into the store and the process runner.
//!
//! Nothing here reads ambient state lazily: the environment is consulted once,
//! through an injectable lookup, when a [`ComplianceConfig`] is built.

use crate::core::error::ComplianceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Selects the compliance root directory.
pub const ROOT_ENV: &str = "COMPLIANCE_ROOT";
/// Log filter directive for the tracing subscriber.
pub const LOG_ENV: &str = "COMPLIANCE_LOG";
/// Root used when `COMPLIANCE_ROOT` is unset, relative to the working directory.
pub const DEFAULT_ROOT_DIR: &str = "compliance";
/// Optional process defaults, relative to the compliance root.
pub const PROCESS_CONFIG_PATH: &str = "config/process.toml";

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Defaults for external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessConfig {
    /// Wall-clock limit applied when a call does not set its own.
    pub timeout_ms: u64,
    /// Per-stream output ceiling; exceeding it is treated as a timeout.
    pub max_output_bytes: usize,
    /// JSONL file receiving one event per executed command.
    pub audit_log: Option<PathBuf>,
    /// Environment entries layered under every call's own overlay.
    pub env: BTreeMap<String, String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            audit_log: None,
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComplianceConfig {
    /// Absolute or cwd-relative compliance root.
    pub root: PathBuf,
    pub process: ProcessConfig,
}

impl ComplianceConfig {
    /// Build from the real process environment and working directory.
    pub fn from_env() -> Result<Self, ComplianceError> {
        let cwd = std::env::current_dir()?;
        Ok(Self::from_lookup(|key| std::env::var(key).ok(), &cwd))
    }

    /// Build from an arbitrary key lookup; used by tests to avoid touching
    /// process-wide environment.
    pub fn from_lookup<F>(lookup: F, cwd: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::with_root(resolve_root(lookup, cwd))
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            process: ProcessConfig::default(),
        }
    }

    /// Overlay `<root>/config/process.toml` when it exists.
    pub fn load_process_config(mut self) -> Result<Self, ComplianceError> {
        self.process = load_process_config(&self.root)?;
        Ok(self)
    }
}

/// `COMPLIANCE_ROOT` when set and non-empty, else `<cwd>/compliance`.
pub fn resolve_root<F>(lookup: F, cwd: &Path) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(ROOT_ENV) {
        Some(value) if !value.trim().is_empty() => {
            let path = PathBuf::from(value.trim());
            if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            }
        }
        _ => cwd.join(DEFAULT_ROOT_DIR),
    }
}

/// Load process defaults; a missing file is not an error.
pub fn load_process_config(root: &Path) -> Result<ProcessConfig, ComplianceError> {
    let config_path = root.join(PROCESS_CONFIG_PATH);
    if !config_path.exists() {
        return Ok(ProcessConfig::default());
    }
    let content = fs::read_to_string(&config_path)?;
    let mut config: ProcessConfig = toml::from_str(&content).map_err(|e| {
        ComplianceError::ConfigError(format!("{}: {}", config_path.display(), e))
    })?;
    if config.timeout_ms == 0 {
        return Err(ComplianceError::ConfigError(format!(
            "{}: timeout_ms must be greater than zero",
            config_path.display()
        )));
    }
    if config.max_output_bytes == 0 {
        return Err(ComplianceError::ConfigError(format!(
            "{}: max_output_bytes must be greater than zero",
            config_path.display()
        )));
    }
    if let Some(log) = config.audit_log.take() {
        config.audit_log = Some(if log.is_absolute() { log } else { root.join(log) });
    }
    Ok(config)
}
