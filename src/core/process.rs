//! Process invocation layer for external infrastructure CLIs.
//!
//! Every provider tool has its own way of failing. This layer folds them into
//! one closed taxonomy ([`CliErrorKind`]) so callers render a consistent error
//! without provider knowledge:
//!
//! 1. search `PATH` for the executable; missing means `not_installed`, decided
//!    before anything is spawned;
//! 2. spawn with a discrete argument vector (never a shell), an environment
//!    overlay, and an optional working directory;
//! 3. enforce a wall-clock timeout and a per-stream output ceiling, both of
//!    which hard-kill the child and report `timeout`;
//! 4. nonzero exit or runtime failure reports `exec_error` with stderr and the
//!    exit code;
//! 5. stdout is JSON-decoded best effort; failure to decode yields `null`.
//!
//! `not_authenticated` is never inferred here. Callers that recognize a
//! credential failure in stderr build it with [`CliFailure::not_authenticated`].

use crate::core::config::ProcessConfig;
use crate::core::redact;
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CliErrorKind {
    NotInstalled,
    NotAuthenticated,
    Timeout,
    ExecError,
}

impl CliErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CliErrorKind::NotInstalled => "not_installed",
            CliErrorKind::NotAuthenticated => "not_authenticated",
            CliErrorKind::Timeout => "timeout",
            CliErrorKind::ExecError => "exec_error",
        }
    }
}

impl fmt::Display for CliErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completed invocation with exit status zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CliSuccess {
    pub stdout: String,
    pub stderr: String,
    /// Decoded stdout, or `null` when decoding is off, stdout is blank, or
    /// stdout is not JSON.
    pub parsed: JsonValue,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{error}: {message}")]
pub struct CliFailure {
    pub error: CliErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl CliFailure {
    pub fn not_installed(command: &str) -> Self {
        Self {
            error: CliErrorKind::NotInstalled,
            message: format!(
                "{} CLI not found on PATH. Install it and authenticate before using infrastructure tools.",
                command
            ),
            stderr: None,
            exit_code: None,
        }
    }

    /// For callers that recognize a credential failure in tool output.
    pub fn not_authenticated(command: &str, detail: &str) -> Self {
        Self {
            error: CliErrorKind::NotAuthenticated,
            message: format!("{} is not authenticated: {}", command, detail.trim()),
            stderr: None,
            exit_code: None,
        }
    }

    pub fn timeout(command: &str, timeout: Duration, stderr: Option<String>) -> Self {
        Self {
            error: CliErrorKind::Timeout,
            message: format!("{} command timed out after {}ms.", command, timeout.as_millis()),
            stderr,
            exit_code: None,
        }
    }

    pub fn output_overflow(command: &str, limit: usize) -> Self {
        Self {
            error: CliErrorKind::Timeout,
            message: format!("{} command output exceeded {} bytes.", command, limit),
            stderr: None,
            exit_code: None,
        }
    }

    pub fn exec_error(command: &str, detail: &str, stderr: Option<String>, exit_code: Option<i32>) -> Self {
        Self {
            error: CliErrorKind::ExecError,
            message: format!("{} command failed: {}", command, detail.trim()),
            stderr,
            exit_code,
        }
    }

    pub fn kind(&self) -> CliErrorKind {
        self.error
    }
}

pub type CliOutcome = Result<CliSuccess, CliFailure>;

/// `{ok: true, stdout, stderr, parsed, duration_ms}` or
/// `{ok: false, error, message, stderr?, exit_code?}`.
pub fn outcome_json(outcome: &CliOutcome) -> JsonValue {
    let (ok, body) = match outcome {
        Ok(success) => (true, serde_json::to_value(success)),
        Err(failure) => (false, serde_json::to_value(failure)),
    };
    let mut body = body.unwrap_or(JsonValue::Null);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("ok".to_string(), JsonValue::Bool(ok));
    }
    body
}

/// Per-call options. Unset `timeout` falls back to the runner's configured
/// default.
#[derive(Debug, Clone)]
pub struct CliOptions {
    pub timeout: Option<Duration>,
    pub parse_json: bool,
    /// Layered over the inherited environment and the runner's defaults.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            parse_json: true,
            env: BTreeMap::new(),
            cwd: None,
        }
    }
}

impl CliOptions {
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Some(Duration::from_millis(ms));
        self
    }

    pub fn text_output(mut self) -> Self {
        self.parse_json = false;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InvocationEvent {
    pub ts: String,
    pub event_id: String,
    pub command: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub status: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

#[derive(Debug)]
enum RunError {
    Io(std::io::Error),
    Overflow,
}

async fn read_capped<R>(reader: Option<R>, limit: usize) -> Result<Vec<u8>, RunError>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await
        .map_err(RunError::Io)?;
    if buf.len() > limit {
        return Err(RunError::Overflow);
    }
    Ok(buf)
}

async fn is_executable(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                meta.permissions().mode() & 0o111 != 0
            }
            #[cfg(not(unix))]
            {
                true
            }
        }
        _ => false,
    }
}

/// Find `command` the way a shell would, without running anything. Commands
/// containing a path separator are checked directly (relative to `cwd` when
/// given); bare names are searched in `path_var`.
pub async fn locate_executable(
    command: &str,
    path_var: Option<&OsString>,
    cwd: Option<&Path>,
) -> Option<PathBuf> {
    if command.trim().is_empty() {
        return None;
    }
    let candidate = Path::new(command);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        let full = match cwd {
            Some(dir) if !candidate.is_absolute() => dir.join(candidate),
            _ => candidate.to_path_buf(),
        };
        return is_executable(&full).await.then_some(full);
    }

    for dir in std::env::split_paths(path_var?) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let full = dir.join(command);
        if is_executable(&full).await {
            return Some(full);
        }
        #[cfg(windows)]
        for ext in ["exe", "cmd", "bat"] {
            let with_ext = full.with_extension(ext);
            if is_executable(&with_ext).await {
                return Some(with_ext);
            }
        }
    }
    None
}

/// Executes external commands under a [`ProcessConfig`].
#[derive(Debug, Clone, Default)]
pub struct CliRunner {
    pub config: ProcessConfig,
}

impl CliRunner {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    /// `PATH` as the child would see it: call overlay, then runner defaults,
    /// then the inherited environment.
    fn effective_path(&self, options: &CliOptions) -> Option<OsString> {
        options
            .env
            .get("PATH")
            .or_else(|| self.config.env.get("PATH"))
            .map(OsString::from)
            .or_else(|| std::env::var_os("PATH"))
    }

    /// Availability check only; nothing is executed.
    pub async fn is_available(&self, command: &str, options: &CliOptions) -> bool {
        let path_var = self.effective_path(options);
        locate_executable(command, path_var.as_ref(), options.cwd.as_deref())
            .await
            .is_some()
    }

    pub async fn exec(&self, command: &str, args: &[&str], options: &CliOptions) -> CliOutcome {
        let path_var = self.effective_path(options);
        let Some(program) =
            locate_executable(command, path_var.as_ref(), options.cwd.as_deref()).await
        else {
            debug!(command, "executable not found on PATH");
            return Err(CliFailure::not_installed(command));
        };

        let timeout = options
            .timeout
            .unwrap_or_else(|| Duration::from_millis(self.config.timeout_ms));
        let started = Instant::now();
        let outcome = self.run(command, &program, args, options, timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.audit(command, args, options, &outcome, duration_ms).await;
        outcome.map(|mut success| {
            success.duration_ms = duration_ms;
            success
        })
    }

    async fn run(
        &self,
        command: &str,
        program: &Path,
        args: &[&str],
        options: &CliOptions,
        timeout: Duration,
    ) -> CliOutcome {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.config.env)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return Err(CliFailure::exec_error(command, &e.to_string(), None, None)),
        };
        let limit = self.config.max_output_bytes;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let collected = tokio::time::timeout(timeout, async {
            tokio::try_join!(
                read_capped(stdout, limit),
                read_capped(stderr, limit),
                async { child.wait().await.map_err(RunError::Io) },
            )
        })
        .await;

        let (out, err, status) = match collected {
            Ok(Ok(parts)) => parts,
            Ok(Err(run_error)) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(match run_error {
                    RunError::Overflow => CliFailure::output_overflow(command, limit),
                    RunError::Io(e) => CliFailure::exec_error(command, &e.to_string(), None, None),
                });
            }
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                warn!(command, timeout_ms = timeout.as_millis() as u64, "command timed out");
                return Err(CliFailure::timeout(command, timeout, None));
            }
        };

        let stdout = String::from_utf8_lossy(&out).into_owned();
        let stderr = String::from_utf8_lossy(&err).into_owned();

        if !status.success() {
            let detail = if stderr.trim().is_empty() {
                format!("exited with {}", status)
            } else {
                stderr.clone()
            };
            return Err(CliFailure::exec_error(command, &detail, Some(stderr), status.code()));
        }

        let parsed = if options.parse_json && !stdout.trim().is_empty() {
            serde_json::from_str(&stdout).unwrap_or(JsonValue::Null)
        } else {
            JsonValue::Null
        };

        Ok(CliSuccess {
            stdout,
            stderr,
            parsed,
            duration_ms: 0,
        })
    }

    async fn audit(
        &self,
        command: &str,
        args: &[&str],
        options: &CliOptions,
        outcome: &CliOutcome,
        duration_ms: u64,
    ) {
        let Some(log_path) = &self.config.audit_log else {
            return;
        };
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let (status, exit_code) = match outcome {
            Ok(_) => ("success".to_string(), Some(0)),
            Err(failure) => (failure.error.as_str().to_string(), failure.exit_code),
        };
        let event = InvocationEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            command: command.to_string(),
            args: redact::redact_args(&args),
            cwd: options.cwd.as_ref().map(|p| p.to_string_lossy().to_string()),
            status,
            exit_code,
            duration_ms,
        };
        if let Err(e) = append_event(log_path, &event).await {
            warn!(path = %log_path.display(), error = %e, "failed to append invocation event");
        }
    }
}

async fn append_event(path: &Path, event: &InvocationEvent) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_string(event)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

/// Run `command` with default process settings.
pub async fn exec_cli(command: &str, args: &[&str], options: &CliOptions) -> CliOutcome {
    CliRunner::default().exec(command, args, options).await
}
