//! Uniform result shape for live infrastructure signals.
//!
//! Provider checks run a CLI through [`crate::core::process`], turn whatever
//! came back into [`Finding`]s keyed by control ID, and wrap them in an
//! [`InfraToolResult`]. Failures become an [`InfraErrorReport`] instead.

use crate::core::process::{CliErrorKind, CliFailure, CliOptions, CliRunner};
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Pass,
    Fail,
    Warning,
    Info,
}

impl FindingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingStatus::Pass => "pass",
            FindingStatus::Fail => "fail",
            FindingStatus::Warning => "warning",
            FindingStatus::Info => "info",
        }
    }
}

impl fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub control_id: String,
    pub status: FindingStatus,
    pub description: String,
}

impl Finding {
    pub fn new(control_id: impl Into<String>, status: FindingStatus, description: impl Into<String>) -> Self {
        Self {
            control_id: control_id.into(),
            status,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraToolResult {
    pub source: String,
    pub tool: String,
    pub tsc_controls: Vec<String>,
    pub collected_at: String,
    pub data: JsonValue,
    pub findings: Vec<Finding>,
}

/// Stamp `collected_at` with today's date. Inputs are taken as given.
pub fn build_result(
    source: &str,
    tool: &str,
    tsc_controls: &[&str],
    data: JsonValue,
    findings: Vec<Finding>,
) -> InfraToolResult {
    InfraToolResult {
        source: source.to_string(),
        tool: tool.to_string(),
        tsc_controls: tsc_controls.iter().map(|c| c.to_string()).collect(),
        collected_at: time::today(),
        data,
        findings,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FindingSummary {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub warning: usize,
    pub info: usize,
}

impl FindingSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        findings.iter().fold(
            FindingSummary {
                total: findings.len(),
                ..Default::default()
            },
            |mut acc, f| {
                match f.status {
                    FindingStatus::Pass => acc.pass += 1,
                    FindingStatus::Fail => acc.fail += 1,
                    FindingStatus::Warning => acc.warning += 1,
                    FindingStatus::Info => acc.info += 1,
                }
                acc
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfraErrorReport {
    pub source: String,
    pub tool: String,
    pub error: CliErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

pub fn infra_error(source: &str, tool: &str, failure: &CliFailure) -> InfraErrorReport {
    let help = match failure.error {
        CliErrorKind::NotInstalled => Some(format!(
            "Install the {} CLI and authenticate before using this tool.",
            source
        )),
        CliErrorKind::NotAuthenticated => Some(
            "Run the appropriate auth command (e.g., 'gh auth login', 'aws configure', 'gcloud auth login')."
                .to_string(),
        ),
        CliErrorKind::Timeout | CliErrorKind::ExecError => None,
    };
    InfraErrorReport {
        source: source.to_string(),
        tool: tool.to_string(),
        error: failure.error,
        message: failure.message.clone(),
        help,
    }
}

/// Provider source name and the executable its checks invoke.
pub const PROVIDER_CLIS: &[(&str, &str)] = &[
    ("aws", "aws"),
    ("gcloud", "gcloud"),
    ("github", "gh"),
    ("terraform", "terraform"),
    ("workspace", "gam"),
    ("nuclei", "nuclei"),
    ("cloudflare", "curl"),
];

/// Search `PATH` for every provider CLI without running any of them.
pub async fn cli_inventory(runner: &CliRunner) -> InfraToolResult {
    let options = CliOptions::default();
    let mut rows = Vec::with_capacity(PROVIDER_CLIS.len());
    let mut findings = Vec::with_capacity(PROVIDER_CLIS.len());

    for (source, command) in PROVIDER_CLIS {
        let available = runner.is_available(command, &options).await;
        rows.push(json!({ "source": source, "command": command, "available": available }));
        let description = if available {
            format!("{} CLI ({}) found on PATH", source, command)
        } else {
            CliFailure::not_installed(command).message
        };
        findings.push(Finding::new(*source, FindingStatus::Info, description));
    }

    build_result("local", "cli_inventory", &[], JsonValue::Array(rows), findings)
}
