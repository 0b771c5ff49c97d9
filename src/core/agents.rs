//! AI agent registry governance.
//!
//! Registry entries are `agents/` documents whose header sets
//! `type: agent-registry`. Their body carries sections (`## Data Access`,
//! `## Tool Access`, a `Credentials` table, ...) that the audit checks for by
//! name.

use crate::core::error::ComplianceError;
use crate::core::findings::{Finding, FindingStatus};
use crate::core::frontmatter::DocumentMetadata;
use crate::core::store::{DocumentStore, DocumentType};
use crate::core::time;
use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::warn;

pub const REGISTRY_TYPE: &str = "agent-registry";
pub const DEFAULT_ROTATION_THRESHOLD_DAYS: i64 = 90;

static CREDENTIALS_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+\s*Credentials").expect("credentials heading regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentEntry {
    pub id: String,
    pub name: String,
    pub status: String,
    pub purpose: String,
    pub owner: String,
    pub risk_tier: u8,
    pub context_classification: String,
    pub control_tier: String,
    pub last_reviewed: String,
    pub next_review: String,
    pub blue_team_status: String,
    pub tsc_controls: Vec<String>,
    /// Root-relative document path.
    pub path: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl AgentEntry {
    fn from_metadata(m: &DocumentMetadata, relative_path: &str) -> Self {
        let text = |key: &str, default: &str| {
            non_empty(m.extra_str(key)).unwrap_or_else(|| default.to_string())
        };
        let risk_tier = m
            .extra
            .get("risk_tier")
            .and_then(Value::as_u64)
            .and_then(|n| u8::try_from(n).ok())
            .unwrap_or(0);
        let tsc_controls = m
            .extra
            .get("tsc_controls")
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        Self {
            id: non_empty(m.id.clone()).unwrap_or_else(|| "unknown".to_string()),
            name: text("name", relative_path),
            status: non_empty(m.status.clone()).unwrap_or_else(|| "unknown".to_string()),
            purpose: text("purpose", ""),
            owner: m.owner.clone().unwrap_or_default(),
            risk_tier,
            context_classification: text("context_classification", "unknown"),
            control_tier: text("control_tier", "tier-1"),
            last_reviewed: non_empty(m.last_reviewed.clone()).unwrap_or_else(|| "never".to_string()),
            next_review: non_empty(m.next_review.clone()).unwrap_or_else(|| "unknown".to_string()),
            blue_team_status: text("blue_team_status", "n/a"),
            tsc_controls,
            path: relative_path.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn is_untrusted(&self) -> bool {
        self.context_classification == "untrusted"
    }

    /// ISO dates compare as strings; `unknown` never counts as due.
    pub fn review_due(&self, today: &str) -> bool {
        self.next_review.as_str() <= today
    }

    pub fn blue_team_done(&self) -> bool {
        !self.blue_team_status.is_empty() && self.blue_team_status != "n/a"
    }
}

/// Filters for [`load_agents`]; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter<'a> {
    pub status: Option<&'a str>,
    pub context_classification: Option<&'a str>,
    pub risk_tier: Option<u8>,
}

pub async fn load_agents(
    store: &DocumentStore,
    filter: &AgentFilter<'_>,
) -> Result<Vec<AgentEntry>, ComplianceError> {
    let docs = store
        .list_documents(DocumentType::Agents, filter.status)
        .await?;
    Ok(docs
        .iter()
        .filter(|d| d.metadata.extra_str("type").as_deref() == Some(REGISTRY_TYPE))
        .map(|d| AgentEntry::from_metadata(&d.metadata, &d.relative_path))
        .filter(|a| {
            filter
                .context_classification
                .is_none_or(|c| a.context_classification == c)
        })
        .filter(|a| filter.risk_tier.is_none_or(|t| a.risk_tier == t))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDetail {
    pub path: PathBuf,
    pub metadata: DocumentMetadata,
    pub content: String,
}

/// Any `agents/` document with a matching `id`, registry-typed or not.
pub async fn get_agent(store: &DocumentStore, id: &str) -> Result<AgentDetail, ComplianceError> {
    let docs = store.list_documents(DocumentType::Agents, None).await?;
    let Some(found) = docs.iter().find(|d| d.metadata.id.as_deref() == Some(id)) else {
        let registered: Vec<&str> = docs
            .iter()
            .filter(|d| d.metadata.extra_str("type").as_deref() == Some(REGISTRY_TYPE))
            .filter_map(|d| d.metadata.id.as_deref())
            .collect();
        let registered = if registered.is_empty() {
            "none".to_string()
        } else {
            registered.join(", ")
        };
        return Err(ComplianceError::NotFound(format!(
            "Agent '{}' not found. Registered agents: {}",
            id, registered
        )));
    };
    let doc = store.read_document(&found.path).await?;
    Ok(AgentDetail {
        path: found.path.clone(),
        metadata: doc.metadata,
        content: doc.content,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRef {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_review: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCoverage {
    pub total_agents: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_context: BTreeMap<String, usize>,
    pub by_risk_tier: BTreeMap<u8, usize>,
    pub reviews_overdue: Vec<AgentRef>,
    pub blue_team_needed: Vec<AgentRef>,
    pub governance_controls_defined: bool,
    pub governance_policy_exists: bool,
}

fn count_matching(agents: &[AgentEntry], keys: &[&str], field: impl Fn(&AgentEntry) -> &str) -> BTreeMap<String, usize> {
    keys.iter()
        .map(|k| (k.to_string(), agents.iter().filter(|a| field(a) == *k).count()))
        .collect()
}

pub async fn agent_coverage(store: &DocumentStore) -> Result<AgentCoverage, ComplianceError> {
    let agents = load_agents(store, &AgentFilter::default()).await?;
    let today = time::today();

    let mut by_risk_tier = BTreeMap::new();
    for a in &agents {
        *by_risk_tier.entry(a.risk_tier).or_insert(0) += 1;
    }

    let reviews_overdue = agents
        .iter()
        .filter(|a| a.is_active() && a.review_due(&today))
        .map(|a| AgentRef {
            id: a.id.clone(),
            name: a.name.clone(),
            next_review: Some(a.next_review.clone()),
        })
        .collect();
    let blue_team_needed = agents
        .iter()
        .filter(|a| a.is_active() && a.is_untrusted() && !a.blue_team_done())
        .map(|a| AgentRef {
            id: a.id.clone(),
            name: a.name.clone(),
            next_review: None,
        })
        .collect();

    let controls = store.list_documents(DocumentType::Controls, None).await?;
    let governance_controls_defined = controls.iter().any(|c| {
        c.metadata.id.as_deref() == Some("TSC-AGT") || c.relative_path.contains("agent-controls")
    });
    let policies = store.list_documents(DocumentType::Policies, None).await?;
    let governance_policy_exists = policies.iter().any(|p| {
        p.metadata.id.as_deref().is_some_and(|id| id.contains("POL-013"))
            || p.relative_path.contains("agent-governance")
    });

    Ok(AgentCoverage {
        total_agents: agents.len(),
        by_status: count_matching(&agents, &["active", "inactive", "decommissioned"], |a| a.status.as_str()),
        by_context: count_matching(&agents, &["trusted", "untrusted"], |a| a.context_classification.as_str()),
        by_risk_tier,
        reviews_overdue,
        blue_team_needed,
        governance_controls_defined,
        governance_policy_exists,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentFinding {
    pub agent_id: String,
    #[serde(flatten)]
    pub finding: Finding,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub agents_audited: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub checks_warning: usize,
    pub total_checks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentAudit {
    pub summary: AuditSummary,
    pub findings: Vec<AgentFinding>,
}

fn has_section(content: &str, name: &str) -> bool {
    content.contains(&format!("## {}", name)) || content.contains(&format!("#### {}", name))
}

fn check(pass: bool, fail_status: FindingStatus, pass_msg: String, fail_msg: String) -> (FindingStatus, String) {
    if pass {
        (FindingStatus::Pass, pass_msg)
    } else {
        (fail_status, fail_msg)
    }
}

/// Governance checks for one active agent against its registry body.
pub fn audit_agent(agent: &AgentEntry, content: &str, today: &str) -> Vec<Finding> {
    let section = |control: &str, name: &str, documented: &str| {
        let (status, description) = check(
            has_section(content, name),
            FindingStatus::Fail,
            format!("{} documented", documented),
            format!("Missing {} section", name),
        );
        Finding::new(control, status, description)
    };

    let mut findings = vec![
        Finding::new("AGT-01", FindingStatus::Pass, "Agent registered in inventory"),
        section("AGT-02", "Data Access", "Data access scope"),
        section("AGT-03", "Tool Access", "Tool/MCP access scope"),
        section("AGT-04", "Boundary Constraints", "Boundary constraints"),
    ];

    let logged = ["logged", "audit trail", "log"].iter().any(|k| content.contains(k));
    let (status, description) = check(
        logged,
        FindingStatus::Warning,
        "Logging referenced in registry".to_string(),
        "No explicit logging documentation found".to_string(),
    );
    findings.push(Finding::new("AGT-07", status, description));

    findings.push(section("AGT-08", "Context Sources", "Context sources"));

    let classified = agent.context_classification != "unknown";
    findings.push(Finding::new(
        "AGT-09",
        if classified { FindingStatus::Pass } else { FindingStatus::Fail },
        format!("Context classified as: {}", agent.context_classification),
    ));

    let (status, description) = check(
        !agent.review_due(today),
        FindingStatus::Warning,
        format!("Next review: {}", agent.next_review),
        format!("Review overdue (was due {})", agent.next_review),
    );
    findings.push(Finding::new("AGT-10", status, description));

    if agent.is_untrusted() {
        let (status, description) = check(
            content.contains("input validation") || content.contains("Input validation"),
            FindingStatus::Fail,
            "Input validation documented".to_string(),
            "UNTRUSTED: Missing input validation documentation".to_string(),
        );
        findings.push(Finding::new("AGT-11", status, description));

        let (status, description) = check(
            content.contains("prompt injection") || content.contains("system prompt"),
            FindingStatus::Fail,
            "Prompt injection defenses documented".to_string(),
            "UNTRUSTED: Missing prompt injection defense documentation".to_string(),
        );
        findings.push(Finding::new("AGT-13", status, description));

        let (status, description) = check(
            agent.blue_team_done(),
            FindingStatus::Fail,
            format!("Blue team testing: {}", agent.blue_team_status),
            "UNTRUSTED: Blue team testing not completed".to_string(),
        );
        findings.push(Finding::new("AGT-17", status, description));
    }

    findings
}

pub async fn run_agent_audit(store: &DocumentStore) -> Result<AgentAudit, ComplianceError> {
    let agents = load_agents(store, &AgentFilter::default()).await?;
    let today = time::today();
    let mut findings = Vec::new();
    let mut audited = 0;

    for agent in agents.iter().filter(|a| a.is_active()) {
        let doc = store.read_document(&store.root.join(&agent.path)).await?;
        audited += 1;
        findings.extend(
            audit_agent(agent, &doc.content, &today)
                .into_iter()
                .map(|finding| AgentFinding {
                    agent_id: agent.id.clone(),
                    finding,
                }),
        );
    }

    let count = |s: FindingStatus| findings.iter().filter(|f| f.finding.status == s).count();
    let summary = AuditSummary {
        agents_audited: audited,
        checks_passed: count(FindingStatus::Pass),
        checks_failed: count(FindingStatus::Fail),
        checks_warning: count(FindingStatus::Warning),
        total_checks: findings.len(),
    };
    Ok(AgentAudit { summary, findings })
}

/// `(credential id, last rotated)` for every row of the first `Credentials`
/// table. Header and separator rows, short rows, and `N/A` dates are skipped.
pub fn credential_rows(content: &str) -> Vec<(String, String)> {
    let mut lines = content.lines();
    if !lines.by_ref().any(|l| CREDENTIALS_HEADING.is_match(l)) {
        return Vec::new();
    }
    lines
        .take_while(|l| !l.starts_with('#') && !l.starts_with("---"))
        .filter(|l| l.starts_with('|') && !l.contains("---") && !l.contains("Credential ID"))
        .filter_map(|row| {
            let cells: Vec<&str> = row
                .split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect();
            if cells.len() < 6 {
                return None;
            }
            let last_rotated = cells[3];
            if last_rotated == "N/A" {
                return None;
            }
            Some((cells[0].replace('`', ""), last_rotated.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub agent_id: String,
    pub agent_name: String,
    pub credential_id: String,
    pub last_rotated: String,
    pub age_days: i64,
    pub threshold: i64,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub total_credentials: usize,
    pub overdue_count: usize,
    pub threshold_days: i64,
    pub credentials: Vec<CredentialStatus>,
}

pub async fn check_credential_rotation(
    store: &DocumentStore,
    threshold_days: i64,
) -> Result<RotationReport, ComplianceError> {
    let filter = AgentFilter {
        status: Some("active"),
        ..Default::default()
    };
    let agents = load_agents(store, &filter).await?;
    let mut credentials = Vec::new();

    for agent in &agents {
        let doc = store.read_document(&store.root.join(&agent.path)).await?;
        for (credential_id, last_rotated) in credential_rows(&doc.content) {
            let Some(rotated) = time::parse_date(&last_rotated) else {
                warn!(agent = %agent.id, credential = %credential_id, value = %last_rotated, "unparsable rotation date");
                continue;
            };
            let age_days = time::days_since(rotated);
            credentials.push(CredentialStatus {
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
                credential_id,
                last_rotated,
                age_days,
                threshold: threshold_days,
                overdue: age_days > threshold_days,
            });
        }
    }

    Ok(RotationReport {
        total_credentials: credentials.len(),
        overdue_count: credentials.iter().filter(|c| c.overdue).count(),
        threshold_days,
        credentials,
    })
}
