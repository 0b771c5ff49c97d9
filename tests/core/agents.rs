use chrono::{Duration, Utc};
use soc2_ledger::core::agents::{self, AgentFilter};
use soc2_ledger::core::error::ComplianceError;
use soc2_ledger::core::findings::FindingStatus;
use soc2_ledger::core::store::DocumentStore;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn days_ago(days: i64) -> String {
    (Utc::now().date_naive() - Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

fn support_bot() -> String {
    format!(
        "---
id: AGENT-001
type: agent-registry
name: Support Bot
status: active
owner: support@acme.test
risk_tier: 3
context_classification: untrusted
next_review: 2020-01-01
blue_team_status: n/a
tsc_controls:
  - CC6.1
  - CC7.2
---

## Purpose

Answers customer tickets.

## Data Access

Ticket history only.

## Tool Access

Zendesk MCP, read-only.

## Boundary Constraints

Every reply is logged to the audit trail.

## Context Sources

Inbound customer email. Input validation strips attachments.

## Credentials

| Credential ID | Type | Scope | Last Rotated | Rotation Target | Owner |
|---|---|---|---|---|---|
| `zendesk-token` | API token | tickets:read | {fresh} | 90d | support |
| `mail-oauth` | OAuth | inbox | {stale} | 90d | support |
| `sso` | OIDC | login | N/A | n/a | it |
| `legacy` | key | all | sometime | 90d | it |
",
        fresh = days_ago(10),
        stale = days_ago(200),
    )
}

const CODE_REVIEWER: &str = "---
id: AGENT-002
type: agent-registry
name: Code Reviewer
status: active
risk_tier: 2
context_classification: trusted
next_review: 2099-01-01
---

## Data Access
Repository contents.
";

const RETIRED: &str = "---
id: AGENT-003
type: agent-registry
name: Old Summarizer
status: decommissioned
risk_tier: 1
context_classification: trusted
---

## Credentials

| Credential ID | Type | Scope | Last Rotated | Rotation Target | Owner |
|---|---|---|---|---|---|
| `old` | key | all | 2019-01-01 | 90d | it |
";

const TEMPLATE: &str = "---
id: AGENT-TEMPLATE
title: Registry template
---

Copy this file.
";

fn seed(root: &Path) {
    fs::create_dir_all(root.join("agents")).expect("mkdir");
    fs::write(root.join("agents/support-bot.md"), support_bot()).expect("write");
    fs::write(root.join("agents/code-reviewer.md"), CODE_REVIEWER).expect("write");
    fs::write(root.join("agents/old-summarizer.md"), RETIRED).expect("write");
    fs::write(root.join("agents/_template.md"), TEMPLATE).expect("write");
}

#[tokio::test]
async fn load_agents_reads_registry_entries_and_filters() {
    let tmp = tempdir().expect("tempdir");
    seed(tmp.path());
    let store = DocumentStore::new(tmp.path());

    let all = agents::load_agents(&store, &AgentFilter::default())
        .await
        .expect("load");
    let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["AGENT-002", "AGENT-003", "AGENT-001"]);

    let bot = &all[2];
    assert_eq!(bot.name, "Support Bot");
    assert_eq!(bot.risk_tier, 3);
    assert_eq!(bot.tsc_controls, vec!["CC6.1", "CC7.2"]);
    assert_eq!(bot.path, "agents/support-bot.md");
    assert_eq!(bot.last_reviewed, "never");

    let active = agents::load_agents(
        &store,
        &AgentFilter {
            status: Some("active"),
            ..Default::default()
        },
    )
    .await
    .expect("load");
    assert_eq!(active.len(), 2);

    let untrusted_tier3 = agents::load_agents(
        &store,
        &AgentFilter {
            context_classification: Some("untrusted"),
            risk_tier: Some(3),
            ..Default::default()
        },
    )
    .await
    .expect("load");
    assert_eq!(untrusted_tier3.len(), 1);
    assert_eq!(untrusted_tier3[0].id, "AGENT-001");

    let none = agents::load_agents(
        &store,
        &AgentFilter {
            risk_tier: Some(5),
            ..Default::default()
        },
    )
    .await
    .expect("load");
    assert!(none.is_empty());
}

#[tokio::test]
async fn get_agent_returns_document_or_lists_registered_ids() {
    let tmp = tempdir().expect("tempdir");
    seed(tmp.path());
    let store = DocumentStore::new(tmp.path());

    let detail = agents::get_agent(&store, "AGENT-002").await.expect("get");
    assert_eq!(detail.path, tmp.path().join("agents/code-reviewer.md"));
    assert_eq!(detail.content, "## Data Access\nRepository contents.");

    let template = agents::get_agent(&store, "AGENT-TEMPLATE").await.expect("get");
    assert_eq!(template.metadata.title.as_deref(), Some("Registry template"));

    let err = agents::get_agent(&store, "AGENT-404").await.expect_err("missing");
    match err {
        ComplianceError::NotFound(msg) => {
            assert_eq!(
                msg,
                "Agent 'AGENT-404' not found. Registered agents: AGENT-002, AGENT-003, AGENT-001"
            );
        }
        other => panic!("unexpected error: {other}"),
    }

    let empty = tempdir().expect("tempdir");
    let err = agents::get_agent(&DocumentStore::new(empty.path()), "AGENT-001")
        .await
        .expect_err("missing");
    assert!(err.to_string().contains("Registered agents: none"));
}

#[tokio::test]
async fn coverage_reports_overdue_reviews_and_blue_team_gaps() {
    let tmp = tempdir().expect("tempdir");
    seed(tmp.path());
    fs::create_dir_all(tmp.path().join("policies")).expect("mkdir");
    fs::write(
        tmp.path().join("policies/agent-governance.md"),
        "---\nid: POL-013\ntitle: AI Agent Governance\n---\n",
    )
    .expect("write");
    let store = DocumentStore::new(tmp.path());

    let coverage = agents::agent_coverage(&store).await.expect("coverage");
    assert_eq!(coverage.total_agents, 3);
    assert_eq!(coverage.by_status["active"], 2);
    assert_eq!(coverage.by_status["decommissioned"], 1);
    assert_eq!(coverage.by_status["inactive"], 0);
    assert_eq!(coverage.by_context["untrusted"], 1);
    assert_eq!(coverage.by_context["trusted"], 2);
    assert_eq!(coverage.by_risk_tier[&3u8], 1);

    let overdue: Vec<&str> = coverage.reviews_overdue.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(overdue, vec!["AGENT-001"]);
    assert_eq!(coverage.reviews_overdue[0].next_review.as_deref(), Some("2020-01-01"));
    assert_eq!(coverage.blue_team_needed.len(), 1);
    assert_eq!(coverage.blue_team_needed[0].name, "Support Bot");
    assert!(!coverage.governance_controls_defined);
    assert!(coverage.governance_policy_exists);

    let json = serde_json::to_value(&coverage).expect("json");
    assert_eq!(json["totalAgents"], 3);
    assert_eq!(json["byRiskTier"]["2"], 1);
    assert!(json["blueTeamNeeded"][0].get("next_review").is_none());
}

#[tokio::test]
async fn audit_covers_active_agents_only() {
    let tmp = tempdir().expect("tempdir");
    seed(tmp.path());
    let store = DocumentStore::new(tmp.path());

    let audit = agents::run_agent_audit(&store).await.expect("audit");
    assert_eq!(audit.summary.agents_audited, 2);
    assert!(audit.findings.iter().all(|f| f.agent_id != "AGENT-003"));

    let bot: Vec<_> = audit.findings.iter().filter(|f| f.agent_id == "AGENT-001").collect();
    assert_eq!(bot.len(), 11);
    let status_of = |id: &str| {
        bot.iter()
            .find(|f| f.finding.control_id == id)
            .map(|f| f.finding.status)
    };
    assert_eq!(status_of("AGT-02"), Some(FindingStatus::Pass));
    assert_eq!(status_of("AGT-07"), Some(FindingStatus::Pass));
    assert_eq!(status_of("AGT-10"), Some(FindingStatus::Warning));
    assert_eq!(status_of("AGT-11"), Some(FindingStatus::Pass));
    assert_eq!(status_of("AGT-13"), Some(FindingStatus::Fail));
    assert_eq!(status_of("AGT-17"), Some(FindingStatus::Fail));

    let reviewer = audit.findings.iter().filter(|f| f.agent_id == "AGENT-002").count();
    assert_eq!(reviewer, 8);

    let summary = audit.summary;
    assert_eq!(summary.total_checks, 19);
    assert_eq!(
        summary.checks_passed + summary.checks_failed + summary.checks_warning,
        summary.total_checks
    );
}

#[tokio::test]
async fn rotation_flags_credentials_older_than_threshold() {
    let tmp = tempdir().expect("tempdir");
    seed(tmp.path());
    let store = DocumentStore::new(tmp.path());

    let report = agents::check_credential_rotation(&store, agents::DEFAULT_ROTATION_THRESHOLD_DAYS)
        .await
        .expect("rotation");
    assert_eq!(report.threshold_days, 90);
    assert_eq!(report.total_credentials, 2);
    assert_eq!(report.overdue_count, 1);

    let fresh = &report.credentials[0];
    assert_eq!(fresh.credential_id, "zendesk-token");
    assert_eq!(fresh.agent_name, "Support Bot");
    assert_eq!(fresh.age_days, 10);
    assert!(!fresh.overdue);

    let stale = &report.credentials[1];
    assert_eq!(stale.credential_id, "mail-oauth");
    assert_eq!(stale.age_days, 200);
    assert!(stale.overdue);

    let strict = agents::check_credential_rotation(&store, 5).await.expect("rotation");
    assert_eq!(strict.overdue_count, 2);
}
