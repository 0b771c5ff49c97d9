//! Control catalog: extraction of structured control records from TSC mapping
//! documents, and the queries built on top (listing, lookup, coverage).
//!
//! Mapping documents look like:
//!
//! ```text
//! ## CC5 — Control Activities
//!
//! ### CC5.1 — Logical Access
//! - **What the auditor looks for**: MFA on every production account
//! - **Evidence types**: screenshot, log export
//! - **Solo-company note**: owner reviews access monthly
//! ```
//!
//! Controls are a derived view: every query re-reads the `controls/`
//! documents. Nothing is cached.

use crate::core::error::ComplianceError;
use crate::core::store::{DocumentStore, DocumentType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::warn;

static CRITERIA_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^##\s+([A-Z]{1,3}\d+)\s*[—–-]\s*(.+)$").expect("criteria heading pattern")
});

static CONTROL_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^###\s+([A-Z]{1,3}\d+(?:\.\d+){1,2})\s*[—–-]\s*(.+)$")
        .expect("control heading pattern")
});

static FIELD_PATTERNS: LazyLock<Vec<(Regex, ControlField)>> = LazyLock::new(|| {
    [
        (r"\*\*What the auditor looks for\*\*:\s*(.+)", ControlField::AuditorLooksFor),
        (r"\*\*Evidence types\*\*:\s*(.+)", ControlField::EvidenceTypes),
        (r"\*\*Solo-company note\*\*:\s*(.+)", ControlField::SoloCompanyNote),
        (r"\*\*Compensating control\*\*:\s*(.+)", ControlField::CompensatingControl),
        (r"\*\*MCP discovery targets\*\*:\s*(.+)", ControlField::McpTargets),
    ]
    .into_iter()
    .map(|(pattern, field)| (Regex::new(pattern).expect("control field pattern"), field))
    .collect()
});

/// One control requirement extracted from a mapping document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEntry {
    pub id: String,
    pub name: String,
    /// Parent criteria group, e.g. `CC5`. Empty when the control precedes
    /// any criteria heading.
    pub criteria: String,
    pub auditor_looks_for: String,
    pub evidence_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solo_company_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensating_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_targets: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlField {
    AuditorLooksFor,
    EvidenceTypes,
    SoloCompanyNote,
    CompensatingControl,
    McpTargets,
}

/// Partial record being accumulated. `id` is `None` for a block opened by a
/// heading whose ID could not be parsed; such a block swallows its fields and
/// is dropped when flushed.
#[derive(Debug, Default)]
struct PendingControl {
    id: Option<String>,
    name: String,
    criteria: String,
    auditor_looks_for: Option<String>,
    evidence_types: Vec<String>,
    solo_company_note: Option<String>,
    compensating_control: Option<String>,
    mcp_targets: Option<String>,
}

impl PendingControl {
    fn set(&mut self, field: ControlField, value: &str) {
        let value = value.trim();
        match field {
            ControlField::AuditorLooksFor => self.auditor_looks_for = Some(value.to_string()),
            ControlField::EvidenceTypes => {
                self.evidence_types = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ControlField::SoloCompanyNote => self.solo_company_note = Some(value.to_string()),
            ControlField::CompensatingControl => {
                self.compensating_control = Some(value.to_string())
            }
            ControlField::McpTargets => self.mcp_targets = Some(value.to_string()),
        }
    }

    fn into_entry(self) -> Option<ControlEntry> {
        let id = self.id?;
        Some(ControlEntry {
            id,
            name: self.name,
            criteria: self.criteria,
            auditor_looks_for: self.auditor_looks_for.unwrap_or_default(),
            evidence_types: self.evidence_types,
            solo_company_note: self.solo_company_note,
            compensating_control: self.compensating_control,
            mcp_targets: self.mcp_targets,
        })
    }
}

#[derive(Debug)]
enum ScanState {
    Outside,
    Inside(PendingControl),
}

#[derive(Debug)]
enum Line<'a> {
    Criteria(&'a str),
    Control { id: &'a str, name: &'a str },
    MalformedControl,
    Field(ControlField, &'a str),
    Other,
}

fn classify(line: &str) -> Line<'_> {
    let line = line.trim_end();
    if let Some(caps) = CRITERIA_HEADING.captures(line) {
        let code = caps.get(1).map_or("", |m| m.as_str());
        return Line::Criteria(code);
    }
    if line.starts_with("### ") {
        return match CONTROL_HEADING.captures(line) {
            Some(caps) => Line::Control {
                id: caps.get(1).map_or("", |m| m.as_str()),
                name: caps.get(2).map_or("", |m| m.as_str().trim()),
            },
            None => Line::MalformedControl,
        };
    }
    for (pattern, field) in FIELD_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(line) {
            return Line::Field(*field, caps.get(1).map_or("", |m| m.as_str()));
        }
    }
    Line::Other
}

/// Single-pass heading/bullet scanner.
struct ControlScanner {
    criteria: String,
    state: ScanState,
    out: Vec<ControlEntry>,
}

impl ControlScanner {
    fn new() -> Self {
        Self {
            criteria: String::new(),
            state: ScanState::Outside,
            out: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if let ScanState::Inside(pending) = std::mem::replace(&mut self.state, ScanState::Outside)
            && let Some(entry) = pending.into_entry()
        {
            self.out.push(entry);
        }
    }

    fn open(&mut self, id: Option<&str>, name: &str) {
        self.flush();
        self.state = ScanState::Inside(PendingControl {
            id: id.map(str::to_string),
            name: name.to_string(),
            criteria: self.criteria.clone(),
            ..Default::default()
        });
    }

    fn feed(&mut self, line: &str) {
        match classify(line) {
            Line::Criteria(code) => self.criteria = code.to_string(),
            Line::Control { id, name } => self.open(Some(id), name),
            Line::MalformedControl => self.open(None, ""),
            Line::Field(field, value) => {
                if let ScanState::Inside(pending) = &mut self.state {
                    pending.set(field, value);
                }
            }
            Line::Other => {}
        }
    }

    fn finish(mut self) -> Vec<ControlEntry> {
        self.flush();
        self.out
    }
}

/// Extract every well-formed control from one document body.
pub fn parse_controls(content: &str) -> Vec<ControlEntry> {
    let mut scanner = ControlScanner::new();
    for line in content.lines() {
        scanner.feed(line);
    }
    scanner.finish()
}

/// Parse every `controls/` document, concatenating in listing order. IDs are
/// not deduplicated across documents.
pub async fn load_all_controls(store: &DocumentStore) -> Result<Vec<ControlEntry>, ComplianceError> {
    let docs = store.list_documents(DocumentType::Controls, None).await?;
    let mut all = Vec::new();
    for doc in docs {
        let parsed = store.read_document(&doc.path).await?;
        all.extend(parse_controls(&parsed.content));
    }
    Ok(all)
}

/// Listing row returned by [`list_controls`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSummary {
    pub id: String,
    pub name: String,
    pub criteria: String,
    pub has_compensating_control: bool,
    pub has_mcp_targets: bool,
}

impl From<&ControlEntry> for ControlSummary {
    fn from(c: &ControlEntry) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            criteria: c.criteria.clone(),
            has_compensating_control: c.compensating_control.is_some(),
            has_mcp_targets: c.mcp_targets.is_some(),
        }
    }
}

/// A control matches `criteria` when it belongs to that group or its ID
/// starts with it (`CC5` and `CC5.1` both select `CC5.1`).
pub fn matches_criteria(control: &ControlEntry, criteria: &str) -> bool {
    control.criteria == criteria || control.id.starts_with(criteria)
}

pub async fn list_controls(
    store: &DocumentStore,
    criteria: Option<&str>,
) -> Result<Vec<ControlSummary>, ComplianceError> {
    let controls = load_all_controls(store).await?;
    Ok(controls
        .iter()
        .filter(|c| criteria.is_none_or(|wanted| matches_criteria(c, wanted)))
        .map(ControlSummary::from)
        .collect())
}

/// First control with `id`; duplicates across documents resolve to the
/// earliest in listing order.
pub async fn get_control(store: &DocumentStore, id: &str) -> Result<ControlEntry, ComplianceError> {
    let controls = load_all_controls(store).await?;
    let available = controls.iter().map(|c| c.id.as_str()).collect::<Vec<_>>().join(", ");
    controls
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .ok_or_else(|| {
            ComplianceError::NotFound(format!(
                "Control '{}' not found. Available controls: {}",
                id, available
            ))
        })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CriteriaCoverage {
    pub total: usize,
    pub covered: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub total: usize,
    pub covered: usize,
    pub uncovered: usize,
    pub coverage_percent: u32,
    pub by_criteria: BTreeMap<String, CriteriaCoverage>,
    pub uncovered_controls: Vec<ControlRef>,
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.'
}

/// Whether `body` mentions `id` as a whole token, so `CC1.1` is not counted
/// as mentioned by `CC1.10`.
pub fn mentions_control(body: &str, id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    body.match_indices(id).any(|(start, _)| {
        let before = body[..start].chars().next_back();
        let after = body[start + id.len()..].chars().next();
        !before.is_some_and(is_id_char)
            && match after {
                None => true,
                Some('.') => !body[start + id.len() + 1..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphanumeric()),
                Some(c) => !c.is_ascii_alphanumeric(),
            }
    })
}

/// Coverage of `controls` by the ledger body.
pub fn compute_coverage(controls: &[ControlEntry], manifest_body: &str) -> CoverageReport {
    let mut by_criteria: BTreeMap<String, CriteriaCoverage> = BTreeMap::new();
    let mut uncovered_controls = Vec::new();
    let mut covered = 0;

    for control in controls {
        let is_covered = mentions_control(manifest_body, &control.id);
        let group = by_criteria.entry(control.criteria.clone()).or_default();
        group.total += 1;
        if is_covered {
            group.covered += 1;
            covered += 1;
        } else {
            uncovered_controls.push(ControlRef {
                id: control.id.clone(),
                name: control.name.clone(),
            });
        }
    }

    let total = controls.len();
    let coverage_percent = if total > 0 {
        ((covered as f64 / total as f64) * 100.0).round() as u32
    } else {
        0
    };

    CoverageReport {
        total,
        covered,
        uncovered: total - covered,
        coverage_percent,
        by_criteria,
        uncovered_controls,
    }
}

/// Coverage against `evidence/manifest.md`. An absent or unreadable ledger
/// counts as empty.
pub async fn control_coverage(store: &DocumentStore) -> Result<CoverageReport, ComplianceError> {
    let controls = load_all_controls(store).await?;
    let manifest_body = match store.read_document(&store.manifest_path()).await {
        Ok(doc) => doc.content,
        Err(e) => {
            warn!(error = %e, "evidence manifest unavailable; reporting zero coverage");
            String::new()
        }
    };
    Ok(compute_coverage(&controls, &manifest_body))
}
