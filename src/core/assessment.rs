//! Assessment reports and the compliance dashboard.
//!
//! Gap analyses land in `gaps/`, readiness checks in `assessments/`, one file
//! per day (a second run on the same day overwrites). Both carry an
//! `assessment_date` header field, which is what "latest" sorts on.

use crate::core::documents::DocumentEntry;
use crate::core::error::ComplianceError;
use crate::core::evidence::{ManifestStatusCounts, manifest_status_counts};
use crate::core::frontmatter::{DocStatus, DocumentMetadata};
use crate::core::store::{DocumentStore, DocumentType};
use crate::core::time;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const ROADMAP_HEADING: &str = "## Remediation Roadmap";
const ASSESSMENT_DATE: &str = "assessment_date";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrittenReport {
    pub path: PathBuf,
    pub relative_path: String,
    pub metadata: DocumentMetadata,
}

fn report_metadata(id: String, title: String, today: &str) -> DocumentMetadata {
    let mut metadata = DocumentMetadata {
        id: Some(id),
        title: Some(title),
        status: Some(DocStatus::Draft.as_str().to_string()),
        version: Some("1.0".to_string()),
        ..Default::default()
    };
    metadata
        .extra
        .insert(ASSESSMENT_DATE.to_string(), Value::String(today.to_string()));
    metadata
}

fn assessment_date(entry: &DocumentEntry) -> String {
    entry.metadata.extra_str(ASSESSMENT_DATE).unwrap_or_default()
}

/// Newest entry by `assessment_date`; ties keep listing order.
fn latest(mut entries: Vec<DocumentEntry>) -> Option<DocumentEntry> {
    entries.sort_by_key(|e| std::cmp::Reverse(assessment_date(e)));
    entries.into_iter().next()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRef {
    pub path: String,
    pub date: Option<String>,
    pub status: Option<String>,
}

impl From<&DocumentEntry> for ReportRef {
    fn from(entry: &DocumentEntry) -> Self {
        Self {
            path: entry.relative_path.clone(),
            date: entry.metadata.extra_str(ASSESSMENT_DATE),
            status: entry.metadata.status.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_policies: usize,
    pub policy_statuses: BTreeMap<String, usize>,
    #[serde(flatten)]
    pub evidence: ManifestStatusCounts,
    pub total_evidence_artifacts: usize,
    pub gap_reports: usize,
    pub readiness_assessments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub summary: DashboardSummary,
    pub latest_gap_report: Option<ReportRef>,
    pub latest_readiness_check: Option<ReportRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Roadmap {
    pub source: String,
    pub date: Option<String>,
    /// `None` when the report has no roadmap section.
    pub section: Option<String>,
}

/// Lines from the roadmap heading up to, not including, the next level-two
/// heading.
pub fn extract_roadmap(content: &str) -> Option<String> {
    let mut lines = content.lines();
    let start = lines.by_ref().find(|l| l.starts_with(ROADMAP_HEADING))?;
    let mut section = vec![start];
    section.extend(lines.take_while(|l| !l.starts_with("## ")));
    Some(section.join("\n").trim_end().to_string())
}

impl DocumentStore {
    async fn write_report(
        &self,
        doc_type: DocumentType,
        filename: String,
        metadata: DocumentMetadata,
        content: &str,
    ) -> Result<WrittenReport, ComplianceError> {
        let relative_path = format!("{}/{}", doc_type, filename);
        let path = self.type_path(doc_type).join(&filename);
        self.write_document(&path, &metadata, content).await?;
        debug!(path = %relative_path, "wrote assessment report");
        Ok(WrittenReport {
            path,
            relative_path,
            metadata,
        })
    }

    pub async fn write_gap_analysis(&self, content: &str) -> Result<WrittenReport, ComplianceError> {
        let today = time::today();
        let metadata = report_metadata(
            format!("GAP-{}", today),
            format!("SOC 2 Gap Assessment Report — {}", today),
            &today,
        );
        self.write_report(
            DocumentType::Gaps,
            format!("gap-analysis-{}.md", today),
            metadata,
            content,
        )
        .await
    }

    pub async fn write_readiness_check(&self, content: &str) -> Result<WrittenReport, ComplianceError> {
        let today = time::today();
        let metadata = report_metadata(
            format!("READY-{}", today),
            format!("Audit Readiness Assessment — {}", today),
            &today,
        );
        self.write_report(
            DocumentType::Assessments,
            format!("readiness-check-{}.md", today),
            metadata,
            content,
        )
        .await
    }

    pub async fn dashboard(&self) -> Result<Dashboard, ComplianceError> {
        let (policies, gaps, assessments, evidence) = tokio::try_join!(
            self.list_documents(DocumentType::Policies, None),
            self.list_documents(DocumentType::Gaps, None),
            self.list_documents(DocumentType::Assessments, None),
            self.list_documents(DocumentType::Evidence, None),
        )?;

        let manifest_body = match self.read_manifest().await {
            Ok(doc) => doc.content,
            Err(ComplianceError::NotFound(_)) => String::new(),
            Err(e) => {
                warn!(error = %e, "evidence manifest unreadable; counting no evidence rows");
                String::new()
            }
        };

        let policy_statuses = DocStatus::ALL
            .into_iter()
            .map(|status| {
                let count = policies
                    .iter()
                    .filter(|p| p.metadata.status.as_deref() == Some(status.as_str()))
                    .count();
                (status.as_str().to_string(), count)
            })
            .collect();

        let summary = DashboardSummary {
            total_policies: policies.len(),
            policy_statuses,
            evidence: manifest_status_counts(&manifest_body),
            total_evidence_artifacts: evidence.len(),
            gap_reports: gaps.len(),
            readiness_assessments: assessments.len(),
        };

        Ok(Dashboard {
            summary,
            latest_gap_report: latest(gaps).as_ref().map(ReportRef::from),
            latest_readiness_check: latest(assessments).as_ref().map(ReportRef::from),
        })
    }

    pub async fn remediation_roadmap(&self) -> Result<Roadmap, ComplianceError> {
        let gaps = self.list_documents(DocumentType::Gaps, None).await?;
        let newest = latest(gaps).ok_or_else(|| {
            ComplianceError::NotFound(
                "No gap analysis reports found. Run a gap analysis first.".to_string(),
            )
        })?;
        let doc = self.read_document(&newest.path).await?;
        Ok(Roadmap {
            date: newest.metadata.extra_str(ASSESSMENT_DATE),
            section: extract_roadmap(&doc.content),
            source: newest.relative_path,
        })
    }
}
