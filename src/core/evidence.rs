//! Evidence artifacts and the evidence ledger.
//!
//! Artifacts live under `evidence/<category>[/<subcategory>]/`. The ledger is
//! one markdown document, `evidence/manifest.md`, whose body holds a table of
//! control-to-artifact rows followed by a `## Collection Summary` section.
//! New rows are spliced into the text directly; the table is never parsed.

use crate::core::error::ComplianceError;
use crate::core::frontmatter::{DocumentMetadata, ParsedDocument};
use crate::core::store::{DocumentStore, DocumentType, validate_filename};
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::fs;
use tracing::debug;

pub const COLLECTION_SUMMARY_HEADING: &str = "## Collection Summary";
pub const MANIFEST_ID: &str = "EV-MANIFEST";
pub const MANIFEST_TITLE: &str = "Evidence Manifest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStatus {
    Collected,
    Pending,
    Expired,
}

impl EvidenceStatus {
    pub fn symbol(self) -> &'static str {
        match self {
            EvidenceStatus::Collected => "✅",
            EvidenceStatus::Pending => "⏳",
            EvidenceStatus::Expired => "❌",
        }
    }
}

/// One ledger row: `| control | file | method | date | symbol |`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRow {
    pub control_id: String,
    pub evidence_file: String,
    pub collection_method: String,
    pub date: String,
    pub status: EvidenceStatus,
}

impl EvidenceRow {
    /// Row dated today.
    pub fn today(
        control_id: impl Into<String>,
        evidence_file: impl Into<String>,
        collection_method: impl Into<String>,
        status: EvidenceStatus,
    ) -> Self {
        Self {
            control_id: control_id.into(),
            evidence_file: evidence_file.into(),
            collection_method: collection_method.into(),
            date: time::today(),
            status,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "| {} | {} | {} | {} | {} |",
            self.control_id,
            self.evidence_file,
            self.collection_method,
            self.date,
            self.status.symbol()
        )
    }
}

/// Splice `row` into a ledger body.
///
/// With a `## Collection Summary` heading present, the row goes right after
/// the last non-blank line above it, so it extends the table and the blank
/// separator before the heading survives. The row is therefore not adjacent
/// to the heading when a blank line separates them. Otherwise it is appended.
pub fn insert_evidence_row(body: &str, row: &str) -> String {
    let lines: Vec<&str> = body.split('\n').collect();
    let Some(heading) = lines
        .iter()
        .position(|l| l.starts_with(COLLECTION_SUMMARY_HEADING))
    else {
        return if body.is_empty() {
            row.to_string()
        } else {
            format!("{}\n{}", body, row)
        };
    };

    let insert_at = lines[..heading]
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
    out.extend_from_slice(&lines[..insert_at]);
    out.push(row);
    out.extend_from_slice(&lines[insert_at..]);
    out.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceCategory {
    Automated,
    Manual,
    Policies,
    Reviews,
}

impl EvidenceCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceCategory::Automated => "automated",
            EvidenceCategory::Manual => "manual",
            EvidenceCategory::Policies => "policies",
            EvidenceCategory::Reviews => "reviews",
        }
    }
}

impl fmt::Display for EvidenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceCategory {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            EvidenceCategory::Automated,
            EvidenceCategory::Manual,
            EvidenceCategory::Policies,
            EvidenceCategory::Reviews,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
        .ok_or_else(|| ComplianceError::ValidationError(format!("Unknown evidence category '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Markdown,
    Json,
    Yaml,
    Text,
}

/// Artifact to store.
#[derive(Debug, Clone)]
pub struct EvidenceArtifact<'a> {
    pub category: EvidenceCategory,
    pub subcategory: Option<&'a str>,
    pub filename: &'a str,
    pub content: &'a str,
    pub content_type: ContentType,
    pub control_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvidence {
    pub path: PathBuf,
    /// Root-relative, e.g. `evidence/automated/github/branch.json`.
    pub relative_path: String,
    pub control_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceSummary {
    pub path: String,
    pub title: String,
    pub status: Option<String>,
    pub controls: Vec<String>,
    pub collected: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStatusCounts {
    pub evidence_collected: usize,
    pub evidence_pending: usize,
    pub evidence_expired: usize,
}

/// Count status symbols anywhere in a ledger body.
pub fn manifest_status_counts(body: &str) -> ManifestStatusCounts {
    ManifestStatusCounts {
        evidence_collected: body.matches(EvidenceStatus::Collected.symbol()).count(),
        evidence_pending: body.matches(EvidenceStatus::Pending.symbol()).count(),
        evidence_expired: body.matches(EvidenceStatus::Expired.symbol()).count(),
    }
}

impl DocumentStore {
    pub async fn read_manifest(&self) -> Result<ParsedDocument, ComplianceError> {
        self.read_document(&self.manifest_path())
            .await
            .map_err(|e| match e {
                ComplianceError::NotFound(_) => ComplianceError::NotFound(
                    "Evidence manifest not found. Initialize the compliance tree to create it."
                        .to_string(),
                ),
                other => other,
            })
    }

    /// Splice one row into the ledger and stamp `last_updated`.
    pub async fn append_evidence_row(&self, row: &EvidenceRow) -> Result<(), ComplianceError> {
        let manifest = self.read_manifest().await?;
        let body = insert_evidence_row(&manifest.content, &row.render());
        let metadata = DocumentMetadata {
            last_updated: Some(time::today()),
            ..manifest.metadata
        };
        self.write_document(&self.manifest_path(), &metadata, &body)
            .await?;
        debug!(control_id = %row.control_id, file = %row.evidence_file, "appended evidence row");
        Ok(())
    }

    /// Replace the ledger body. Existing metadata is kept; identity fields and
    /// `last_updated` are reset. A missing ledger is created.
    pub async fn replace_manifest(&self, content: &str) -> Result<DocumentMetadata, ComplianceError> {
        let existing = match self.read_manifest().await {
            Ok(doc) => doc.metadata,
            Err(ComplianceError::NotFound(_)) => DocumentMetadata::default(),
            Err(e) => return Err(e),
        };
        let metadata = DocumentMetadata {
            id: Some(MANIFEST_ID.to_string()),
            title: Some(MANIFEST_TITLE.to_string()),
            last_updated: Some(time::today()),
            ..existing
        };
        self.write_document(&self.manifest_path(), &metadata, content)
            .await?;
        Ok(metadata)
    }

    /// Write an artifact. Markdown gets a fresh header; every other content
    /// type is written byte-for-byte.
    pub async fn store_evidence(
        &self,
        artifact: &EvidenceArtifact<'_>,
    ) -> Result<StoredEvidence, ComplianceError> {
        validate_filename(artifact.filename)?;
        let mut rel = format!("{}/{}", DocumentType::Evidence, artifact.category);
        if let Some(sub) = artifact.subcategory.filter(|s| !s.trim().is_empty()) {
            validate_filename(sub)?;
            rel = format!("{}/{}", rel, sub);
        }
        let dir = self.root.join(&rel);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(artifact.filename);

        match artifact.content_type {
            ContentType::Markdown => {
                let mut metadata = DocumentMetadata {
                    title: Some(
                        artifact
                            .filename
                            .strip_suffix(".md")
                            .unwrap_or(artifact.filename)
                            .to_string(),
                    ),
                    status: Some("draft".to_string()),
                    tsc_criteria: artifact.control_ids.clone(),
                    ..Default::default()
                };
                metadata
                    .extra
                    .insert("collected_date".to_string(), Value::String(time::today()));
                self.write_document(&path, &metadata, artifact.content)
                    .await?;
            }
            ContentType::Json | ContentType::Yaml | ContentType::Text => {
                fs::write(&path, artifact.content.as_bytes()).await?;
            }
        }

        Ok(StoredEvidence {
            relative_path: format!("{}/{}", rel, artifact.filename),
            path,
            control_ids: artifact.control_ids.clone().unwrap_or_default(),
        })
    }

    /// Markdown evidence documents, optionally limited to a category and/or
    /// documents whose `tsc_criteria` contains `control_id`.
    pub async fn list_evidence(
        &self,
        category: Option<EvidenceCategory>,
        control_id: Option<&str>,
    ) -> Result<Vec<EvidenceSummary>, ComplianceError> {
        let docs = self.list_documents(DocumentType::Evidence, None).await?;
        let prefix = category.map(|c| format!("{}/{}/", DocumentType::Evidence, c));

        Ok(docs
            .into_iter()
            .filter(|d| {
                prefix
                    .as_deref()
                    .is_none_or(|p| d.relative_path.starts_with(p))
            })
            .filter(|d| {
                control_id.is_none_or(|id| {
                    d.metadata
                        .tsc_criteria
                        .as_ref()
                        .is_some_and(|c| c.iter().any(|x| x == id))
                })
            })
            .map(|d| EvidenceSummary {
                title: d
                    .metadata
                    .title
                    .clone()
                    .unwrap_or_else(|| d.relative_path.clone()),
                status: d.metadata.status.clone(),
                controls: d.metadata.tsc_criteria.clone().unwrap_or_default(),
                collected: d.metadata.extra_str("collected_date"),
                path: d.relative_path,
            })
            .collect())
    }
}
