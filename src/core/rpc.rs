//! Tool-call boundary.
//!
//! Callers send one [`ToolRequest`] (`{op, params, id}`) and get back one
//! [`ToolResponse`]. Every response carries a [`Receipt`] recording the
//! operation, a hash of its inputs, and the paths it touched. Parameters are
//! decoded into one strict struct per operation; unknown fields are rejected.

use crate::core::agents::{self, AgentFilter, DEFAULT_ROTATION_THRESHOLD_DAYS};
use crate::core::controls;
use crate::core::error::ComplianceError;
use crate::core::evidence::{ContentType, EvidenceArtifact, EvidenceCategory, EvidenceRow, EvidenceStatus};
use crate::core::findings;
use crate::core::frontmatter::{DocStatus, DocumentMetadata};
use crate::core::process::CliRunner;
use crate::core::store::{DocumentStore, DocumentType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use sha2::Digest;
use tracing::{debug, warn};

/// Standard request envelope
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolRequest {
    pub op: String,
    #[serde(default)]
    pub params: JsonValue,
    /// Correlation id echoed back in the response
    #[serde(default = "default_request_id")]
    pub id: String,
}

pub fn default_request_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Standard response envelope
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolResponse {
    pub id: String,
    pub success: bool,
    pub receipt: Receipt,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

/// Receipt documenting what happened
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Receipt {
    pub op: String,
    /// Epoch seconds, `Z`-suffixed
    pub timestamp: String,
    /// SHA-256 of the canonical params JSON
    pub inputs_hash: String,
    /// SHA-256 of the result JSON, or of `"error"`
    pub outputs_hash: String,
    /// Root-relative paths written by the operation
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub touched_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolError {
    /// `not_found`, `parse_error`, `validation_error`, `io_error`,
    /// `config_error` or `unknown_op`
    pub code: String,
    pub message: String,
}

impl From<ComplianceError> for ToolError {
    fn from(e: ComplianceError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

fn hash_json<T: Serialize>(value: &T) -> String {
    format!(
        "{:x}",
        sha2::Sha256::digest(serde_json::to_string(value).unwrap_or_default())
    )
}

pub fn success_response(
    request_id: String,
    op: String,
    params: &JsonValue,
    result: JsonValue,
    touched_paths: Vec<String>,
) -> ToolResponse {
    ToolResponse {
        id: request_id,
        success: true,
        receipt: Receipt {
            op,
            timestamp: crate::core::time::now_epoch_z(),
            inputs_hash: hash_json(params),
            outputs_hash: hash_json(&result),
            touched_paths,
        },
        result: Some(result),
        error: None,
    }
}

pub fn error_response(request_id: String, op: String, params: &JsonValue, error: ToolError) -> ToolResponse {
    ToolResponse {
        id: request_id,
        success: false,
        receipt: Receipt {
            op,
            timestamp: crate::core::time::now_epoch_z(),
            inputs_hash: hash_json(params),
            outputs_hash: format!("{:x}", sha2::Sha256::digest("error")),
            touched_paths: vec![],
        },
        result: None,
        error: Some(error),
    }
}

// --- parameter structs ---

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListDocumentsParams {
    #[serde(rename = "type")]
    doc_type: DocumentType,
    status: Option<DocStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathParams {
    path: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NewDocumentMetadata {
    id: Option<String>,
    title: String,
    #[serde(default = "default_status")]
    status: DocStatus,
    #[serde(default = "default_version")]
    version: String,
    owner: Option<String>,
    tsc_criteria: Option<Vec<String>>,
}

fn default_status() -> DocStatus {
    DocStatus::Draft
}

impl From<NewDocumentMetadata> for DocumentMetadata {
    fn from(m: NewDocumentMetadata) -> Self {
        DocumentMetadata {
            id: m.id,
            title: Some(m.title),
            status: Some(m.status.as_str().to_string()),
            version: Some(m.version),
            owner: m.owner,
            tsc_criteria: m.tsc_criteria,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateDocumentParams {
    #[serde(rename = "type")]
    doc_type: DocumentType,
    filename: String,
    metadata: NewDocumentMetadata,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateDocumentParams {
    path: String,
    metadata: Option<serde_json::Map<String, JsonValue>>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatusParams {
    path: String,
    status: DocStatus,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CriteriaParams {
    criteria: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdParams {
    id: String,
}

fn default_evidence_status() -> EvidenceStatus {
    EvidenceStatus::Collected
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MapEvidenceParams {
    control_id: String,
    evidence_file: String,
    collection_method: String,
    #[serde(default = "default_evidence_status")]
    status: EvidenceStatus,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreEvidenceParams {
    category: EvidenceCategory,
    subcategory: Option<String>,
    filename: String,
    content: String,
    #[serde(default)]
    content_type: ContentType,
    control_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListEvidenceParams {
    category: Option<EvidenceCategory>,
    control_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContentParams {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GapAnalysisParams {
    report_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadinessParams {
    assessment_content: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AgentStatus {
    Active,
    Inactive,
    Decommissioned,
}

impl AgentStatus {
    fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
            AgentStatus::Decommissioned => "decommissioned",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ContextClass {
    Trusted,
    Untrusted,
}

impl ContextClass {
    fn as_str(self) -> &'static str {
        match self {
            ContextClass::Trusted => "trusted",
            ContextClass::Untrusted => "untrusted",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListAgentsParams {
    status: Option<AgentStatus>,
    context_classification: Option<ContextClass>,
    risk_tier: Option<u8>,
}

fn default_threshold() -> i64 {
    DEFAULT_ROTATION_THRESHOLD_DAYS
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RotationParams {
    #[serde(default = "default_threshold")]
    rotation_threshold_days: i64,
}

fn decode<P: DeserializeOwned>(params: &JsonValue) -> Result<P, ToolError> {
    let value = match params {
        JsonValue::Null => JsonValue::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| ToolError {
        code: "validation_error".to_string(),
        message: format!("invalid params: {}", e),
    })
}

fn validation(message: impl Into<String>) -> ToolError {
    ToolError {
        code: "validation_error".to_string(),
        message: message.into(),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<JsonValue, ToolError> {
    serde_json::to_value(value).map_err(|e| ComplianceError::from(e).into())
}

// --- operation table ---

/// Name, description, parameter names.
pub const OPS: &[(&str, &str, &[&str])] = &[
    ("list_documents", "List documents of one type, optionally by status", &["type", "status"]),
    ("read_document", "Read a document's metadata and body", &["path"]),
    ("create_document", "Create a document under its type directory", &["type", "filename", "metadata", "content"]),
    ("update_document", "Merge metadata and/or replace the body", &["path", "metadata", "content"]),
    ("update_document_status", "Move a document through its lifecycle", &["path", "status"]),
    ("list_controls", "List parsed controls, optionally by criteria", &["criteria"]),
    ("get_control", "Full record for one control", &["id"]),
    ("get_control_coverage", "Controls referenced by the evidence ledger", &[]),
    ("map_evidence_to_control", "Append a row to the evidence ledger", &["control_id", "evidence_file", "collection_method", "status"]),
    ("store_evidence", "Store an evidence artifact", &["category", "subcategory", "filename", "content", "content_type", "control_ids"]),
    ("list_evidence", "List markdown evidence artifacts", &["category", "control_id"]),
    ("get_evidence_manifest", "Read the evidence ledger", &[]),
    ("update_manifest", "Replace the evidence ledger body", &["content"]),
    ("run_gap_analysis", "Write today's gap analysis report", &["report_content"]),
    ("run_readiness_check", "Write today's readiness assessment", &["assessment_content"]),
    ("get_compliance_dashboard", "Policy, evidence and assessment summary", &[]),
    ("get_remediation_roadmap", "Roadmap section of the latest gap report", &[]),
    ("list_agents", "List registered agents", &["status", "context_classification", "risk_tier"]),
    ("get_agent", "Full registry entry for one agent", &["id"]),
    ("get_agent_coverage", "Agent governance summary", &[]),
    ("check_credential_rotation", "Agent credentials past their rotation threshold", &["rotation_threshold_days"]),
    ("run_agent_audit", "Governance checks for every active agent", &[]),
    ("cli_inventory", "Which provider CLIs are on PATH", &[]),
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpInfo {
    pub name: String,
    pub description: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapabilitiesReport {
    pub version: String,
    pub ops: Vec<OpInfo>,
}

pub fn capabilities() -> CapabilitiesReport {
    CapabilitiesReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        ops: OPS
            .iter()
            .map(|(name, description, params)| OpInfo {
                name: name.to_string(),
                description: description.to_string(),
                params: params.iter().map(|p| p.to_string()).collect(),
            })
            .collect(),
    }
}

/// Everything an operation may reach.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub store: DocumentStore,
    pub runner: CliRunner,
}

type OpOutput = (JsonValue, Vec<String>);

impl ToolContext {
    pub fn new(store: DocumentStore, runner: CliRunner) -> Self {
        Self { store, runner }
    }

    pub async fn handle(&self, request: ToolRequest) -> ToolResponse {
        debug!(op = %request.op, id = %request.id, "dispatching tool call");
        match self.dispatch(&request.op, &request.params).await {
            Ok((result, touched)) => success_response(request.id, request.op, &request.params, result, touched),
            Err(error) => {
                warn!(op = %request.op, code = %error.code, message = %error.message, "tool call failed");
                error_response(request.id, request.op, &request.params, error)
            }
        }
    }

    async fn dispatch(&self, op: &str, params: &JsonValue) -> Result<OpOutput, ToolError> {
        let store = &self.store;
        match op {
            "list_documents" => {
                let p: ListDocumentsParams = decode(params)?;
                let docs = store
                    .list_documents(p.doc_type, p.status.map(DocStatus::as_str))
                    .await?;
                let rows: Vec<JsonValue> = docs
                    .iter()
                    .map(|d| {
                        json!({
                            "path": d.relative_path,
                            "title": d.metadata.title.clone().unwrap_or_else(|| d.relative_path.clone()),
                            "status": d.metadata.status.as_deref().unwrap_or("unknown"),
                            "id": d.metadata.id.as_deref().unwrap_or("none"),
                        })
                    })
                    .collect();
                Ok((JsonValue::Array(rows), vec![]))
            }
            "read_document" => {
                let p: PathParams = decode(params)?;
                let doc = store.read_document(&store.resolve_relative(&p.path)?).await?;
                Ok((json!({ "metadata": doc.metadata, "content": doc.content }), vec![]))
            }
            "create_document" => {
                let p: CreateDocumentParams = decode(params)?;
                let path = store
                    .create_document(p.doc_type, &p.filename, p.metadata.into(), &p.content)
                    .await?;
                let rel = store.relative_path(&path);
                Ok((json!({ "created": rel }), vec![rel]))
            }
            "update_document" => {
                let p: UpdateDocumentParams = decode(params)?;
                let path = store.resolve_relative(&p.path)?;
                let patch = match p.metadata {
                    Some(map) => match serde_yaml::to_value(JsonValue::Object(map))
                        .map_err(ComplianceError::from)?
                    {
                        serde_yaml::Value::Mapping(m) => Some(m),
                        _ => return Err(validation("metadata must be an object")),
                    },
                    None => None,
                };
                let metadata = store
                    .update_document(&path, patch.as_ref(), p.content.as_deref())
                    .await?;
                Ok((json!({ "updated": p.path, "metadata": metadata }), vec![p.path]))
            }
            "update_document_status" => {
                let p: StatusParams = decode(params)?;
                let path = store.resolve_relative(&p.path)?;
                let metadata = store.set_status(&path, p.status).await?;
                Ok((json!({ "updated": p.path, "metadata": metadata }), vec![p.path]))
            }
            "list_controls" => {
                let p: CriteriaParams = decode(params)?;
                let rows = controls::list_controls(store, p.criteria.as_deref()).await?;
                Ok((to_json(&rows)?, vec![]))
            }
            "get_control" => {
                let p: IdParams = decode(params)?;
                let control = controls::get_control(store, &p.id).await?;
                Ok((to_json(&control)?, vec![]))
            }
            "get_control_coverage" => {
                let _: NoParams = decode(params)?;
                Ok((to_json(&controls::control_coverage(store).await?)?, vec![]))
            }
            "map_evidence_to_control" => {
                let p: MapEvidenceParams = decode(params)?;
                let row = EvidenceRow::today(p.control_id, p.evidence_file, p.collection_method, p.status);
                store.append_evidence_row(&row).await?;
                let rel = store.relative_path(&store.manifest_path());
                Ok((json!({ "row": row.render() }), vec![rel]))
            }
            "store_evidence" => {
                let p: StoreEvidenceParams = decode(params)?;
                let stored = store
                    .store_evidence(&EvidenceArtifact {
                        category: p.category,
                        subcategory: p.subcategory.as_deref(),
                        filename: &p.filename,
                        content: &p.content,
                        content_type: p.content_type,
                        control_ids: p.control_ids,
                    })
                    .await?;
                let rel = stored.relative_path.clone();
                Ok((to_json(&stored)?, vec![rel]))
            }
            "list_evidence" => {
                let p: ListEvidenceParams = decode(params)?;
                let rows = store.list_evidence(p.category, p.control_id.as_deref()).await?;
                Ok((to_json(&rows)?, vec![]))
            }
            "get_evidence_manifest" => {
                let _: NoParams = decode(params)?;
                let doc = store.read_manifest().await?;
                Ok((json!({ "metadata": doc.metadata, "content": doc.content }), vec![]))
            }
            "update_manifest" => {
                let p: ContentParams = decode(params)?;
                let metadata = store.replace_manifest(&p.content).await?;
                let rel = store.relative_path(&store.manifest_path());
                Ok((json!({ "metadata": metadata }), vec![rel]))
            }
            "run_gap_analysis" => {
                let p: GapAnalysisParams = decode(params)?;
                let report = store.write_gap_analysis(&p.report_content).await?;
                let rel = report.relative_path.clone();
                Ok((to_json(&report)?, vec![rel]))
            }
            "run_readiness_check" => {
                let p: ReadinessParams = decode(params)?;
                let report = store.write_readiness_check(&p.assessment_content).await?;
                let rel = report.relative_path.clone();
                Ok((to_json(&report)?, vec![rel]))
            }
            "get_compliance_dashboard" => {
                let _: NoParams = decode(params)?;
                Ok((to_json(&store.dashboard().await?)?, vec![]))
            }
            "get_remediation_roadmap" => {
                let _: NoParams = decode(params)?;
                Ok((to_json(&store.remediation_roadmap().await?)?, vec![]))
            }
            "list_agents" => {
                let p: ListAgentsParams = decode(params)?;
                if let Some(tier) = p.risk_tier
                    && !(1..=5).contains(&tier)
                {
                    return Err(validation(format!("risk_tier must be between 1 and 5, got {}", tier)));
                }
                let filter = AgentFilter {
                    status: p.status.map(AgentStatus::as_str),
                    context_classification: p.context_classification.map(ContextClass::as_str),
                    risk_tier: p.risk_tier,
                };
                let rows: Vec<JsonValue> = agents::load_agents(store, &filter)
                    .await?
                    .into_iter()
                    .map(|a| {
                        json!({
                            "id": a.id,
                            "name": a.name,
                            "status": a.status,
                            "risk_tier": a.risk_tier,
                            "context": a.context_classification,
                            "control_tier": a.control_tier,
                            "next_review": a.next_review,
                        })
                    })
                    .collect();
                Ok((JsonValue::Array(rows), vec![]))
            }
            "get_agent" => {
                let p: IdParams = decode(params)?;
                let detail = agents::get_agent(store, &p.id).await?;
                Ok((json!({ "metadata": detail.metadata, "content": detail.content }), vec![]))
            }
            "get_agent_coverage" => {
                let _: NoParams = decode(params)?;
                Ok((to_json(&agents::agent_coverage(store).await?)?, vec![]))
            }
            "check_credential_rotation" => {
                let p: RotationParams = decode(params)?;
                if p.rotation_threshold_days < 1 {
                    return Err(validation("rotation_threshold_days must be at least 1"));
                }
                let report = agents::check_credential_rotation(store, p.rotation_threshold_days).await?;
                Ok((to_json(&report)?, vec![]))
            }
            "run_agent_audit" => {
                let _: NoParams = decode(params)?;
                Ok((to_json(&agents::run_agent_audit(store).await?)?, vec![]))
            }
            "cli_inventory" => {
                let _: NoParams = decode(params)?;
                Ok((to_json(&findings::cli_inventory(&self.runner).await)?, vec![]))
            }
            other => Err(ToolError {
                code: "unknown_op".to_string(),
                message: format!("Unknown operation '{}'", other),
            }),
        }
    }
}
