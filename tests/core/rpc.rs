use serde_json::{Value, json};
use soc2_ledger::core::config::ProcessConfig;
use soc2_ledger::core::process::CliRunner;
use soc2_ledger::core::rpc::{self, ToolContext, ToolRequest, ToolResponse};
use soc2_ledger::core::store::DocumentStore;
use soc2_ledger::parse_request_line;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn context(root: &Path) -> ToolContext {
    ToolContext::new(DocumentStore::new(root), CliRunner::new(ProcessConfig::default()))
}

async fn call(ctx: &ToolContext, op: &str, params: Value) -> ToolResponse {
    ctx.handle(ToolRequest {
        op: op.to_string(),
        params,
        id: "req-1".to_string(),
    })
    .await
}

fn error_code(response: &ToolResponse) -> &str {
    response.error.as_ref().map(|e| e.code.as_str()).unwrap_or("")
}

#[tokio::test]
async fn create_then_list_documents() {
    let tmp = tempdir().expect("tempdir");
    let ctx = context(tmp.path());

    let created = call(
        &ctx,
        "create_document",
        json!({
            "type": "policies",
            "filename": "access-control.md",
            "metadata": {"id": "POL-001", "title": "Access Control Policy"},
            "content": "# Access Control"
        }),
    )
    .await;
    assert!(created.success, "{:?}", created.error);
    assert_eq!(created.id, "req-1");
    assert_eq!(created.result, Some(json!({"created": "policies/access-control.md"})));
    assert_eq!(created.receipt.op, "create_document");
    assert_eq!(created.receipt.touched_paths, vec!["policies/access-control.md"]);

    let listed = call(&ctx, "list_documents", json!({"type": "policies", "status": "draft"})).await;
    assert!(listed.success);
    let rows = listed.result.expect("result");
    assert_eq!(rows[0]["id"], "POL-001");
    assert_eq!(rows[0]["status"], "draft");
    assert_eq!(rows[0]["title"], "Access Control Policy");
    assert!(listed.receipt.touched_paths.is_empty());

    let read = call(&ctx, "read_document", json!({"path": "policies/access-control.md"})).await;
    let result = read.result.expect("result");
    assert_eq!(result["metadata"]["version"], "1.0");
    assert_eq!(result["content"], "# Access Control");
}

#[tokio::test]
async fn status_update_through_boundary() {
    let tmp = tempdir().expect("tempdir");
    let ctx = context(tmp.path());
    fs::create_dir_all(tmp.path().join("policies")).expect("mkdir");
    fs::write(tmp.path().join("policies/p.md"), "---\ntitle: P\nstatus: review\n---\n\nbody\n").expect("write");

    let response = call(
        &ctx,
        "update_document_status",
        json!({"path": "policies/p.md", "status": "approved"}),
    )
    .await;
    assert!(response.success, "{:?}", response.error);
    let result = response.result.expect("result");
    assert_eq!(result["metadata"]["status"], "approved");
    assert_eq!(response.receipt.touched_paths, vec!["policies/p.md"]);

    let mistyped = call(
        &ctx,
        "update_document",
        json!({"path": "policies/p.md", "metadata": {"tsc_criteria": "CC1"}}),
    )
    .await;
    assert_eq!(error_code(&mistyped), "validation_error");

    let bad = call(
        &ctx,
        "update_document_status",
        json!({"path": "policies/p.md", "status": "archived"}),
    )
    .await;
    assert_eq!(error_code(&bad), "validation_error");
}

#[tokio::test]
async fn unknown_op_and_unknown_fields_are_rejected() {
    let tmp = tempdir().expect("tempdir");
    let ctx = context(tmp.path());

    let unknown = call(&ctx, "delete_everything", Value::Null).await;
    assert!(!unknown.success);
    assert_eq!(error_code(&unknown), "unknown_op");
    assert!(unknown.result.is_none());

    let extra = call(&ctx, "get_compliance_dashboard", json!({"verbose": true})).await;
    assert_eq!(error_code(&extra), "validation_error");

    let missing = call(&ctx, "get_control", json!({})).await;
    assert_eq!(error_code(&missing), "validation_error");
}

#[tokio::test]
async fn paths_outside_root_are_rejected() {
    let tmp = tempdir().expect("tempdir");
    let ctx = context(tmp.path());

    for path in ["../secrets.md", "/etc/passwd", "policies/../../x.md"] {
        let response = call(&ctx, "read_document", json!({ "path": path })).await;
        assert_eq!(error_code(&response), "validation_error", "{}", path);
    }

    let missing = call(&ctx, "read_document", json!({"path": "policies/none.md"})).await;
    assert_eq!(error_code(&missing), "not_found");
}

#[tokio::test]
async fn agent_parameters_are_range_checked() {
    let tmp = tempdir().expect("tempdir");
    let ctx = context(tmp.path());

    let tier = call(&ctx, "list_agents", json!({"risk_tier": 9})).await;
    assert_eq!(error_code(&tier), "validation_error");

    let context_class = call(&ctx, "list_agents", json!({"context_classification": "semi"})).await;
    assert_eq!(error_code(&context_class), "validation_error");

    let threshold = call(&ctx, "check_credential_rotation", json!({"rotation_threshold_days": 0})).await;
    assert_eq!(error_code(&threshold), "validation_error");

    let empty = call(&ctx, "list_agents", json!({"status": "active", "risk_tier": 2})).await;
    assert!(empty.success);
    assert_eq!(empty.result, Some(json!([])));

    let defaults = call(&ctx, "check_credential_rotation", Value::Null).await;
    assert_eq!(defaults.result.expect("result")["threshold_days"], 90);
}

#[tokio::test]
async fn evidence_flow_records_touched_paths() {
    let tmp = tempdir().expect("tempdir");
    let ctx = context(tmp.path());

    let missing = call(
        &ctx,
        "map_evidence_to_control",
        json!({"control_id": "CC6.1", "evidence_file": "a.md", "collection_method": "Manual"}),
    )
    .await;
    assert_eq!(error_code(&missing), "not_found");

    let init = call(
        &ctx,
        "update_manifest",
        json!({"content": "| Control | File | Method | Date | Status |\n|---|---|---|---|---|\n\n## Collection Summary\n\nNone yet."}),
    )
    .await;
    assert!(init.success, "{:?}", init.error);
    assert_eq!(init.receipt.touched_paths, vec!["evidence/manifest.md"]);

    let stored = call(
        &ctx,
        "store_evidence",
        json!({
            "category": "automated",
            "subcategory": "github",
            "filename": "branch-protection.json",
            "content": "{\"required_reviews\": 1}",
            "content_type": "json",
            "control_ids": ["CC8.1"]
        }),
    )
    .await;
    assert!(stored.success, "{:?}", stored.error);
    assert_eq!(
        stored.receipt.touched_paths,
        vec!["evidence/automated/github/branch-protection.json"]
    );

    let mapped = call(
        &ctx,
        "map_evidence_to_control",
        json!({
            "control_id": "CC8.1",
            "evidence_file": "automated/github/branch-protection.json",
            "collection_method": "MCP: github",
            "status": "pending"
        }),
    )
    .await;
    assert!(mapped.success, "{:?}", mapped.error);
    let row = mapped.result.expect("result")["row"].clone();
    assert!(row.as_str().expect("row").ends_with("| ⏳ |"));

    let manifest = call(&ctx, "get_evidence_manifest", Value::Null).await;
    let content = manifest.result.expect("result")["content"].clone();
    let content = content.as_str().expect("content");
    let row_at = content.find("| CC8.1 |").expect("row present");
    let heading_at = content.find("## Collection Summary").expect("heading present");
    assert!(row_at < heading_at);

    let dashboard = call(&ctx, "get_compliance_dashboard", json!({})).await;
    assert_eq!(dashboard.result.expect("result")["summary"]["evidencePending"], 1);
}

#[tokio::test]
async fn receipt_hashes_inputs_and_outputs() {
    let tmp = tempdir().expect("tempdir");
    let ctx = context(tmp.path());

    let a = call(&ctx, "list_controls", json!({"criteria": "CC1"})).await;
    let b = call(&ctx, "list_controls", json!({"criteria": "CC1"})).await;
    let c = call(&ctx, "list_controls", json!({"criteria": "CC2"})).await;
    assert!(a.success);
    assert_eq!(a.receipt.inputs_hash, b.receipt.inputs_hash);
    assert_ne!(a.receipt.inputs_hash, c.receipt.inputs_hash);
    assert_eq!(a.receipt.outputs_hash, c.receipt.outputs_hash);
    assert_eq!(a.receipt.outputs_hash.len(), 64);

    let json = serde_json::to_value(&a).expect("json");
    assert!(json.get("error").is_none());
    assert!(json["receipt"].get("touched_paths").is_none());
}

#[test]
fn malformed_request_lines_become_parse_errors() {
    let response = parse_request_line("{not json").expect_err("malformed");
    assert!(!response.success);
    assert_eq!(error_code(&response), "parse_error");
    assert_eq!(response.id.len(), 26);

    let request = parse_request_line(r#"{"op":"cli_inventory","id":"abc"}"#).expect("valid");
    assert_eq!(request.op, "cli_inventory");
    assert_eq!(request.id, "abc");
    assert!(request.params.is_null());
}

#[test]
fn capabilities_list_every_operation() {
    let report = rpc::capabilities();
    let names: Vec<&str> = report.ops.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names.len(), 23);
    for op in ["create_document", "map_evidence_to_control", "run_agent_audit", "cli_inventory"] {
        assert!(names.contains(&op), "{}", op);
    }
}
