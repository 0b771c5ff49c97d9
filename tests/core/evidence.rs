use soc2_ledger::core::error::ComplianceError;
use soc2_ledger::core::evidence::{
    ContentType, EvidenceArtifact, EvidenceCategory, EvidenceRow, EvidenceStatus,
};
use soc2_ledger::core::store::DocumentStore;
use soc2_ledger::core::time;
use std::fs;
use tempfile::tempdir;

const MANIFEST: &str = "---
id: EV-MANIFEST
title: Evidence Manifest
owner: security
---

# Evidence Manifest

| Control | Evidence File | Collection Method | Date | Status |
|---|---|---|---|---|
| CC1.1 | policies/code-of-conduct.md | Manual | 2026-01-05 | ✅ |

## Collection Summary

Collected quarterly.
";

fn artifact<'a>(
    category: EvidenceCategory,
    subcategory: Option<&'a str>,
    filename: &'a str,
    content: &'a str,
    content_type: ContentType,
) -> EvidenceArtifact<'a> {
    EvidenceArtifact {
        category,
        subcategory,
        filename,
        content,
        content_type,
        control_ids: Some(vec!["CC6.1".to_string()]),
    }
}

#[tokio::test]
async fn markdown_evidence_gets_header_and_json_is_verbatim() {
    let tmp = tempdir().expect("tempdir");
    let store = DocumentStore::new(tmp.path());

    let stored = store
        .store_evidence(&artifact(
            EvidenceCategory::Manual,
            None,
            "access-review-q1.md",
            "Reviewed 14 accounts.",
            ContentType::Markdown,
        ))
        .await
        .expect("store markdown");
    assert_eq!(stored.relative_path, "evidence/manual/access-review-q1.md");
    assert_eq!(stored.control_ids, vec!["CC6.1"]);

    let doc = store.read_document(&stored.path).await.expect("read");
    assert_eq!(doc.metadata.title.as_deref(), Some("access-review-q1"));
    assert_eq!(doc.metadata.status.as_deref(), Some("draft"));
    assert_eq!(doc.metadata.tsc_criteria, Some(vec!["CC6.1".to_string()]));
    assert_eq!(doc.metadata.extra_str("collected_date"), Some(time::today()));
    assert_eq!(doc.content, "Reviewed 14 accounts.");

    let json = "{\"mfa\": true}";
    let stored = store
        .store_evidence(&artifact(
            EvidenceCategory::Automated,
            Some("aws"),
            "mfa.json",
            json,
            ContentType::Json,
        ))
        .await
        .expect("store json");
    assert_eq!(stored.relative_path, "evidence/automated/aws/mfa.json");
    assert_eq!(fs::read_to_string(&stored.path).expect("read"), json);
}

#[tokio::test]
async fn store_rejects_escaping_names() {
    let tmp = tempdir().expect("tempdir");
    let store = DocumentStore::new(tmp.path());

    let err = store
        .store_evidence(&artifact(
            EvidenceCategory::Manual,
            None,
            "../../outside.md",
            "x",
            ContentType::Markdown,
        ))
        .await
        .expect_err("filename escape");
    assert_eq!(err.code(), "validation_error");

    let err = store
        .store_evidence(&artifact(
            EvidenceCategory::Automated,
            Some(".."),
            "x.json",
            "{}",
            ContentType::Json,
        ))
        .await
        .expect_err("subcategory escape");
    assert_eq!(err.code(), "validation_error");
}

#[tokio::test]
async fn list_evidence_filters_by_category_and_control() {
    let tmp = tempdir().expect("tempdir");
    let store = DocumentStore::new(tmp.path());

    store
        .store_evidence(&artifact(
            EvidenceCategory::Manual,
            None,
            "review.md",
            "body",
            ContentType::Markdown,
        ))
        .await
        .expect("store");
    store
        .store_evidence(&EvidenceArtifact {
            control_ids: Some(vec!["CC8.1".to_string()]),
            ..artifact(
                EvidenceCategory::Reviews,
                Some("change"),
                "pr-sample.md",
                "body",
                ContentType::Markdown,
            )
        })
        .await
        .expect("store");
    store
        .store_evidence(&artifact(
            EvidenceCategory::Automated,
            None,
            "raw.json",
            "{}",
            ContentType::Json,
        ))
        .await
        .expect("store");

    let all = store.list_evidence(None, None).await.expect("list");
    let paths: Vec<&str> = all.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["evidence/manual/review.md", "evidence/reviews/change/pr-sample.md"]
    );

    let reviews = store
        .list_evidence(Some(EvidenceCategory::Reviews), None)
        .await
        .expect("list");
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].controls, vec!["CC8.1"]);
    assert_eq!(reviews[0].collected, Some(time::today()));

    let cc6 = store.list_evidence(None, Some("CC6.1")).await.expect("list");
    assert_eq!(cc6.len(), 1);
    assert_eq!(cc6[0].title, "review");

    let none = store
        .list_evidence(Some(EvidenceCategory::Policies), Some("CC6.1"))
        .await
        .expect("list");
    assert!(none.is_empty());
}

#[tokio::test]
async fn appended_row_lands_before_collection_summary() {
    let tmp = tempdir().expect("tempdir");
    fs::create_dir_all(tmp.path().join("evidence")).expect("mkdir");
    fs::write(tmp.path().join("evidence/manifest.md"), MANIFEST).expect("write");
    let store = DocumentStore::new(tmp.path());

    let row = EvidenceRow::today(
        "CC6.1",
        "automated/aws/mfa.json",
        "MCP: aws",
        EvidenceStatus::Collected,
    );
    store.append_evidence_row(&row).await.expect("append");

    let manifest = store.read_manifest().await.expect("read");
    let expected = format!(
        "| CC1.1 | policies/code-of-conduct.md | Manual | 2026-01-05 | ✅ |\n{}\n\n## Collection Summary",
        row.render()
    );
    assert!(manifest.content.contains(&expected), "{}", manifest.content);
    assert!(manifest.content.ends_with("Collected quarterly."));
    assert_eq!(manifest.metadata.owner.as_deref(), Some("security"));
    assert_eq!(manifest.metadata.last_updated, Some(time::today()));
}

#[tokio::test]
async fn missing_manifest_is_not_found_until_replaced() {
    let tmp = tempdir().expect("tempdir");
    let store = DocumentStore::new(tmp.path());

    let row = EvidenceRow::today("CC1.1", "a.md", "Manual", EvidenceStatus::Pending);
    let err = store.append_evidence_row(&row).await.expect_err("no manifest");
    assert!(matches!(err, ComplianceError::NotFound(_)));
    assert!(!store.manifest_path().exists());

    let metadata = store
        .replace_manifest("| Control | File |\n|---|---|")
        .await
        .expect("create");
    assert_eq!(metadata.id.as_deref(), Some("EV-MANIFEST"));
    assert_eq!(metadata.title.as_deref(), Some("Evidence Manifest"));

    store.append_evidence_row(&row).await.expect("append");
    let manifest = store.read_manifest().await.expect("read");
    assert!(manifest.content.ends_with(&row.render()));
}

#[tokio::test]
async fn replace_manifest_keeps_existing_metadata() {
    let tmp = tempdir().expect("tempdir");
    fs::create_dir_all(tmp.path().join("evidence")).expect("mkdir");
    fs::write(tmp.path().join("evidence/manifest.md"), MANIFEST).expect("write");
    let store = DocumentStore::new(tmp.path());

    let metadata = store.replace_manifest("Rebuilt ledger").await.expect("replace");
    assert_eq!(metadata.owner.as_deref(), Some("security"));
    assert_eq!(metadata.last_updated, Some(time::today()));

    let manifest = store.read_manifest().await.expect("read");
    assert_eq!(manifest.content, "Rebuilt ledger");
    assert_eq!(manifest.metadata, metadata);
}
