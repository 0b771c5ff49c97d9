//! Store handle for the compliance document tree.
//!
//! The filesystem subtree under `root` is the only store: one top-level
//! directory per [`DocumentType`], arbitrary nesting beneath each, and the
//! evidence ledger at `evidence/manifest.md`. The handle itself holds nothing
//! but the root path; every read goes back to disk.

use crate::core::config::ComplianceConfig;
use crate::core::error::ComplianceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

pub const DOCUMENT_EXTENSION: &str = "md";
pub const MANIFEST_RELATIVE_PATH: &str = "evidence/manifest.md";

/// Document category; routes to a directory and is never stored in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Controls,
    Policies,
    Evidence,
    Gaps,
    Assessments,
    Inventory,
    Config,
    Agents,
}

impl DocumentType {
    pub const ALL: [DocumentType; 8] = [
        DocumentType::Controls,
        DocumentType::Policies,
        DocumentType::Evidence,
        DocumentType::Gaps,
        DocumentType::Assessments,
        DocumentType::Inventory,
        DocumentType::Config,
        DocumentType::Agents,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Controls => "controls",
            DocumentType::Policies => "policies",
            DocumentType::Evidence => "evidence",
            DocumentType::Gaps => "gaps",
            DocumentType::Assessments => "assessments",
            DocumentType::Inventory => "inventory",
            DocumentType::Config => "config",
            DocumentType::Agents => "agents",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ComplianceError::ValidationError(format!("Unknown document type '{}'", s)))
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    /// Compliance root; one subdirectory per document type.
    pub root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &ComplianceConfig) -> Self {
        Self::new(config.root.clone())
    }

    pub fn type_path(&self, doc_type: DocumentType) -> PathBuf {
        self.root.join(doc_type.as_str())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_RELATIVE_PATH)
    }

    /// Resolve a caller-supplied path. Absolute paths are used as-is; relative
    /// paths are joined onto the root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Resolve a root-relative path coming from an untrusted caller; rejects
    /// absolute paths and any `..` component.
    pub fn resolve_relative(&self, rel: &str) -> Result<PathBuf, ComplianceError> {
        let path = Path::new(rel);
        if rel.trim().is_empty() {
            return Err(ComplianceError::ValidationError("path must not be empty".to_string()));
        }
        let escapes = path.components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if escapes {
            return Err(ComplianceError::ValidationError(format!(
                "Path must stay within the compliance root: {}",
                rel
            )));
        }
        Ok(self.root.join(path))
    }

    /// Root-relative form of `path`, `/`-separated.
    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Validate a bare file name (no directory parts).
pub fn validate_filename(filename: &str) -> Result<(), ComplianceError> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ComplianceError::ValidationError(format!(
            "Invalid filename '{}': must be a single path segment",
            filename
        ))),
    }
}
