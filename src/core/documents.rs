//! Document store operations: discovery, listing, read, create, update, and
//! status transitions.
//!
//! Every mutation is a full read-then-write of one file. There is no locking:
//! concurrent writers to the same path race and the last write wins.

use crate::core::error::ComplianceError;
use crate::core::frontmatter::{
    DocStatus, DocumentMetadata, ParsedDocument, parse_document, serialize_document,
};
use crate::core::store::{DOCUMENT_EXTENSION, DocumentStore, DocumentType, validate_filename};
use crate::core::time;
use serde::Serialize;
use serde_yaml::Mapping;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// One listed document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEntry {
    pub path: PathBuf,
    pub relative_path: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub metadata: DocumentMetadata,
}

/// Recursively collect `*.md` files under `dir`. A missing directory yields an
/// empty list; unreadable subdirectories and entries are skipped.
pub async fn find_markdown_files(dir: &Path) -> Result<Vec<PathBuf>, ComplianceError> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if current == dir && e.kind() == ErrorKind::NotFound => return Ok(out),
            Err(e) => {
                warn!(dir = %current.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %current.display(), error = %e, "stopping scan of unreadable directory");
                    break;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(DOCUMENT_EXTENSION)
            {
                out.push(path);
            }
        }
    }

    out.sort();
    Ok(out)
}

fn map_read_error(path: &Path, e: std::io::Error) -> ComplianceError {
    match e.kind() {
        ErrorKind::NotFound => {
            ComplianceError::NotFound(format!("Document not found: {}", path.display()))
        }
        ErrorKind::InvalidData => {
            ComplianceError::ParseError(format!("{}: not valid UTF-8", path.display()))
        }
        _ => ComplianceError::IoError(e),
    }
}

impl DocumentStore {
    /// List documents of one type, optionally keeping only an exact `status`.
    /// Unparsable files are skipped, never fatal.
    pub async fn list_documents(
        &self,
        doc_type: DocumentType,
        status_filter: Option<&str>,
    ) -> Result<Vec<DocumentEntry>, ComplianceError> {
        let dir = self.type_path(doc_type);
        let files = find_markdown_files(&dir).await?;
        let mut entries = Vec::with_capacity(files.len());

        for path in files {
            let doc = match self.read_document(&path).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable document");
                    continue;
                }
            };
            if let Some(wanted) = status_filter
                && doc.metadata.status.as_deref() != Some(wanted)
            {
                continue;
            }
            entries.push(DocumentEntry {
                relative_path: self.relative_path(&path),
                path,
                doc_type,
                metadata: doc.metadata,
            });
        }

        debug!(doc_type = %doc_type, count = entries.len(), "listed documents");
        Ok(entries)
    }

    pub async fn read_document(&self, path: &Path) -> Result<ParsedDocument, ComplianceError> {
        let full = self.resolve(path);
        let raw = fs::read_to_string(&full)
            .await
            .map_err(|e| map_read_error(&full, e))?;
        parse_document(&raw).map_err(|e| match e {
            ComplianceError::ParseError(msg) => {
                ComplianceError::ParseError(format!("{}: {}", full.display(), msg))
            }
            other => other,
        })
    }

    /// Create parent directories, then replace the file through a temp file
    /// and rename in the same directory.
    pub async fn write_document(
        &self,
        path: &Path,
        metadata: &DocumentMetadata,
        content: &str,
    ) -> Result<(), ComplianceError> {
        let full = self.resolve(path);
        let serialized = serialize_document(metadata, content)?;
        let parent = full.parent().ok_or_else(|| {
            ComplianceError::ValidationError(format!("No parent directory for {}", full.display()))
        })?;
        fs::create_dir_all(parent).await?;

        let file_name = full
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, time::new_event_id()));
        fs::write(&tmp, serialized.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, &full).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %full.display(), bytes = serialized.len(), "wrote document");
        Ok(())
    }

    /// Write a new document under its type directory, stamping `last_reviewed`.
    pub async fn create_document(
        &self,
        doc_type: DocumentType,
        filename: &str,
        metadata: DocumentMetadata,
        content: &str,
    ) -> Result<PathBuf, ComplianceError> {
        validate_filename(filename)?;
        let dir = self.type_path(doc_type);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);

        let metadata = DocumentMetadata {
            last_reviewed: Some(time::today()),
            ..metadata
        };
        self.write_document(&path, &metadata, content).await?;
        Ok(path)
    }

    /// Shallow-merge `patch` over the stored metadata, optionally replace the
    /// body, and stamp `last_updated`.
    pub async fn update_document(
        &self,
        path: &Path,
        patch: Option<&Mapping>,
        content: Option<&str>,
    ) -> Result<DocumentMetadata, ComplianceError> {
        let existing = self.read_document(path).await?;
        let mut metadata = match patch {
            Some(patch) => existing.metadata.merged(patch)?,
            None => existing.metadata,
        };
        metadata.last_updated = Some(time::today());
        let body = content.unwrap_or(&existing.content);
        self.write_document(path, &metadata, body).await?;
        Ok(metadata)
    }

    /// Move a document to `status`. Only a transition into `approved` stamps
    /// `last_reviewed`.
    pub async fn set_status(
        &self,
        path: &Path,
        status: DocStatus,
    ) -> Result<DocumentMetadata, ComplianceError> {
        let existing = self.read_document(path).await?;
        let today = time::today();
        let mut metadata = existing.metadata;
        metadata.status = Some(status.as_str().to_string());
        metadata.last_updated = Some(today.clone());
        if status == DocStatus::Approved {
            metadata.last_reviewed = Some(today);
        }
        self.write_document(path, &metadata, &existing.content).await?;
        Ok(metadata)
    }
}
