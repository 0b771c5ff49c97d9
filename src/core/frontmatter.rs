//! Metadata codec for compliance documents.
//!
//! On disk a document is UTF-8 markdown with an optional YAML header:
//!
//! ```text
//! ---
//! id: POL-001
//! title: Access Control
//! status: draft
//! tsc_criteria:
//!   - CC5.1
//! ---
//!
//! # Access Control
//! ```
//!
//! The header maps to [`DocumentMetadata`]: a handful of recognized fields plus
//! an open extension map, so ad-hoc keys (`assessment_date`, `collected_date`,
//! agent registry fields) survive a read-modify-write untouched.

use crate::core::error::ComplianceError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const HEADER_MARKER: &str = "---";

/// Lifecycle status of a controlled document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Draft,
    Review,
    Approved,
    Expired,
}

impl DocStatus {
    pub const ALL: [DocStatus; 4] = [
        DocStatus::Draft,
        DocStatus::Review,
        DocStatus::Approved,
        DocStatus::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocStatus::Draft => "draft",
            DocStatus::Review => "review",
            DocStatus::Approved => "approved",
            DocStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocStatus {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ComplianceError::ValidationError(format!(
                    "Unknown status '{}'. Expected one of: draft, review, approved, expired",
                    s
                ))
            })
    }
}

/// Parsed document header.
///
/// `status` is held as a string: directories such as `agents/` use their own
/// vocabulary (`active`, `decommissioned`). [`DocumentMetadata::doc_status`]
/// gives the typed lifecycle view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_list")]
    pub tsc_criteria: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub last_reviewed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub next_review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub last_updated: Option<String>,
    /// Every key not recognized above, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self == &DocumentMetadata::default()
    }

    pub fn doc_status(&self) -> Option<DocStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    /// Extension field as a string, if it is a scalar.
    pub fn extra_str(&self, key: &str) -> Option<String> {
        self.extra.get(key).and_then(scalar_to_string)
    }

    pub fn to_mapping(&self) -> Result<Mapping, ComplianceError> {
        match serde_yaml::to_value(self)? {
            Value::Mapping(map) => Ok(map),
            _ => Ok(Mapping::new()),
        }
    }

    pub fn from_mapping(map: Mapping) -> Result<Self, ComplianceError> {
        serde_yaml::from_value(Value::Mapping(map))
            .map_err(|e| ComplianceError::ParseError(format!("invalid metadata: {}", e)))
    }

    /// Shallow merge: every key in `patch` replaces the existing value; keys
    /// absent from `patch` are left untouched.
    pub fn merged(&self, patch: &Mapping) -> Result<Self, ComplianceError> {
        let mut base = self.to_mapping()?;
        for (key, value) in patch {
            base.insert(key.clone(), value.clone());
        }
        serde_yaml::from_value(Value::Mapping(base))
            .map_err(|e| ComplianceError::ValidationError(format!("invalid metadata patch: {}", e)))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom("expected a scalar value")),
    }
}

fn scalar_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| D::Error::custom("expected a list of scalars"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(D::Error::custom("expected a list")),
    }
}

/// A document as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub metadata: DocumentMetadata,
    /// Body with leading/trailing whitespace trimmed.
    pub content: String,
    /// Full original text.
    pub raw: String,
}

/// Split `raw` into (header, body) when it opens with a `---` line.
fn split_header(raw: &str) -> Result<Option<(&str, &str)>, ComplianceError> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(None);
    };
    if first.trim_end() != HEADER_MARKER {
        return Ok(None);
    }

    let header_start = first.len();
    let mut offset = header_start;
    for line in lines {
        if line.trim_end() == HEADER_MARKER {
            let header = &text[header_start..offset];
            let body = &text[offset + line.len()..];
            return Ok(Some((header, body)));
        }
        offset += line.len();
    }
    Err(ComplianceError::ParseError(
        "metadata header opened with '---' but never closed".to_string(),
    ))
}

fn parse_header(header: &str) -> Result<DocumentMetadata, ComplianceError> {
    if header.trim().is_empty() {
        return Ok(DocumentMetadata::default());
    }
    let value: Value = serde_yaml::from_str(header)
        .map_err(|e| ComplianceError::ParseError(format!("malformed metadata header: {}", e)))?;
    match value {
        Value::Null => Ok(DocumentMetadata::default()),
        Value::Mapping(map) => DocumentMetadata::from_mapping(map),
        _ => Err(ComplianceError::ParseError(
            "metadata header must be a key/value mapping".to_string(),
        )),
    }
}

pub fn parse_document(raw: &str) -> Result<ParsedDocument, ComplianceError> {
    let (metadata, body) = match split_header(raw)? {
        Some((header, body)) => (parse_header(header)?, body),
        None => (DocumentMetadata::default(), raw),
    };
    Ok(ParsedDocument {
        metadata,
        content: body.trim().to_string(),
        raw: raw.to_string(),
    })
}

/// Render header + body. The body is separated from the closing marker by one
/// blank line and ends with a single newline.
pub fn serialize_document(
    metadata: &DocumentMetadata,
    content: &str,
) -> Result<String, ComplianceError> {
    let header = if metadata.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(metadata)?
    };
    Ok(format!(
        "{marker}\n{header}{marker}\n\n{body}\n",
        marker = HEADER_MARKER,
        header = header,
        body = content.trim()
    ))
}
