use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl ComplianceError {
    /// Stable machine-readable code surfaced at the tool boundary.
    pub fn code(&self) -> &'static str {
        match self {
            ComplianceError::IoError(_) => "io_error",
            ComplianceError::ParseError(_) | ComplianceError::YamlError(_) => "parse_error",
            ComplianceError::NotFound(_) => "not_found",
            ComplianceError::ValidationError(_) | ComplianceError::JsonError(_) => {
                "validation_error"
            }
            ComplianceError::ConfigError(_) => "config_error",
        }
    }
}
