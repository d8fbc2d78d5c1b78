//! Error types for the auditor

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Malformed payload: {kind} record is missing {field}")]
    MalformedPayload { kind: String, field: &'static str },

    #[error("Invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Configuration error in {path}: {reason}")]
    ConfigError { path: String, reason: String },

    #[error("Inventory unavailable for {region}/{kind}: {reason}")]
    InventoryError {
        region: String,
        kind: String,
        reason: String,
    },

    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl AuditError {
    pub fn malformed(kind: impl Into<String>, field: &'static str) -> Self {
        Self::MalformedPayload {
            kind: kind.into(),
            field,
        }
    }
}
