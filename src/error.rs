use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("OpenNeuro request failed: {0}")]
    OpenNeuroHttp(String),

    #[error("OpenNeuro returned status {status}: {message}")]
    OpenNeuroStatus { status: u16, message: String },

    #[error("DANDI request failed: {0}")]
    DandiHttp(String),

    #[error("DANDI returned status {status}: {message}")]
    DandiStatus { status: u16, message: String },

    #[error("search service request failed: {0}")]
    SearchHttp(String),

    #[error("search service returned status {status}: {message}")]
    SearchStatus { status: u16, message: String },

    #[error("malformed {registry} record {id}: {reason}")]
    MalformedRecord {
        registry: String,
        id: String,
        reason: String,
    },

    #[error("failed to parse cache file {path}: {message}")]
    CacheParse { path: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CatalogError {
    pub fn malformed(registry: &str, id: &str, reason: impl Into<String>) -> Self {
        CatalogError::MalformedRecord {
            registry: registry.to_string(),
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Remote-service failures, as opposed to local config or filesystem problems.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            CatalogError::OpenNeuroHttp(_)
                | CatalogError::OpenNeuroStatus { .. }
                | CatalogError::DandiHttp(_)
                | CatalogError::DandiStatus { .. }
                | CatalogError::SearchHttp(_)
                | CatalogError::SearchStatus { .. }
        )
    }
}
