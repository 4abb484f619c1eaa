//! Service error taxonomy.

use crate::deps::MissingDependency;
use thiserror::Error;

/// Errors surfaced by the generation and asset services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Prerequisites are missing. Carries the full structured report so
    /// callers can render every missing item with its resolution hint.
    #[error("Missing dependencies: {}", summarize(.0))]
    Dependency(Vec<MissingDependency>),

    #[error("Asset already exists at {path}; pass overwrite to regenerate")]
    AssetExists { path: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Generation backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<gemini::Error> for ServiceError {
    fn from(err: gemini::Error) -> Self {
        ServiceError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Store(err.to_string())
    }
}

fn summarize(deps: &[MissingDependency]) -> String {
    deps.iter()
        .map(|d| d.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
