//! Error types for Earbot
//!
//! Centralized error handling using thiserror. Validation and eligibility
//! errors are business conditions that handlers turn into comments; the rest
//! abort the invocation.

use thiserror::Error;

/// All error types that can occur in Earbot
#[derive(Debug, Error)]
pub enum EarbotError {
    /// Malformed or missing request field
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Nobody on the roster passed the eligibility filters
    #[error("No eligible candidates ({filters})")]
    NoEligibleCandidates { filters: String },

    /// Roster, ledger or request-state resource missing or unreadable
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Roster changed on disk since it was loaded
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// Remote request-object call failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Document extraction or report rendering failed
    #[error("Document error: {0}")]
    Document(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EarbotError {
    /// Expected business conditions, reported on the request and not fatal
    pub fn is_business(&self) -> bool {
        matches!(self, EarbotError::Validation(_) | EarbotError::NoEligibleCandidates { .. })
    }
}

impl From<reqwest::Error> for EarbotError {
    fn from(err: reqwest::Error) -> Self {
        EarbotError::Collaborator(err.to_string())
    }
}

/// Result type alias for Earbot operations
pub type Result<T> = std::result::Result<T, EarbotError>;
