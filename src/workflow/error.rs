//! Workflow Error Types
//!
//! One variant per failure class so callers can branch on the condition
//! without parsing messages. Errors round-trip through the idempotency
//! cache, so duplicate callers see the original type and message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Workflow engine error taxonomy
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineError {
    // === Caller errors ===
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invariant '{invariant}' not met for state {state}")]
    PreconditionFailed { state: String, invariant: String },

    #[error("Illegal transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // === Concurrency ===
    #[error("Version conflict for aggregate {token}")]
    VersionConflict { token: String },

    #[error("Request already processing (fingerprint {fingerprint})")]
    AlreadyProcessing { fingerprint: String },

    // === Lookup ===
    #[error("Aggregate not found: {0}")]
    NotFound(String),

    // === System ===
    #[error("Side effect failed: {0}")]
    Effect(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Get the stable error code for API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION",
            EngineError::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::VersionConflict { .. } => "VERSION_CONFLICT",
            EngineError::AlreadyProcessing { .. } => "ALREADY_PROCESSING",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Effect(_) => "SIDE_EFFECT_FAILED",
            EngineError::Storage(_) => "STORAGE_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Validation(_) => 400,
            EngineError::PreconditionFailed { .. } | EngineError::InvalidTransition { .. } => 422,
            EngineError::VersionConflict { .. } | EngineError::AlreadyProcessing { .. } => 409,
            EngineError::NotFound(_) => 404,
            EngineError::Effect(_)
            | EngineError::Storage(_)
            | EngineError::Serialization(_) => 500,
        }
    }

    /// Whether a caller may retry the identical request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::AlreadyProcessing { .. }
                | EngineError::Storage(_)
                | EngineError::Effect(_)
        )
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::Validation("x".into()).code(), "VALIDATION");
        assert_eq!(
            EngineError::VersionConflict { token: "t".into() }.code(),
            "VERSION_CONFLICT"
        );
        assert_eq!(
            EngineError::AlreadyProcessing { fingerprint: "f".into() }.code(),
            "ALREADY_PROCESSING"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(EngineError::Validation("x".into()).http_status(), 400);
        assert_eq!(EngineError::NotFound("t".into()).http_status(), 404);
        assert_eq!(
            EngineError::VersionConflict { token: "t".into() }.http_status(),
            409
        );
        assert_eq!(EngineError::Storage("down".into()).http_status(), 500);
    }

    #[test]
    fn test_cache_roundtrip_preserves_type_and_message() {
        let err = EngineError::PreconditionFailed {
            state: "SUBMITTING".into(),
            invariant: "screening_passed".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        let back: EngineError = serde_json::from_value(json).unwrap();
        assert_eq!(err, back);
        assert_eq!(err.to_string(), back.to_string());
    }

    #[test]
    fn test_retryable() {
        assert!(EngineError::AlreadyProcessing { fingerprint: "f".into() }.is_retryable());
        assert!(!EngineError::Validation("x".into()).is_retryable());
    }
}
