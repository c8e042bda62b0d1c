//! Error types for the mapping engine.

use axum::http::StatusCode;
use thiserror::Error;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors that can occur while routing, validating, or applying a message.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The message does not satisfy the schema of its kind.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An attached file or image is not in an accepted format.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Embedded markup was rejected by the sanitizer.
    #[error("file contains forbidden content: {0}")]
    ForbiddenContent(String),

    /// Replicas for a logical domain could not be discovered.
    #[error("could not resolve replicas for domain '{domain}': {reason}")]
    DomainResolution { domain: String, reason: String },

    /// Every replica rejected the alias call.
    #[error("all {attempts} replica(s) failed")]
    AllReplicasFailed { attempts: usize },

    /// Alias cleanup failed so the content was left in place.
    #[error("not able to ensure data consistency on server: {0}")]
    Consistency(String),

    /// The content or record store rejected a write.
    #[error("storage write failed: {0}")]
    StorageWrite(String),

    /// No registered rule accepts the message.
    #[error("no mapping registered for {message_type}/{action}")]
    NoMatchingHandler {
        message_type: String,
        action: String,
    },

    /// The persisted version changed underneath an increment.
    #[error("version conflict on {table}/{pk}: expected {expected}")]
    VersionConflict {
        table: String,
        pk: String,
        expected: u64,
    },

    /// The message kind is recognised but not enabled.
    #[error("{0} messages are restricted")]
    Restricted(String),

    /// The entity a message refers to does not exist.
    #[error("{0} not found")]
    EntityNotFound(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MappingError {
    /// Stable machine-readable code, reported back to message senders.
    pub fn code(&self) -> &'static str {
        match self {
            MappingError::Validation(_) => "SCHEMA_VIOLATION",
            MappingError::UnsupportedFormat(_) => "UNSUPPORTED_FILE_FORMAT",
            MappingError::ForbiddenContent(_) => "FILE_CONTAINS_FORBIDDEN_TAGS",
            MappingError::DomainResolution { .. } => "DOMAIN_RESOLUTION_FAILED",
            MappingError::AllReplicasFailed { .. } => "ALL_REPLICAS_FAILED",
            MappingError::Consistency(_) => "NOT_ABLE_TO_ENSURE_DATA_CONSISTENCY_ON_SERVER",
            MappingError::StorageWrite(_) => "WRITING_FILE_FAILED",
            MappingError::NoMatchingHandler { .. } => "NO_MATCHING_MAPPING",
            MappingError::VersionConflict { .. } => "VERSION_CONFLICT",
            MappingError::Restricted(_) => "MVP1_RESTRICTED",
            MappingError::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            MappingError::Serialization(_) => "SERIALIZATION_FAILED",
        }
    }

    /// HTTP status reported by the message endpoint.
    pub fn status(&self) -> StatusCode {
        match self {
            MappingError::Validation(_) | MappingError::Serialization(_) => StatusCode::BAD_REQUEST,
            MappingError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            MappingError::ForbiddenContent(_) | MappingError::Restricted(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            MappingError::NoMatchingHandler { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            MappingError::EntityNotFound(_) => StatusCode::NOT_FOUND,
            MappingError::VersionConflict { .. } => StatusCode::CONFLICT,
            MappingError::DomainResolution { .. }
            | MappingError::AllReplicasFailed { .. }
            | MappingError::Consistency(_) => StatusCode::BAD_GATEWAY,
            MappingError::StorageWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors raised before any store mutation happened.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MappingError::Validation(_)
                | MappingError::UnsupportedFormat(_)
                | MappingError::ForbiddenContent(_)
                | MappingError::Restricted(_)
        )
    }
}
