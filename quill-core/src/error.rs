//! Error types for Quill domain operations

use thiserror::Error;

/// Domain-level failures raised by the permission, note and profile layers.
///
/// Cache failures never appear here: the cache layer degrades to a miss.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuillError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Database error: {reason}")]
    Database { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl QuillError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn database(reason: impl Into<String>) -> Self {
        Self::Database {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for Quill domain operations.
pub type QuillResult<T> = Result<T, QuillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuillError::not_found("Note", "abc");
        assert_eq!(err.to_string(), "Note abc not found");
        assert!(err.is_not_found());

        let err = QuillError::validation("title", "must not be empty");
        assert!(err.to_string().contains("title"));
        assert!(!err.is_not_found());
    }
}
