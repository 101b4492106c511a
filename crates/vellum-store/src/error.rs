use vellum_types::CanonicalId;

/// Errors from relational store and cache operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The row addressed by an update does not exist.
    #[error("row not found: {table}/{id}")]
    NotFound { table: String, id: CanonicalId },

    /// A create collided with an existing row.
    #[error("duplicate key: {table}/{id}")]
    DuplicateKey { table: String, id: CanonicalId },

    /// The operation is malformed (missing id column, bad payload, ...).
    #[error("invalid operation on {table}: {reason}")]
    InvalidOperation { table: String, reason: String },

    /// Embedding dimensions do not match the query vector.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding backend state was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Error reported by the underlying backend.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn invalid(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
