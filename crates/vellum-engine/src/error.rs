use std::fmt;

use serde::Serialize;
use vellum_guard::GuardError;
use vellum_store::StoreError;
use vellum_types::{CanonicalId, TypeError};

/// One field-level validation failure.
///
/// `path` is dotted from the batch root: `"1.title"`, `"0.tags[2]"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Prefix the path with a parent segment.
    pub fn nested(self, parent: &str) -> Self {
        let path = if self.path.is_empty() {
            parent.to_string()
        } else if self.path.starts_with('[') {
            format!("{parent}{}", self.path)
        } else {
            format!("{parent}.{}", self.path)
        };
        Self { path, ..self }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every field error collected for a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(pub Vec<FieldError>);

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// Errors from the mutation pipeline.
///
/// Everything except [`EngineError::Transaction`] is raised before the
/// store sees a write, so the batch leaves no trace.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Inputs failed schema validation or id checks.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("content rejected: {0}")]
    ContentRejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// No descriptor is registered for the tag.
    #[error("unknown object type: {0}")]
    UnknownType(String),

    #[error("batch of {len} items exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// The atomic commit failed; nothing was written.
    #[error("transaction failed for [{}] ids [{}]: {source}", .object_types.join(", "), join_ids(.ids))]
    Transaction {
        object_types: Vec<String>,
        ids: Vec<CanonicalId>,
        source: StoreError,
    },

    /// A pipeline invariant did not hold.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("guard error: {0}")]
    Guard(#[from] GuardError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("configuration error: {0}")]
    Config(String),
}

fn join_ids(ids: &[CanonicalId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    /// A single-field validation failure.
    pub fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors(vec![FieldError::new(path, message)]))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Field errors, when this is a validation failure.
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            Self::Validation(errors) => Some(&errors.0),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths() {
        let e = FieldError::new("title", "is required").nested("0");
        assert_eq!(e.path, "0.title");
        let e = FieldError::new("[2]", "expected a string").nested("tags");
        assert_eq!(e.path, "tags[2]");
        let e = FieldError::new("", "expected an object").nested("3");
        assert_eq!(e.path, "3");
    }

    #[test]
    fn transaction_error_lists_types_and_ids() {
        let err = EngineError::Transaction {
            object_types: vec!["Note".into(), "Tag".into()],
            ids: vec![CanonicalId::new(7).unwrap(), CanonicalId::new(9).unwrap()],
            source: StoreError::LockPoisoned,
        };
        let msg = err.to_string();
        assert!(msg.contains("Note, Tag"));
        assert!(msg.contains("7, 9"));
    }

    #[test]
    fn validation_display_joins_errors() {
        let err = EngineError::Validation(FieldErrors(vec![
            FieldError::new("0.title", "is required"),
            FieldError::new("1.id", "is required"),
        ]));
        assert_eq!(
            err.to_string(),
            "validation failed: 0.title: is required; 1.id: is required"
        );
        assert_eq!(err.field_errors().map(<[_]>::len), Some(2));
    }
}
