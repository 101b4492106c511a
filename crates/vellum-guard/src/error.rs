use std::fmt;

/// Errors that stop the guard chain without producing a decision.
///
/// A rejected batch is not an error: it is a [`GuardDecision::Rejected`]
/// in the report. These variants cover collaborators that failed to answer.
///
/// [`GuardDecision::Rejected`]: crate::chain::GuardDecision::Rejected
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// The authorization lookup service failed.
    #[error("authorization lookup failed: {0}")]
    Authorization(String),

    /// The content-moderation service failed.
    #[error("moderation service failed: {0}")]
    Moderation(String),

    /// The quota lookup failed.
    #[error("quota lookup failed: {0}")]
    Quota(String),

    /// A stage returned an unexpected error.
    #[error("stage error in '{stage}': {message}")]
    StageError { stage: String, message: String },

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GuardError {
    /// Create a stage error with a name and message.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageError {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl PartialEq for GuardError {
    fn eq(&self, other: &Self) -> bool {
        // Compare by display representation for test convenience.
        fmt::format(format_args!("{self}")) == fmt::format(format_args!("{other}"))
    }
}

impl Eq for GuardError {}

pub type GuardResult<T> = Result<T, GuardError>;
