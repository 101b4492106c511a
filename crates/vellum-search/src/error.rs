use vellum_engine::EngineError;
use vellum_store::StoreError;

/// Errors produced by the search pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The request is malformed or asks for something the type cannot do.
    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    /// The requested object does not exist or is not visible to the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller may not run this search.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The embedding provider failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Type registry lookup failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The store or cache failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SearchError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
