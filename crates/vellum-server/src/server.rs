use std::sync::Arc;

use tokio::net::TcpListener;
use vellum_engine::{MutationEngine, TypeRegistry};
use vellum_search::{EmbeddingProvider, SearchEngine};
use vellum_store::{CacheStore, RelationalStore};

use crate::auth::{IdentityProvider, TrustedHeaders};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Vellum HTTP server.
pub struct VellumServer {
    config: ServerConfig,
    state: AppState,
}

impl VellumServer {
    /// Wire both pipelines over one store. Identity comes from the trusted
    /// headers.
    pub fn new(
        config: ServerConfig,
        registry: Arc<TypeRegistry>,
        store: Arc<dyn RelationalStore>,
        cache: Arc<dyn CacheStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> ServerResult<Self> {
        let engine = MutationEngine::builder(registry.clone(), store.clone())
            .config(config.engine.clone())
            .build()?;
        let search = SearchEngine::builder(registry, store)
            .embedder(embedder)
            .cache(cache)
            .config(config.search.clone())
            .build()?;
        let identity: Arc<dyn IdentityProvider> = Arc::new(TrustedHeaders);
        let state = AppState {
            engine: Arc::new(engine),
            search: Arc::new(search),
            identity,
            allow_anonymous_read: config.allow_anonymous_read,
        };
        Ok(Self { config, state })
    }

    /// Replace the identity provider.
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.state.identity = identity;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), self.config.max_body_bytes)
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            object_types = self.state.engine.registry().len(),
            "vellum server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
