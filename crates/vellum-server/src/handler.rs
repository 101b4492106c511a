use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vellum_engine::{BatchOutcome, MutationEngine, MutationItem, MutationOptions};
use vellum_search::{Connection, SearchEngine, SearchRequest};
use vellum_types::{CanonicalId, Caller, ObjectType};

use crate::auth::{Credentials, IdentityProvider};
use crate::error::{ServerError, ServerResult};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MutationEngine>,
    pub search: Arc<SearchEngine>,
    pub identity: Arc<dyn IdentityProvider>,
    pub allow_anonymous_read: bool,
}

impl AppState {
    async fn caller(&self, headers: &HeaderMap) -> ServerResult<Caller> {
        let credentials = Credentials::from_headers(headers)?;
        self.identity.authenticate(&credentials).await
    }

    async fn reader(&self, headers: &HeaderMap) -> ServerResult<Caller> {
        let caller = self.caller(headers).await?;
        if caller.is_anonymous() && !self.allow_anonymous_read {
            return Err(ServerError::AuthFailed("anonymous reads are disabled".into()));
        }
        Ok(caller)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub object_types: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MutateRequest {
    pub batch: Vec<MutationItem>,
    #[serde(default)]
    pub options: MutationOptions,
}

/// Health check handler.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        object_types: state.engine.registry().len(),
    })
}

/// `POST /v1/mutate`: one atomic batch.
pub async fn mutate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MutateRequest>,
) -> ServerResult<Json<BatchOutcome>> {
    let caller = state.caller(&headers).await?;
    tracing::debug!(
        user = caller.log_name(),
        batch_len = request.batch.len(),
        "mutation request"
    );
    let outcome = state
        .engine
        .perform_batch_mutation(request.batch, &caller, request.options)
        .await?;
    Ok(Json(outcome))
}

/// `POST /v1/search`: one page.
pub async fn search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> ServerResult<Json<Connection>> {
    let caller = state.reader(&headers).await?;
    Ok(Json(state.search.search(&request, &caller).await?))
}

/// `GET /v1/objects/:object_type/:id`
pub async fn find_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((object_type, id)): Path<(String, String)>,
) -> ServerResult<Json<Value>> {
    let caller = state.reader(&headers).await?;
    let object_type = ObjectType::new(object_type)
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let id = CanonicalId::parse(&id).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    Ok(Json(state.search.find_one(&object_type, id, &caller).await?))
}
