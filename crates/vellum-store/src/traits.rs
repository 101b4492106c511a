use async_trait::async_trait;
use vellum_types::{CanonicalId, Record};

use crate::error::StoreResult;
use crate::query::{Filter, FindQuery, OpOutput, Projection, SimilarityQuery, StoreOp};

/// Relational store consumed by the engine.
///
/// All implementations must satisfy these invariants:
/// - [`transaction`](Self::transaction) is atomic: on `Err`, none of the
///   operations is observable; on `Ok`, all of them are, and the outputs are
///   returned one per operation, in operation order.
/// - Reads are advisory. A row reported as existing may be gone by the time
///   a later transaction commits.
/// - Similarity ranking returns ids nearest-first and honours `offset` and
///   `limit` after filtering.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Ordered, filtered, cursor-bounded read.
    async fn find_many(&self, query: &FindQuery) -> StoreResult<Vec<Record>>;

    /// Fetch rows by id. Missing ids are skipped; order is unspecified.
    async fn find_by_ids(
        &self,
        table: &str,
        id_field: &str,
        ids: &[CanonicalId],
        select: &Projection,
    ) -> StoreResult<Vec<Record>>;

    /// The subset of `ids` that currently exist, in request order.
    async fn existing_ids(
        &self,
        table: &str,
        id_field: &str,
        ids: &[CanonicalId],
    ) -> StoreResult<Vec<CanonicalId>>;

    /// Count rows matching `filter` (all rows when `None`).
    async fn count(&self, table: &str, filter: Option<&Filter>) -> StoreResult<u64>;

    /// Apply every operation atomically.
    async fn transaction(&self, ops: Vec<StoreOp>) -> StoreResult<Vec<OpOutput>>;

    /// Rank rows by distance between their stored embedding and the query
    /// vector.
    async fn rank_by_similarity(&self, query: &SimilarityQuery) -> StoreResult<Vec<CanonicalId>>;

    /// Store or replace the embedding for one row.
    async fn upsert_embedding(
        &self,
        table: &str,
        id: CanonicalId,
        embedding: Vec<f32>,
    ) -> StoreResult<()>;
}
