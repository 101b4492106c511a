use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;
use vellum_types::{CanonicalId, Record};

use crate::error::{StoreError, StoreResult};
use crate::query::{
    compare_values, Filter, FindQuery, OpOutput, Projection, SimilarityQuery, SortDirection,
    StoreOp,
};
use crate::traits::RelationalStore;

#[derive(Clone, Default)]
struct Table {
    rows: BTreeMap<CanonicalId, Record>,
    embeddings: HashMap<CanonicalId, Vec<f32>>,
}

/// In-memory relational store.
///
/// Intended for tests, demos and embedding. Tables are created on first
/// write. A transaction runs against a copy of the whole state under the
/// write lock and replaces the live state only if every operation
/// succeeded, so a failed transaction leaves nothing behind.
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Seed one row outside any transaction.
    pub fn insert(&self, table: &str, id_field: &str, row: Record) -> StoreResult<CanonicalId> {
        let mut tables = self.write()?;
        let entry = tables.entry(table.to_string()).or_default();
        let id = row_id(table, id_field, &row)?;
        entry.rows.insert(id, row);
        Ok(id)
    }

    /// Read one row by id.
    pub fn get(&self, table: &str, id: CanonicalId) -> StoreResult<Option<Record>> {
        let tables = self.read()?;
        Ok(tables.get(table).and_then(|t| t.rows.get(&id)).cloned())
    }

    /// Number of rows in `table`.
    pub fn len(&self, table: &str) -> StoreResult<usize> {
        Ok(self.read()?.get(table).map_or(0, |t| t.rows.len()))
    }

    /// Returns `true` if no table holds any row.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read()?.values().all(|t| t.rows.is_empty()))
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, Table>>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, Table>>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn apply(tables: &mut HashMap<String, Table>, op: StoreOp) -> StoreResult<OpOutput> {
        match op {
            StoreOp::Create {
                table,
                id_field,
                data,
                select,
            } => {
                let id = row_id(&table, &id_field, &data)?;
                let entry = tables.entry(table.clone()).or_default();
                if entry.rows.contains_key(&id) {
                    return Err(StoreError::DuplicateKey { table, id });
                }
                let output = select.apply(&data);
                entry.rows.insert(id, data);
                Ok(OpOutput::Row(output))
            }
            StoreOp::Update {
                table,
                id_field,
                id,
                data,
                select,
            } => {
                let row = tables
                    .get_mut(&table)
                    .and_then(|t| t.rows.get_mut(&id))
                    .ok_or_else(|| StoreError::NotFound {
                        table: table.clone(),
                        id,
                    })?;
                for (key, value) in data {
                    if key != id_field {
                        row.insert(key, value);
                    }
                }
                Ok(OpOutput::Row(select.apply(row)))
            }
            StoreOp::DeleteMany { table, ids, .. } => {
                let Some(entry) = tables.get_mut(&table) else {
                    return Ok(OpOutput::Deleted(0));
                };
                let mut removed = 0;
                for id in ids {
                    if entry.rows.remove(&id).is_some() {
                        removed += 1;
                    }
                    entry.embeddings.remove(&id);
                }
                Ok(OpOutput::Deleted(removed))
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read().map(|t| t.len()).unwrap_or_default();
        f.debug_struct("InMemoryStore")
            .field("table_count", &tables)
            .finish()
    }
}

#[async_trait]
impl RelationalStore for InMemoryStore {
    async fn find_many(&self, query: &FindQuery) -> StoreResult<Vec<Record>> {
        let tables = self.read()?;
        let Some(table) = tables.get(&query.table) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<(&CanonicalId, &Record)> = table
            .rows
            .iter()
            .filter(|(_, row)| query.filter.as_ref().map_or(true, |f| f.matches(row)))
            .collect();

        let direction = query
            .order_by
            .as_ref()
            .map_or(SortDirection::Asc, |o| o.direction);
        rows.sort_by(|(a_id, a), (b_id, b)| {
            let primary = query.order_by.as_ref().map_or(Ordering::Equal, |o| {
                compare_values(
                    a.get(&o.field).unwrap_or(&Value::Null),
                    b.get(&o.field).unwrap_or(&Value::Null),
                )
            });
            let ord = primary.then_with(|| a_id.cmp(b_id));
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });

        let start = match query.cursor {
            Some(cursor) => match rows.iter().position(|(id, _)| **id == cursor) {
                Some(pos) => pos,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };

        let take = query.take.map_or(usize::MAX, |t| t as usize);
        Ok(rows
            .into_iter()
            .skip(start + query.skip as usize)
            .take(take)
            .map(|(_, row)| query.select.apply(row))
            .collect())
    }

    async fn find_by_ids(
        &self,
        table: &str,
        _id_field: &str,
        ids: &[CanonicalId],
        select: &Projection,
    ) -> StoreResult<Vec<Record>> {
        let tables = self.read()?;
        let Some(table) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| table.rows.get(id))
            .map(|row| select.apply(row))
            .collect())
    }

    async fn existing_ids(
        &self,
        table: &str,
        _id_field: &str,
        ids: &[CanonicalId],
    ) -> StoreResult<Vec<CanonicalId>> {
        let tables = self.read()?;
        let Some(table) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .copied()
            .filter(|id| table.rows.contains_key(id))
            .collect())
    }

    async fn count(&self, table: &str, filter: Option<&Filter>) -> StoreResult<u64> {
        let tables = self.read()?;
        Ok(tables.get(table).map_or(0, |t| {
            t.rows
                .values()
                .filter(|row| filter.map_or(true, |f| f.matches(row)))
                .count() as u64
        }))
    }

    async fn transaction(&self, ops: Vec<StoreOp>) -> StoreResult<Vec<OpOutput>> {
        let mut live = self.write()?;
        let mut staged = live.clone();
        let mut outputs = Vec::with_capacity(ops.len());
        for op in ops {
            outputs.push(Self::apply(&mut staged, op)?);
        }
        *live = staged;
        tracing::debug!(operations = outputs.len(), "in-memory transaction committed");
        Ok(outputs)
    }

    async fn rank_by_similarity(&self, query: &SimilarityQuery) -> StoreResult<Vec<CanonicalId>> {
        let tables = self.read()?;
        let Some(table) = tables.get(&query.table) else {
            return Ok(Vec::new());
        };

        let mut scored = Vec::new();
        for (id, embedding) in &table.embeddings {
            let Some(row) = table.rows.get(id) else {
                continue;
            };
            if !query.filter.as_ref().map_or(true, |f| f.matches(row)) {
                continue;
            }
            if embedding.len() != query.embedding.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: query.embedding.len(),
                    actual: embedding.len(),
                });
            }
            scored.push((cosine_distance(&query.embedding, embedding), *id));
        }

        scored.sort_by(|(da, ia), (db, ib)| {
            da.partial_cmp(db).unwrap_or(Ordering::Equal).then_with(|| ia.cmp(ib))
        });

        Ok(scored
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|(_, id)| id)
            .collect())
    }

    async fn upsert_embedding(
        &self,
        table: &str,
        id: CanonicalId,
        embedding: Vec<f32>,
    ) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables
            .entry(table.to_string())
            .or_default()
            .embeddings
            .insert(id, embedding);
        Ok(())
    }
}

fn row_id(table: &str, id_field: &str, row: &Record) -> StoreResult<CanonicalId> {
    row.get(id_field)
        .and_then(CanonicalId::from_value)
        .ok_or_else(|| StoreError::invalid(table, format!("missing or invalid id column '{id_field}'")))
}

/// `1 - cos(a, b)`; zero vectors are maximally distant.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 2.0;
    }
    1.0 - dot / (na * nb)
}
