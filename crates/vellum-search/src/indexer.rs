use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use vellum_engine::{EngineError, EngineResult, MutationSummary, TypeObserver};
use vellum_store::Projection;
use vellum_types::{CanonicalId, Record};

use crate::embedding::EmbeddingProvider;

/// Keeps a type's stored embeddings in step with its rows.
///
/// Register it as the type's observer: after every committed batch it
/// re-embeds the text fields of created and updated rows. Deleted rows lose
/// their embedding with the row.
pub struct EmbeddingIndexer {
    provider: Arc<dyn EmbeddingProvider>,
    table: String,
    id_field: String,
    text_fields: Vec<String>,
}

impl EmbeddingIndexer {
    pub fn new<I, S>(
        provider: Arc<dyn EmbeddingProvider>,
        table: impl Into<String>,
        id_field: impl Into<String>,
        text_fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            provider,
            table: table.into(),
            id_field: id_field.into(),
            text_fields: text_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// The text embedded for one row: every text field that holds a string
    /// or an array of strings, joined by newlines.
    pub fn document(&self, row: &Record) -> String {
        let mut parts = Vec::new();
        for field in &self.text_fields {
            match row.get(field) {
                Some(Value::String(s)) => parts.push(s.as_str()),
                Some(Value::Array(values)) => parts.extend(values.iter().filter_map(Value::as_str)),
                _ => {}
            }
        }
        parts.join("\n")
    }
}

#[async_trait]
impl TypeObserver for EmbeddingIndexer {
    async fn after_mutations(&self, summary: &MutationSummary<'_>) -> EngineResult<()> {
        let ids: Vec<CanonicalId> = summary
            .created
            .iter()
            .chain(summary.updated)
            .copied()
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let select = Projection::fields(
            std::iter::once(self.id_field.clone()).chain(self.text_fields.iter().cloned()),
        );
        let rows = summary
            .store
            .find_by_ids(&self.table, &self.id_field, &ids, &select)
            .await?;

        for row in &rows {
            let Some(id) = row.get(&self.id_field).and_then(CanonicalId::from_value) else {
                continue;
            };
            let embedding = self
                .provider
                .embed(&self.document(row))
                .await
                .map_err(|e| EngineError::internal(e.to_string()))?;
            summary.store.upsert_embedding(&self.table, id, embedding).await?;
        }

        tracing::debug!(
            object_type = %summary.object_type,
            indexed = rows.len(),
            "embeddings refreshed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::embedding::HashEmbedder;

    #[test]
    fn document_joins_text_fields() {
        let indexer = EmbeddingIndexer::new(
            Arc::new(HashEmbedder::default()),
            "notes",
            "id",
            ["title", "body", "tags"],
        );
        let row = json!({"id": "1", "title": "Rust", "body": 3, "tags": ["async", 1, "io"]});
        assert_eq!(indexer.document(row.as_object().unwrap()), "Rust\nasync\nio");
    }
}
