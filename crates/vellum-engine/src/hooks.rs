//! Per-type extension points.
//!
//! A descriptor plugs behaviour into the pipeline through four traits:
//! [`InputSchema`] (validate and cast), [`Shaper`] (turn input into a
//! persistence payload), [`TypeObserver`] (before-delete and post-commit
//! hooks) and [`OutputFormatter`] (turn a stored row into the external
//! shape). Each has a pass-through implementation.

use async_trait::async_trait;
use serde_json::Value;
use vellum_guard::AuthorizationMap;
use vellum_store::RelationalStore;
use vellum_types::{CanonicalId, Caller, ObjectType, Record};

use crate::error::{EngineResult, FieldError};
use crate::mapper::CrossReferenceMap;
use crate::resolver::PlaceholderMap;

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Everything of one type in the batch, handed to [`Shaper::pre_shape`].
pub struct PreShapeInput<'a> {
    pub object_type: &'a ObjectType,
    pub creates: Vec<&'a Record>,
    pub updates: Vec<&'a Record>,
    pub deletes: Vec<CanonicalId>,
    pub caller: &'a Caller,
    pub store: &'a dyn RelationalStore,
}

/// Context for shaping a single create or update.
///
/// Shaping happens while the plan is built, before anything commits, so no
/// cross-reference map exists yet. Sibling items are reachable through
/// `placeholders`; formatted results of the batch are first visible to
/// [`TypeObserver::after_mutations`] via [`MutationSummary`].
pub struct ShapeContext<'a> {
    pub object_type: &'a ObjectType,
    pub caller: &'a Caller,
    /// Caller-supplied data that is not part of any item.
    pub additional_data: &'a Value,
    pub placeholders: &'a PlaceholderMap,
    /// This type's entry in the pre-shape map.
    pub pre_shape: Option<&'a Value>,
    /// Set by seeding scripts; shapers may skip derived fields.
    pub seeding: bool,
}

/// Context for [`TypeObserver::before_deleted`].
pub struct DeletionContext<'a> {
    pub object_type: &'a ObjectType,
    /// Ids the batch asked to delete, deduplicated. Some may already be gone.
    pub requested: &'a [CanonicalId],
    pub caller: &'a Caller,
    pub pre_shape: Option<&'a Value>,
    pub authorization: &'a AuthorizationMap,
    pub store: &'a dyn RelationalStore,
}

/// What one committed batch did to one type.
pub struct MutationSummary<'a> {
    pub object_type: &'a ObjectType,
    pub created: &'a [CanonicalId],
    pub updated: &'a [CanonicalId],
    pub deleted: &'a [CanonicalId],
    pub pre_shape: Option<&'a Value>,
    /// Formatted results of every create and update in the batch.
    pub cross_references: &'a CrossReferenceMap,
    /// Whatever [`TypeObserver::before_deleted`] returned.
    pub before_delete: Option<&'a Value>,
    pub caller: &'a Caller,
    pub store: &'a dyn RelationalStore,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Validates and casts one input for one (type, action) pair.
///
/// The id field is stripped before validation and restored afterwards, so a
/// schema only describes data fields.
pub trait InputSchema: Send + Sync {
    fn validate(&self, input: &Record) -> Result<Record, Vec<FieldError>>;
}

/// Schema that accepts any object unchanged.
pub struct AcceptAll;

impl InputSchema for AcceptAll {
    fn validate(&self, input: &Record) -> Result<Record, Vec<FieldError>> {
        Ok(input.clone())
    }
}

/// Turns validated input into the payload written to the store.
#[async_trait]
pub trait Shaper: Send + Sync {
    /// Compute per-type context once per batch, before any item is shaped.
    async fn pre_shape(&self, _input: &PreShapeInput<'_>) -> EngineResult<Value> {
        Ok(Value::Null)
    }

    fn shape_create(&self, input: Record, _ctx: &ShapeContext<'_>) -> EngineResult<Record> {
        Ok(input)
    }

    /// `input` excludes the id field. Returning an empty record skips the
    /// update.
    fn shape_update(&self, input: Record, _ctx: &ShapeContext<'_>) -> EngineResult<Record> {
        Ok(input)
    }
}

/// Shaper that writes input as-is.
pub struct PassThroughShaper;

impl Shaper for PassThroughShaper {}

/// Hooks around deletes and after commit.
#[async_trait]
pub trait TypeObserver: Send + Sync {
    /// Runs while planning, before existence is checked. The returned value
    /// reaches [`after_mutations`](Self::after_mutations) as `before_delete`.
    async fn before_deleted(&self, _ctx: &DeletionContext<'_>) -> EngineResult<Value> {
        Ok(Value::Null)
    }

    /// Runs once per touched type after the batch has committed. Failures
    /// are reported; the commit stands.
    async fn after_mutations(&self, summary: &MutationSummary<'_>) -> EngineResult<()>;
}

/// Converts a stored row into the shape returned to callers.
pub trait OutputFormatter: Send + Sync {
    fn format(&self, row: Record, caller: &Caller) -> Value;
}

/// Formatter returning the row as a JSON object.
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format(&self, row: Record, _caller: &Caller) -> Value {
        Value::Object(row)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accept_all_is_identity() {
        let input = json!({"title": "x", "n": 1}).as_object().cloned().unwrap();
        assert_eq!(AcceptAll.validate(&input).unwrap(), input);
    }

    #[test]
    fn pass_through_shaper_keeps_input() {
        let object_type = ObjectType::new("Note").unwrap();
        let caller = Caller::user("alice");
        let placeholders = PlaceholderMap::default();
        let ctx = ShapeContext {
            object_type: &object_type,
            caller: &caller,
            additional_data: &Value::Null,
            placeholders: &placeholders,
            pre_shape: None,
            seeding: false,
        };
        let input = json!({"title": "x"}).as_object().cloned().unwrap();
        assert_eq!(
            PassThroughShaper.shape_create(input.clone(), &ctx).unwrap(),
            input
        );
    }

    #[test]
    fn json_formatter_wraps_row() {
        let row = json!({"id": "1"}).as_object().cloned().unwrap();
        assert_eq!(
            JsonFormatter.format(row, &Caller::anonymous()),
            json!({"id": "1"})
        );
    }
}
