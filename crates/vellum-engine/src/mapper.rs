use std::collections::HashMap;

use serde_json::Value;
use vellum_store::OpOutput;
use vellum_types::{CanonicalId, Caller};

use crate::batch::ResultSlot;
use crate::error::{EngineError, EngineResult};
use crate::planner::{StepKind, TransactionPlan};
use crate::registry::TypeRegistry;

/// Formatted create and update results of one batch, keyed by the id the
/// caller sent and by the canonical id.
///
/// Filled while outputs are mapped; read-only to triggers afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrossReferenceMap(HashMap<String, Value>);

impl CrossReferenceMap {
    /// Look up by client id, placeholder or canonical id text.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_id(&self, id: CanonicalId) -> Option<&Value> {
        self.0.get(&id.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn insert(&mut self, key: String, value: Value) {
        self.0.insert(key, value);
    }
}

/// Re-align transaction outputs with the caller's batch order.
///
/// Returns one slot per input. Deletes of rows that did not exist at check
/// time stay [`ResultSlot::Unset`].
pub fn map_results(
    plan: &TransactionPlan,
    outputs: Vec<OpOutput>,
    batch_len: usize,
    registry: &TypeRegistry,
    caller: &Caller,
) -> EngineResult<(Vec<ResultSlot>, CrossReferenceMap)> {
    let mut outputs: Vec<Option<OpOutput>> = outputs.into_iter().map(Some).collect();
    let mut results = vec![ResultSlot::Unset; batch_len];
    let mut cross_references = CrossReferenceMap::default();

    for step in &plan.steps {
        let slot = results.get_mut(step.index).ok_or_else(|| {
            EngineError::internal(format!(
                "plan step for item {} outside batch of {batch_len}",
                step.index
            ))
        })?;

        *slot = match step.kind {
            StepKind::Write { op } => {
                let row = match outputs.get_mut(op).and_then(Option::take) {
                    Some(OpOutput::Row(row)) => row,
                    other => {
                        return Err(EngineError::internal(format!(
                            "operation {op} for item {} produced {other:?}",
                            step.index
                        )))
                    }
                };
                let descriptor = registry.get(&step.object_type)?;
                let formatted = descriptor.formatter.format(row, caller);
                if step.client_id != step.id.to_string() {
                    cross_references.insert(step.client_id.clone(), formatted.clone());
                }
                cross_references.insert(step.id.to_string(), formatted.clone());
                ResultSlot::Object(formatted)
            }
            StepKind::Skipped => ResultSlot::Skipped,
            StepKind::Delete { existed: true } => ResultSlot::Deleted(true),
            StepKind::Delete { existed: false } => ResultSlot::Unset,
        };
    }

    Ok((results, cross_references))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use vellum_types::{Action, ObjectType, Record};

    use super::*;
    use crate::hooks::OutputFormatter;
    use crate::planner::PlanStep;
    use crate::registry::ObjectTypeDescriptor;

    struct Wrapped;

    impl OutputFormatter for Wrapped {
        fn format(&self, row: Record, _caller: &Caller) -> Value {
            json!({"node": row})
        }
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register(
                ObjectTypeDescriptor::builder(ObjectType::new("Note").unwrap())
                    .formatter(Arc::new(Wrapped))
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn step(index: usize, action: Action, id: u64, client: &str, kind: StepKind) -> PlanStep {
        PlanStep {
            index,
            action,
            object_type: ObjectType::new("Note").unwrap(),
            id: CanonicalId::new(id).unwrap(),
            client_id: client.into(),
            kind,
        }
    }

    fn row(id: &str) -> OpOutput {
        OpOutput::Row(json!({"id": id}).as_object().cloned().unwrap())
    }

    #[test]
    fn slots_follow_batch_order() {
        // Plan order differs from batch order.
        let plan = TransactionPlan {
            ops: Vec::new(),
            steps: vec![
                step(3, Action::Create, 10, "tmp1", StepKind::Write { op: 0 }),
                step(0, Action::Update, 11, "11", StepKind::Write { op: 1 }),
                step(1, Action::Update, 12, "12", StepKind::Skipped),
                step(2, Action::Delete, 13, "13", StepKind::Delete { existed: true }),
                step(4, Action::Delete, 14, "14", StepKind::Delete { existed: false }),
            ],
            ..Default::default()
        };
        let outputs = vec![row("10"), row("11"), OpOutput::Deleted(1)];
        let (slots, xref) =
            map_results(&plan, outputs, 5, &registry(), &Caller::user("a")).unwrap();

        assert_eq!(slots[0], ResultSlot::Object(json!({"node": {"id": "11"}})));
        assert_eq!(slots[1], ResultSlot::Skipped);
        assert_eq!(slots[2], ResultSlot::Deleted(true));
        assert_eq!(slots[3], ResultSlot::Object(json!({"node": {"id": "10"}})));
        assert!(slots[4].is_unset());

        assert_eq!(xref.get("tmp1"), xref.get("10"));
        assert!(xref.get_id(CanonicalId::new(11).unwrap()).is_some());
        assert_eq!(xref.len(), 3);
    }

    #[test]
    fn mismatched_output_is_internal_error() {
        let plan = TransactionPlan {
            steps: vec![step(0, Action::Create, 10, "tmp1", StepKind::Write { op: 0 })],
            ..Default::default()
        };
        let result = map_results(&plan, vec![OpOutput::Deleted(0)], 1, &registry(), &Caller::user("a"));
        assert!(matches!(result, Err(EngineError::Internal(_))));
    }
}
