use vellum_store::{OpOutput, RelationalStore};

use crate::error::{EngineError, EngineResult};
use crate::planner::TransactionPlan;

/// Submit the plan as one atomic transaction.
///
/// A store failure is wrapped with the tables and ids the plan touched. An
/// empty plan commits nothing and never reaches the store.
pub async fn execute(
    store: &dyn RelationalStore,
    plan: &TransactionPlan,
) -> EngineResult<Vec<OpOutput>> {
    if plan.is_empty() {
        return Ok(Vec::new());
    }

    let outputs = match store.transaction(plan.ops.clone()).await {
        Ok(outputs) => outputs,
        Err(source) => {
            let (object_types, ids) = plan.affected();
            tracing::warn!(
                tables = ?object_types,
                operations = plan.ops.len(),
                error = %source,
                "transaction failed, batch aborted"
            );
            return Err(EngineError::Transaction {
                object_types,
                ids,
                source,
            });
        }
    };

    if outputs.len() != plan.ops.len() {
        return Err(EngineError::internal(format!(
            "store returned {} outputs for {} operations",
            outputs.len(),
            plan.ops.len()
        )));
    }
    tracing::debug!(operations = outputs.len(), "transaction committed");
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vellum_store::{InMemoryStore, Projection, StoreOp};
    use vellum_types::{Action, CanonicalId, ObjectType};

    use super::*;
    use crate::planner::{PlanStep, StepKind};

    fn create(id: &str) -> StoreOp {
        StoreOp::Create {
            table: "notes".into(),
            id_field: "id".into(),
            data: json!({"id": id}).as_object().cloned().unwrap(),
            select: Projection::all(),
        }
    }

    #[tokio::test]
    async fn empty_plan_is_a_no_op() {
        let store = InMemoryStore::new();
        let outputs = execute(&store, &TransactionPlan::default()).await.unwrap();
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn failure_is_wrapped_and_nothing_persists() {
        let store = InMemoryStore::new();
        let note = ObjectType::new("Note").unwrap();
        let step = |id: u64, op: usize| PlanStep {
            index: op,
            action: Action::Create,
            object_type: note.clone(),
            id: CanonicalId::new(id).unwrap(),
            client_id: id.to_string(),
            kind: StepKind::Write { op },
        };
        let plan = TransactionPlan {
            steps: vec![step(1, 0), step(2, 1)],
            ops: vec![
                create("1"),
                create("2"),
                StoreOp::Update {
                    table: "notes".into(),
                    id_field: "id".into(),
                    id: CanonicalId::new(99).unwrap(),
                    data: json!({"title": "x"}).as_object().cloned().unwrap(),
                    select: Projection::all(),
                },
            ],
            ..Default::default()
        };
        let err = execute(&store, &plan).await.unwrap_err();
        match err {
            EngineError::Transaction { object_types, ids, .. } => {
                assert_eq!(object_types, vec!["Note".to_string()]);
                assert_eq!(ids.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.len("notes").unwrap(), 0);
    }
}
