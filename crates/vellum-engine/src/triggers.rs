use vellum_store::RelationalStore;
use vellum_types::{Action, CanonicalId, Caller};

use crate::batch::TriggerFailure;
use crate::context::MutationContext;
use crate::hooks::MutationSummary;
use crate::mapper::CrossReferenceMap;
use crate::planner::{StepKind, TransactionPlan};
use crate::registry::TypeRegistry;

/// Everything the post-commit phase reads.
pub struct TriggerDispatcher<'a> {
    pub registry: &'a TypeRegistry,
    pub store: &'a dyn RelationalStore,
    pub caller: &'a Caller,
    pub context: &'a MutationContext,
    pub plan: &'a TransactionPlan,
    pub cross_references: &'a CrossReferenceMap,
}

impl TriggerDispatcher<'_> {
    /// Run each touched type's `after_mutations` hook once, sequentially,
    /// in order of first appearance. Failures are collected and logged;
    /// they never undo the commit.
    pub async fn dispatch(&self) -> Vec<TriggerFailure> {
        let mut failures = Vec::new();

        for group in &self.context.groups {
            let Ok(descriptor) = self.registry.get(&group.object_type) else {
                continue;
            };
            let Some(observer) = &descriptor.observer else {
                continue;
            };

            let written = |action: Action| -> Vec<CanonicalId> {
                self.plan
                    .steps
                    .iter()
                    .filter(|s| {
                        s.object_type == group.object_type
                            && s.action == action
                            && matches!(s.kind, StepKind::Write { .. })
                    })
                    .map(|s| s.id)
                    .collect()
            };
            let created = written(Action::Create);
            let updated = written(Action::Update);
            let deletion = self.plan.deletions.get(&group.object_type);
            let deleted = deletion.map(|d| d.existing.clone()).unwrap_or_default();

            let summary = MutationSummary {
                object_type: &group.object_type,
                created: &created,
                updated: &updated,
                deleted: &deleted,
                pre_shape: self.context.pre_shape.get(&group.object_type),
                cross_references: self.cross_references,
                before_delete: deletion.map(|d| &d.before_delete),
                caller: self.caller,
                store: self.store,
            };

            if let Err(e) = observer.after_mutations(&summary).await {
                tracing::warn!(
                    object_type = %group.object_type,
                    error = %e,
                    "after_mutations hook failed; commit stands"
                );
                failures.push(TriggerFailure {
                    object_type: group.object_type.clone(),
                    message: e.to_string(),
                });
            }
        }

        failures
    }
}
