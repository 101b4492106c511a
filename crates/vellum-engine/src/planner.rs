use std::collections::{HashMap, HashSet};

use serde_json::Value;
use vellum_store::{RelationalStore, StoreOp};
use vellum_types::{Action, CanonicalId, Caller, ObjectType};

use crate::batch::MutationOptions;
use crate::context::{MutationContext, TypeGroup};
use crate::error::{EngineError, EngineResult};
use crate::hooks::{DeletionContext, ShapeContext};
use crate::normalizer::NormalizedItem;
use crate::registry::{ObjectTypeDescriptor, TypeRegistry};
use crate::resolver::PlaceholderMap;

// ---------------------------------------------------------------------------
// TransactionPlan
// ---------------------------------------------------------------------------

/// How one batch item maps onto the plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// `ops[op]` produces this item's row.
    Write { op: usize },
    /// The update shaped to nothing and was left out.
    Skipped,
    /// Covered by the type's delete-many. `existed` is the result of the
    /// pre-commit existence check.
    Delete { existed: bool },
}

/// Bookkeeping for one batch item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanStep {
    pub index: usize,
    pub action: Action,
    pub object_type: ObjectType,
    pub id: CanonicalId,
    /// The id as the caller sent it.
    pub client_id: String,
    pub kind: StepKind,
}

/// Per-type delete bookkeeping.
#[derive(Clone, Debug, PartialEq)]
pub struct DeletionRecord {
    pub requested: Vec<CanonicalId>,
    /// Requested ids that existed at check time; the delete-many targets
    /// exactly these.
    pub existing: Vec<CanonicalId>,
    /// Whatever the type's `before_deleted` hook returned.
    pub before_delete: Value,
}

/// Ordered store operations plus everything needed to map their outputs
/// back to the batch.
///
/// Operations are grouped per type in order of first appearance; within a
/// type, creates come first, then updates, then one delete-many.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionPlan {
    pub ops: Vec<StoreOp>,
    /// One step per batch item, in plan order.
    pub steps: Vec<PlanStep>,
    pub deletions: HashMap<ObjectType, DeletionRecord>,
}

impl TransactionPlan {
    /// Types and ids the operations touch, for error reports.
    pub fn affected(&self) -> (Vec<String>, Vec<CanonicalId>) {
        let mut types: Vec<String> = Vec::new();
        let mut ids = Vec::new();
        for step in &self.steps {
            if matches!(step.kind, StepKind::Skipped | StepKind::Delete { existed: false }) {
                continue;
            }
            if !types.iter().any(|t| t == step.object_type.as_str()) {
                types.push(step.object_type.to_string());
            }
            ids.push(step.id);
        }
        (types, ids)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Shapes every item and assembles the [`TransactionPlan`].
pub struct Planner<'a> {
    pub registry: &'a TypeRegistry,
    pub store: &'a dyn RelationalStore,
    pub caller: &'a Caller,
    pub options: &'a MutationOptions,
    pub placeholders: &'a PlaceholderMap,
    pub context: &'a MutationContext,
}

impl Planner<'_> {
    pub async fn plan(&self, items: &[NormalizedItem]) -> EngineResult<TransactionPlan> {
        let mut plan = TransactionPlan::default();
        for group in &self.context.groups {
            let descriptor = self.registry.get(&group.object_type)?;
            self.plan_creates(descriptor, group, items, &mut plan)?;
            self.plan_updates(descriptor, group, items, &mut plan)?;
            self.plan_deletes(descriptor, group, items, &mut plan).await?;
        }
        tracing::debug!(
            operations = plan.ops.len(),
            steps = plan.steps.len(),
            "transaction planned"
        );
        Ok(plan)
    }

    fn shape_context<'b>(&'b self, object_type: &'b ObjectType) -> ShapeContext<'b> {
        ShapeContext {
            object_type,
            caller: self.caller,
            additional_data: &self.options.additional_data,
            placeholders: self.placeholders,
            pre_shape: self.context.pre_shape.get(object_type),
            seeding: self.options.seeding,
        }
    }

    fn plan_creates(
        &self,
        descriptor: &ObjectTypeDescriptor,
        group: &TypeGroup,
        items: &[NormalizedItem],
        plan: &mut TransactionPlan,
    ) -> EngineResult<()> {
        let ctx = self.shape_context(&group.object_type);
        let select = self
            .options
            .projection
            .clone()
            .unwrap_or_else(|| descriptor.projection.clone());

        for &pos in &group.creates {
            let item = &items[pos];
            let id = canonical_id(item, descriptor)?;
            let mut data = descriptor.shaper.shape_create(item.input.clone(), &ctx)?;
            data.insert(descriptor.id_field.clone(), id.to_value());
            if let (Some(owner_field), Some(user)) =
                (&descriptor.ownership.owner, &self.caller.user_id)
            {
                // Only admins may create on behalf of someone else.
                if !self.caller.is_admin || data.get(owner_field).map_or(true, Value::is_null) {
                    data.insert(owner_field.clone(), Value::String(user.clone()));
                }
            }

            plan.steps.push(PlanStep {
                index: item.index,
                action: Action::Create,
                object_type: group.object_type.clone(),
                id,
                client_id: item.client_id.clone(),
                kind: StepKind::Write { op: plan.ops.len() },
            });
            plan.ops.push(StoreOp::Create {
                table: descriptor.table.clone(),
                id_field: descriptor.id_field.clone(),
                data,
                select: select.clone(),
            });
        }
        Ok(())
    }

    fn plan_updates(
        &self,
        descriptor: &ObjectTypeDescriptor,
        group: &TypeGroup,
        items: &[NormalizedItem],
        plan: &mut TransactionPlan,
    ) -> EngineResult<()> {
        let ctx = self.shape_context(&group.object_type);
        let select = self
            .options
            .projection
            .clone()
            .unwrap_or_else(|| descriptor.projection.clone());

        for &pos in &group.updates {
            let item = &items[pos];
            let id = canonical_id(item, descriptor)?;
            let mut input = item.input.clone();
            input.remove(&descriptor.id_field);
            let mut data = descriptor.shaper.shape_update(input, &ctx)?;
            data.remove(&descriptor.id_field);

            let kind = if data.is_empty() {
                tracing::warn!(
                    object_type = %group.object_type,
                    %id,
                    index = item.index,
                    "update shaped to an empty payload, skipping"
                );
                StepKind::Skipped
            } else {
                plan.ops.push(StoreOp::Update {
                    table: descriptor.table.clone(),
                    id_field: descriptor.id_field.clone(),
                    id,
                    data,
                    select: select.clone(),
                });
                StepKind::Write {
                    op: plan.ops.len() - 1,
                }
            };
            plan.steps.push(PlanStep {
                index: item.index,
                action: Action::Update,
                object_type: group.object_type.clone(),
                id,
                client_id: item.client_id.clone(),
                kind,
            });
        }
        Ok(())
    }

    async fn plan_deletes(
        &self,
        descriptor: &ObjectTypeDescriptor,
        group: &TypeGroup,
        items: &[NormalizedItem],
        plan: &mut TransactionPlan,
    ) -> EngineResult<()> {
        if group.deletes.is_empty() {
            return Ok(());
        }

        let mut targets = Vec::with_capacity(group.deletes.len());
        for &pos in &group.deletes {
            targets.push((&items[pos], canonical_id(&items[pos], descriptor)?));
        }
        let mut seen = HashSet::new();
        let requested: Vec<CanonicalId> = targets
            .iter()
            .map(|(_, id)| *id)
            .filter(|id| seen.insert(*id))
            .collect();

        let before_delete = match &descriptor.observer {
            Some(observer) if !self.options.bypass.triggers => {
                let ctx = DeletionContext {
                    object_type: &group.object_type,
                    requested: &requested,
                    caller: self.caller,
                    pre_shape: self.context.pre_shape.get(&group.object_type),
                    authorization: &self.context.authorization,
                    store: self.store,
                };
                observer.before_deleted(&ctx).await?
            }
            _ => Value::Null,
        };

        let existing = self
            .store
            .existing_ids(&descriptor.table, &descriptor.id_field, &requested)
            .await?;
        let existing_set: HashSet<CanonicalId> = existing.iter().copied().collect();
        if existing.len() < requested.len() {
            tracing::debug!(
                object_type = %group.object_type,
                requested = requested.len(),
                existing = existing.len(),
                "excluding delete targets that no longer exist"
            );
        }

        if !existing.is_empty() {
            plan.ops.push(StoreOp::DeleteMany {
                table: descriptor.table.clone(),
                id_field: descriptor.id_field.clone(),
                ids: existing.clone(),
            });
        }
        for (item, id) in targets {
            plan.steps.push(PlanStep {
                index: item.index,
                action: Action::Delete,
                object_type: group.object_type.clone(),
                id,
                client_id: item.client_id.clone(),
                kind: StepKind::Delete {
                    existed: existing_set.contains(&id),
                },
            });
        }
        plan.deletions.insert(
            group.object_type.clone(),
            DeletionRecord {
                requested,
                existing,
                before_delete,
            },
        );
        Ok(())
    }
}

/// The item's id. By now every id is canonical; anything else is a defect
/// upstream, not a caller error.
fn canonical_id(item: &NormalizedItem, descriptor: &ObjectTypeDescriptor) -> EngineResult<CanonicalId> {
    item.id_value(&descriptor.id_field)
        .and_then(CanonicalId::from_value)
        .ok_or_else(|| {
            EngineError::internal(format!(
                "item {} reached the planner without a canonical {}",
                item.index, descriptor.id_field
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use vellum_guard::{AuthorizationMap, GuardBatch};
    use vellum_store::InMemoryStore;
    use vellum_types::Record;

    use super::*;
    use crate::context::{group_by_type, PreShapeMap};
    use crate::hooks::{MutationSummary, Shaper, TypeObserver};

    fn tag(s: &str) -> ObjectType {
        ObjectType::new(s).unwrap()
    }

    fn item(index: usize, action: Action, object_type: &str, input: Value) -> NormalizedItem {
        let input = input.as_object().cloned().unwrap();
        NormalizedItem {
            index,
            action,
            object_type: tag(object_type),
            client_id: input["id"].as_str().unwrap_or_default().to_string(),
            input,
        }
    }

    /// Drops `noise` and upper-cases titles.
    struct TitleShaper;

    #[async_trait]
    impl Shaper for TitleShaper {
        fn shape_create(&self, mut input: Record, _ctx: &ShapeContext<'_>) -> EngineResult<Record> {
            if let Some(Value::String(t)) = input.get("title") {
                let upper = t.to_uppercase();
                input.insert("title".into(), Value::String(upper));
            }
            Ok(input)
        }

        fn shape_update(&self, mut input: Record, _ctx: &ShapeContext<'_>) -> EngineResult<Record> {
            input.remove("noise");
            Ok(input)
        }
    }

    struct SnapshotObserver;

    #[async_trait]
    impl TypeObserver for SnapshotObserver {
        async fn before_deleted(&self, ctx: &DeletionContext<'_>) -> EngineResult<Value> {
            Ok(json!(ctx.requested.len()))
        }

        async fn after_mutations(&self, _summary: &MutationSummary<'_>) -> EngineResult<()> {
            Ok(())
        }
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register(
                ObjectTypeDescriptor::builder(tag("Note"))
                    .table("notes")
                    .owner_field("ownerId")
                    .shaper(Arc::new(TitleShaper))
                    .observer(Arc::new(SnapshotObserver))
                    .build(),
            )
            .register(ObjectTypeDescriptor::builder(tag("Tag")).build())
            .build()
            .unwrap()
    }

    fn context(items: &[NormalizedItem]) -> MutationContext {
        MutationContext {
            groups: group_by_type(items),
            pre_shape: PreShapeMap::default(),
            authorization: AuthorizationMap::default(),
            guard_batch: GuardBatch::default(),
        }
    }

    #[tokio::test]
    async fn orders_ops_per_type_creates_updates_deletes() {
        let store = InMemoryStore::new();
        store.insert("notes", "id", json!({"id": "5"}).as_object().cloned().unwrap()).unwrap();
        store.insert("notes", "id", json!({"id": "6"}).as_object().cloned().unwrap()).unwrap();

        let items = vec![
            item(0, Action::Delete, "Note", json!({"id": "5"})),
            item(1, Action::Create, "Tag", json!({"id": "100"})),
            item(2, Action::Update, "Note", json!({"id": "6", "noise": 1})),
            item(3, Action::Create, "Note", json!({"id": "101", "title": "hi"})),
            item(4, Action::Update, "Note", json!({"id": "6", "title": "t"})),
            item(5, Action::Delete, "Note", json!({"id": "7"})),
        ];
        let registry = registry();
        let context = context(&items);
        let options = MutationOptions::default();
        let placeholders = PlaceholderMap::default();
        let caller = Caller::user("alice");
        let planner = Planner {
            registry: &registry,
            store: &store,
            caller: &caller,
            options: &options,
            placeholders: &placeholders,
            context: &context,
        };
        let plan = planner.plan(&items).await.unwrap();

        let kinds: Vec<&str> = plan
            .ops
            .iter()
            .map(|op| match op {
                StoreOp::Create { table, .. } => if table == "notes" { "note+" } else { "tag+" },
                StoreOp::Update { .. } => "note~",
                StoreOp::DeleteMany { .. } => "note-",
            })
            .collect();
        assert_eq!(kinds, vec!["note+", "note~", "note-", "tag+"]);

        let StoreOp::Create { data, .. } = &plan.ops[0] else { panic!() };
        assert_eq!(data["title"], json!("HI"));
        assert_eq!(data["ownerId"], json!("alice"));

        let StoreOp::DeleteMany { ids, .. } = &plan.ops[2] else { panic!() };
        assert_eq!(ids, &vec![CanonicalId::new(5).unwrap()]);

        let skipped = plan.steps.iter().find(|s| s.index == 2).unwrap();
        assert_eq!(skipped.kind, StepKind::Skipped);
        let missing = plan.steps.iter().find(|s| s.index == 5).unwrap();
        assert_eq!(missing.kind, StepKind::Delete { existed: false });

        let deletion = &plan.deletions[&tag("Note")];
        assert_eq!(deletion.requested.len(), 2);
        assert_eq!(deletion.before_delete, json!(2));
        assert_eq!(plan.steps.len(), items.len());
    }

    #[tokio::test]
    async fn non_canonical_id_is_internal_error() {
        let store = InMemoryStore::new();
        let items = vec![item(0, Action::Update, "Tag", json!({"id": "tmp1", "x": 1}))];
        let registry = registry();
        let context = context(&items);
        let options = MutationOptions::default();
        let placeholders = PlaceholderMap::default();
        let caller = Caller::user("alice");
        let planner = Planner {
            registry: &registry,
            store: &store,
            caller: &caller,
            options: &options,
            placeholders: &placeholders,
            context: &context,
        };
        assert!(matches!(
            planner.plan(&items).await,
            Err(EngineError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn only_admins_choose_the_owner() {
        let store = InMemoryStore::new();
        let items = vec![item(0, Action::Create, "Note", json!({"id": "101", "ownerId": "mallory"}))];
        let registry = registry();
        let context = context(&items);
        let options = MutationOptions::default();
        let placeholders = PlaceholderMap::default();

        for (caller, owner) in [
            (Caller::user("alice"), "alice"),
            (Caller::admin("root"), "mallory"),
        ] {
            let planner = Planner {
                registry: &registry,
                store: &store,
                caller: &caller,
                options: &options,
                placeholders: &placeholders,
                context: &context,
            };
            let plan = planner.plan(&items).await.unwrap();
            let StoreOp::Create { data, .. } = &plan.ops[0] else { panic!() };
            assert_eq!(data["ownerId"], json!(owner));
        }
    }
}
