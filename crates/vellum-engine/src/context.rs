use std::collections::{HashMap, HashSet};

use serde_json::Value;
use vellum_guard::{AuthorizationLookup, AuthorizationMap, GuardBatch, GuardItem};
use vellum_store::RelationalStore;
use vellum_types::{Action, CanonicalId, Caller, ObjectType};

use crate::error::{EngineError, EngineResult, FieldError, FieldErrors};
use crate::hooks::PreShapeInput;
use crate::normalizer::NormalizedItem;
use crate::registry::TypeRegistry;

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Positions (into the normalized batch) of one type's items, by action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeGroup {
    pub object_type: ObjectType,
    pub creates: Vec<usize>,
    pub updates: Vec<usize>,
    pub deletes: Vec<usize>,
}

/// Group items by type in order of first appearance. Within a group,
/// positions keep batch order.
pub fn group_by_type(items: &[NormalizedItem]) -> Vec<TypeGroup> {
    let mut groups: Vec<TypeGroup> = Vec::new();
    for (pos, item) in items.iter().enumerate() {
        let group = match groups.iter().position(|g| g.object_type == item.object_type) {
            Some(i) => &mut groups[i],
            None => {
                groups.push(TypeGroup {
                    object_type: item.object_type.clone(),
                    creates: Vec::new(),
                    updates: Vec::new(),
                    deletes: Vec::new(),
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };
        match item.action {
            Action::Create => group.creates.push(pos),
            Action::Update => group.updates.push(pos),
            Action::Delete => group.deletes.push(pos),
        }
    }
    groups
}

// ---------------------------------------------------------------------------
// PreShapeMap
// ---------------------------------------------------------------------------

/// Read-only map from object type to the context its shaper precomputed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreShapeMap(HashMap<ObjectType, Value>);

impl PreShapeMap {
    pub fn get(&self, object_type: &ObjectType) -> Option<&Value> {
        self.0.get(object_type)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectType, &Value)> {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// MutationContext
// ---------------------------------------------------------------------------

/// Everything computed once per batch before the guard chain runs.
#[derive(Debug)]
pub struct MutationContext {
    pub groups: Vec<TypeGroup>,
    pub pre_shape: PreShapeMap,
    pub authorization: AuthorizationMap,
    pub guard_batch: GuardBatch,
}

/// Builds a [`MutationContext`] from a resolved batch.
pub struct ContextBuilder<'a> {
    pub registry: &'a TypeRegistry,
    pub store: &'a dyn RelationalStore,
    pub authorization: &'a dyn AuthorizationLookup,
}

impl ContextBuilder<'_> {
    pub async fn build(
        &self,
        items: &[NormalizedItem],
        caller: &Caller,
    ) -> EngineResult<MutationContext> {
        let mut errors = Vec::new();

        let created: HashSet<CanonicalId> = items
            .iter()
            .filter(|i| i.action == Action::Create)
            .filter_map(|i| {
                let descriptor = self.registry.get(&i.object_type).ok()?;
                i.id_value(&descriptor.id_field)
                    .and_then(CanonicalId::from_value)
            })
            .collect();

        let mut guard_items = Vec::with_capacity(items.len());
        let mut lookups: Vec<(ObjectType, CanonicalId)> = Vec::new();
        let mut seen = HashSet::new();

        for item in items {
            let descriptor = self.registry.get(&item.object_type)?;
            let at = item.index;

            let target = match item.action {
                Action::Create => None,
                Action::Update | Action::Delete => {
                    match item
                        .id_value(&descriptor.id_field)
                        .and_then(CanonicalId::from_value)
                    {
                        Some(id) => Some(id),
                        None => {
                            errors.push(FieldError::new(
                                format!("{at}.{}", descriptor.id_field),
                                "not a known id or placeholder",
                            ));
                            continue;
                        }
                    }
                }
            };
            // Targets created earlier in the batch belong to the caller.
            let target = target.filter(|id| !created.contains(id));
            if let Some(id) = target {
                if seen.insert(id) {
                    lookups.push((item.object_type.clone(), id));
                }
            }

            let mut references = Vec::new();
            if item.action != Action::Delete {
                for (field, referenced_type) in &descriptor.references {
                    let Some(value) = item.input.get(field) else {
                        continue;
                    };
                    let values: Vec<&Value> = match value {
                        Value::Array(values) => values.iter().collect(),
                        Value::Null => Vec::new(),
                        other => vec![other],
                    };
                    for value in values {
                        match CanonicalId::from_value(value) {
                            Some(id) if created.contains(&id) => {}
                            Some(id) => {
                                references.push((referenced_type.clone(), id));
                                if seen.insert(id) {
                                    lookups.push((referenced_type.clone(), id));
                                }
                            }
                            None => errors.push(FieldError::new(
                                format!("{at}.{field}"),
                                format!("not a known {referenced_type} id or placeholder"),
                            )),
                        }
                    }
                }
            }

            guard_items.push(GuardItem {
                index: item.index,
                action: item.action,
                object_type: item.object_type.clone(),
                target,
                input: Value::Object(item.input.clone()),
                references,
            });
        }

        if !errors.is_empty() {
            return Err(EngineError::Validation(FieldErrors(errors)));
        }

        let authorization = if lookups.is_empty() {
            AuthorizationMap::default()
        } else {
            AuthorizationMap::new(self.authorization.fetch(&lookups).await?)
        };
        tracing::debug!(
            requested = lookups.len(),
            found = authorization.len(),
            "authorization snapshot fetched"
        );

        let groups = group_by_type(items);
        let mut pre_shape = HashMap::with_capacity(groups.len());
        for group in &groups {
            let descriptor = self.registry.get(&group.object_type)?;
            let input = PreShapeInput {
                object_type: &group.object_type,
                creates: group.creates.iter().map(|&p| &items[p].input).collect(),
                updates: group.updates.iter().map(|&p| &items[p].input).collect(),
                deletes: group
                    .deletes
                    .iter()
                    .filter_map(|&p| {
                        items[p]
                            .id_value(&descriptor.id_field)
                            .and_then(CanonicalId::from_value)
                    })
                    .collect(),
                caller,
                store: self.store,
            };
            let context = descriptor.shaper.pre_shape(&input).await?;
            if !context.is_null() {
                pre_shape.insert(group.object_type.clone(), context);
            }
        }

        Ok(MutationContext {
            groups,
            pre_shape: PreShapeMap(pre_shape),
            authorization,
            guard_batch: GuardBatch::new(guard_items),
        })
    }
}
