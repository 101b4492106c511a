use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use vellum_guard::{AuthSnapshot, AuthorizationLookup, GuardError, GuardResult, QuotaLookup};
use vellum_store::{Filter, Projection, RelationalStore};
use vellum_types::{CanonicalId, Caller, ObjectType, Record};

use crate::registry::{ObjectTypeDescriptor, TypeRegistry};

/// Reads ownership snapshots straight from the store, using each type's
/// [`OwnershipFields`](crate::registry::OwnershipFields).
///
/// A type with neither an owner nor a public column is treated as public:
/// anyone may reference its rows, only admins may write them.
pub struct StoreAuthorization {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RelationalStore>,
}

impl StoreAuthorization {
    pub fn new(registry: Arc<TypeRegistry>, store: Arc<dyn RelationalStore>) -> Self {
        Self { registry, store }
    }
}

#[async_trait]
impl AuthorizationLookup for StoreAuthorization {
    async fn fetch(
        &self,
        objects: &[(ObjectType, CanonicalId)],
    ) -> GuardResult<HashMap<CanonicalId, AuthSnapshot>> {
        let mut by_type: BTreeMap<&ObjectType, Vec<CanonicalId>> = BTreeMap::new();
        for (object_type, id) in objects {
            by_type.entry(object_type).or_default().push(*id);
        }

        let mut snapshots = HashMap::with_capacity(objects.len());
        for (object_type, ids) in by_type {
            let descriptor = self
                .registry
                .get(object_type)
                .map_err(|e| GuardError::Authorization(e.to_string()))?;
            let rows = self
                .store
                .find_by_ids(
                    &descriptor.table,
                    &descriptor.id_field,
                    &ids,
                    &ownership_projection(descriptor),
                )
                .await
                .map_err(|e| GuardError::Authorization(e.to_string()))?;
            for row in rows {
                if let Some(id) = row.get(&descriptor.id_field).and_then(CanonicalId::from_value) {
                    snapshots.insert(id, snapshot(descriptor, &row));
                }
            }
        }
        Ok(snapshots)
    }
}

fn ownership_projection(descriptor: &ObjectTypeDescriptor) -> Projection {
    let ownership = &descriptor.ownership;
    Projection::fields(
        std::iter::once(&descriptor.id_field)
            .chain(ownership.owner.iter())
            .chain(ownership.public.iter())
            .chain(ownership.editors.iter())
            .cloned(),
    )
}

fn snapshot(descriptor: &ObjectTypeDescriptor, row: &Record) -> AuthSnapshot {
    let ownership = &descriptor.ownership;
    let owner_id = ownership
        .owner
        .as_ref()
        .and_then(|f| row.get(f))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    let is_public = match &ownership.public {
        Some(field) => row.get(field).and_then(Value::as_bool).unwrap_or(false),
        None => ownership.owner.is_none(),
    };
    let editors = ownership
        .editors
        .as_ref()
        .and_then(|f| row.get(f))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    AuthSnapshot {
        object_type: descriptor.object_type.clone(),
        owner_id,
        is_public,
        editors,
    }
}

/// Counts owned rows in the store for the quota stage.
pub struct StoreQuotaLookup {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RelationalStore>,
}

impl StoreQuotaLookup {
    pub fn new(registry: Arc<TypeRegistry>, store: Arc<dyn RelationalStore>) -> Self {
        Self { registry, store }
    }
}

#[async_trait]
impl QuotaLookup for StoreQuotaLookup {
    async fn owned_count(&self, caller: &Caller, object_type: &ObjectType) -> GuardResult<u64> {
        let descriptor = self
            .registry
            .get(object_type)
            .map_err(|e| GuardError::Quota(e.to_string()))?;
        let (Some(owner_field), Some(user)) = (&descriptor.ownership.owner, &caller.user_id) else {
            return Ok(0);
        };
        let filter = Filter::eq(owner_field.clone(), user.clone());
        self.store
            .count(&descriptor.table, Some(&filter))
            .await
            .map_err(|e| GuardError::Quota(e.to_string()))
    }
}
