use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vellum_types::{CanonicalId, Caller, ObjectType};

use crate::error::{GuardError, GuardResult};

/// Ownership and permission facts about one stored object, captured before
/// any write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub object_type: ObjectType,
    /// Owning user, if the object has one.
    pub owner_id: Option<String>,
    /// Public objects may be referenced by anyone.
    pub is_public: bool,
    /// Users other than the owner allowed to update or delete the object.
    #[serde(default)]
    pub editors: Vec<String>,
}

impl AuthSnapshot {
    pub fn owned_by(object_type: ObjectType, owner: impl Into<String>) -> Self {
        Self {
            object_type,
            owner_id: Some(owner.into()),
            is_public: false,
            editors: Vec::new(),
        }
    }

    /// May `caller` update or delete this object?
    pub fn can_write(&self, caller: &Caller) -> bool {
        caller.is_admin
            || caller.owns(self.owner_id.as_deref())
            || caller
                .user_id
                .as_ref()
                .is_some_and(|me| self.editors.iter().any(|e| e == me))
    }

    /// May `caller` reference this object from another object?
    pub fn can_reference(&self, caller: &Caller) -> bool {
        self.is_public || self.can_write(caller)
    }
}

/// Read-only map of object id to [`AuthSnapshot`], fetched once per batch.
///
/// There is no way to insert after construction; every stage sees the same
/// snapshot.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationMap(HashMap<CanonicalId, AuthSnapshot>);

impl AuthorizationMap {
    pub fn new(snapshots: HashMap<CanonicalId, AuthSnapshot>) -> Self {
        Self(snapshots)
    }

    pub fn get(&self, id: &CanonicalId) -> Option<&AuthSnapshot> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &CanonicalId) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalId, &AuthSnapshot)> {
        self.0.iter()
    }
}

/// Service that answers "who owns these objects?".
///
/// Objects that do not exist are simply absent from the result.
#[async_trait]
pub trait AuthorizationLookup: Send + Sync {
    async fn fetch(
        &self,
        objects: &[(ObjectType, CanonicalId)],
    ) -> GuardResult<HashMap<CanonicalId, AuthSnapshot>>;
}

/// [`AuthorizationLookup`] over a fixed table, for tests and demos.
#[derive(Default)]
pub struct StaticAuthorization {
    snapshots: RwLock<HashMap<CanonicalId, AuthSnapshot>>,
}

impl StaticAuthorization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: CanonicalId, snapshot: AuthSnapshot) -> GuardResult<()> {
        self.snapshots
            .write()
            .map_err(|_| GuardError::Authorization("snapshot table lock poisoned".into()))?
            .insert(id, snapshot);
        Ok(())
    }
}

#[async_trait]
impl AuthorizationLookup for StaticAuthorization {
    async fn fetch(
        &self,
        objects: &[(ObjectType, CanonicalId)],
    ) -> GuardResult<HashMap<CanonicalId, AuthSnapshot>> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| GuardError::Authorization("snapshot table lock poisoned".into()))?;
        Ok(objects
            .iter()
            .filter_map(|(_, id)| snapshots.get(id).map(|s| (*id, s.clone())))
            .collect())
    }
}
