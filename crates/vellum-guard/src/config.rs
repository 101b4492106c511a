use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vellum_types::ObjectType;

/// Configuration for the guard chain.
///
/// Stage flags here switch a stage off for every batch; per-call
/// [`BypassFlags`](crate::stage::BypassFlags) switch it off for one batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Run the permission stage.
    pub permission: bool,
    /// Run the content-moderation stage.
    pub moderation: bool,
    /// Run the quota stage.
    pub quota: bool,
    /// Limit applied to types without an entry in `quotas`. `None` means
    /// unlimited.
    pub default_quota: Option<u64>,
    /// Per-type limits on objects owned by one caller.
    pub quotas: BTreeMap<String, u64>,
    /// Strings longer than this are truncated before moderation.
    pub max_moderation_chars: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            permission: true,
            moderation: true,
            quota: true,
            default_quota: None,
            quotas: BTreeMap::new(),
            max_moderation_chars: 4096,
        }
    }
}

impl GuardConfig {
    /// A configuration with every stage switched off, for seeding scripts
    /// and local development.
    pub fn permissive() -> Self {
        Self {
            permission: false,
            moderation: false,
            quota: false,
            ..Default::default()
        }
    }

    /// The ownership limit for `object_type`, if any.
    pub fn quota_for(&self, object_type: &ObjectType) -> Option<u64> {
        self.quotas
            .get(object_type.as_str())
            .copied()
            .or(self.default_quota)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runs_every_stage() {
        let c = GuardConfig::default();
        assert!(c.permission && c.moderation && c.quota);
        assert_eq!(c.default_quota, None);
    }

    #[test]
    fn quota_lookup_falls_back_to_default() {
        let mut c = GuardConfig {
            default_quota: Some(10),
            ..Default::default()
        };
        c.quotas.insert("Note".into(), 3);
        assert_eq!(c.quota_for(&ObjectType::new("Note").unwrap()), Some(3));
        assert_eq!(c.quota_for(&ObjectType::new("Tag").unwrap()), Some(10));
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let c: GuardConfig = serde_json::from_str(r#"{"quota": false}"#).unwrap();
        assert!(!c.quota);
        assert!(c.permission);
        assert_eq!(c.max_moderation_chars, 4096);
    }
}
