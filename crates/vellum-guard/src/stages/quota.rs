use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use vellum_types::{Action, Caller, ObjectType};

use crate::error::{GuardError, GuardResult};
use crate::stage::{GuardContext, GuardKind, GuardStage, RejectionKind, StageDecision};

/// How many objects of a type a caller already owns.
#[async_trait]
pub trait QuotaLookup: Send + Sync {
    async fn owned_count(&self, caller: &Caller, object_type: &ObjectType) -> GuardResult<u64>;
}

/// Rejects batches that would push a caller past a per-type ownership limit.
///
/// Only creates count; the limit comes from
/// [`GuardConfig::quota_for`](crate::config::GuardConfig::quota_for).
pub struct QuotaStage {
    lookup: Arc<dyn QuotaLookup>,
}

impl QuotaStage {
    pub fn new(lookup: Arc<dyn QuotaLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl GuardStage for QuotaStage {
    fn kind(&self) -> GuardKind {
        GuardKind::Quota
    }

    fn name(&self) -> &str {
        "quota"
    }

    async fn evaluate(&self, context: &GuardContext<'_>) -> Result<StageDecision, GuardError> {
        let mut creates: BTreeMap<&ObjectType, u64> = BTreeMap::new();
        for item in context.batch.with_action(Action::Create) {
            *creates.entry(&item.object_type).or_default() += 1;
        }

        for (object_type, new) in creates {
            let Some(limit) = context.config.quota_for(object_type) else {
                continue;
            };
            let existing = self.lookup.owned_count(context.caller, object_type).await?;
            if existing + new > limit {
                tracing::debug!(
                    object_type = %object_type,
                    existing,
                    new,
                    limit,
                    "quota exceeded"
                );
                return Ok(StageDecision::fail(
                    RejectionKind::QuotaExceeded,
                    format!(
                        "{object_type} quota exceeded: {existing} owned + {new} new > limit {limit}"
                    ),
                ));
            }
        }

        Ok(StageDecision::Pass)
    }
}
