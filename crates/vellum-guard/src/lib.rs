//! Guard chain for the Vellum object engine.
//!
//! Every mutation batch passes through the guard chain after its ids are
//! resolved and before the planner shapes any write. The chain runs the
//! permission, content-moderation and quota stages in that order and
//! produces an accept/reject decision with a per-stage audit trail.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use vellum_guard::{
//!     AllowAllModerator, AuthorizationMap, BypassFlags, GuardBatch, GuardChain, GuardConfig,
//! };
//!
//! # struct NoQuota;
//! # #[async_trait::async_trait]
//! # impl vellum_guard::QuotaLookup for NoQuota {
//! #     async fn owned_count(&self, _: &vellum_types::Caller, _: &vellum_types::ObjectType)
//! #         -> vellum_guard::GuardResult<u64> { Ok(0) }
//! # }
//! # tokio_test_block(async {
//! let chain = GuardChain::with_default_stages(
//!     GuardConfig::default(),
//!     Arc::new(AllowAllModerator),
//!     Arc::new(NoQuota),
//! );
//! let caller = vellum_types::Caller::user("alice");
//! let report = chain
//!     .evaluate(&caller, &GuardBatch::default(), &AuthorizationMap::default(), &BypassFlags::default())
//!     .await
//!     .unwrap();
//! assert!(report.is_accepted());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod authz;
pub mod chain;
pub mod config;
pub mod error;
pub mod stage;
pub mod stages;

// Re-exports for convenience.
pub use authz::{AuthSnapshot, AuthorizationLookup, AuthorizationMap, StaticAuthorization};
pub use chain::{GuardChain, GuardDecision, GuardReport};
pub use config::GuardConfig;
pub use error::{GuardError, GuardResult};
pub use stage::{
    BypassFlags, GuardBatch, GuardContext, GuardItem, GuardKind, GuardStage, RejectionKind,
    StageDecision, StageOutcome, StageResult,
};
pub use stages::moderation::{
    AllowAllModerator, BlocklistModerator, ContentModerator, ModerationStage, ModerationVerdict,
};
pub use stages::permission::PermissionStage;
pub use stages::quota::{QuotaLookup, QuotaStage};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use vellum_types::{Action, CanonicalId, Caller, ObjectType};

    use super::*;

    /// Helper: quota lookup reporting a fixed owned count.
    struct FixedCount(u64);

    #[async_trait]
    impl QuotaLookup for FixedCount {
        async fn owned_count(&self, _: &Caller, _: &ObjectType) -> GuardResult<u64> {
            Ok(self.0)
        }
    }

    /// Helper: quota lookup that always fails.
    struct BrokenQuota;

    #[async_trait]
    impl QuotaLookup for BrokenQuota {
        async fn owned_count(&self, _: &Caller, _: &ObjectType) -> GuardResult<u64> {
            Err(GuardError::Quota("backend down".into()))
        }
    }

    fn note() -> ObjectType {
        ObjectType::new("Note").unwrap()
    }

    fn id(raw: u64) -> CanonicalId {
        CanonicalId::new(raw).unwrap()
    }

    fn create(index: usize, title: &str) -> GuardItem {
        GuardItem {
            index,
            action: Action::Create,
            object_type: note(),
            target: None,
            input: json!({"id": "900", "title": title}),
            references: Vec::new(),
        }
    }

    fn targeted(index: usize, action: Action, target: u64) -> GuardItem {
        GuardItem {
            index,
            action,
            object_type: note(),
            target: Some(id(target)),
            input: json!({"id": target.to_string(), "title": "edit"}),
            references: Vec::new(),
        }
    }

    fn chain_with(config: GuardConfig, owned: u64) -> GuardChain {
        GuardChain::with_default_stages(
            config,
            Arc::new(BlocklistModerator::new(["forbidden"])),
            Arc::new(FixedCount(owned)),
        )
    }

    fn auth(entries: Vec<(u64, AuthSnapshot)>) -> AuthorizationMap {
        AuthorizationMap::new(entries.into_iter().map(|(k, v)| (id(k), v)).collect::<HashMap<_, _>>())
    }

    // -----------------------------------------------------------------------
    // 1. Default chain passes an owner's batch
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn default_chain_passes_owner_batch() {
        let chain = chain_with(GuardConfig::default(), 0);
        let batch = GuardBatch::new(vec![create(0, "hello"), targeted(1, Action::Update, 7)]);
        let authz = auth(vec![(7, AuthSnapshot::owned_by(note(), "alice"))]);
        let report = chain
            .evaluate(&Caller::user("alice"), &batch, &authz, &BypassFlags::default())
            .await
            .unwrap();
        assert!(report.is_accepted());
        assert_eq!(report.stage_results.len(), 3);
        assert!(report
            .stage_results
            .iter()
            .all(|r| r.outcome == StageOutcome::Passed));
    }

    // -----------------------------------------------------------------------
    // 2. Anonymous callers are rejected
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn anonymous_caller_rejected() {
        let chain = chain_with(GuardConfig::default(), 0);
        let batch = GuardBatch::new(vec![create(0, "hello")]);
        let report = chain
            .evaluate(&Caller::anonymous(), &batch, &AuthorizationMap::default(), &BypassFlags::default())
            .await
            .unwrap();
        assert!(matches!(
            report.decision,
            GuardDecision::Rejected { kind: RejectionKind::Unauthorized, .. }
        ));
        assert_eq!(report.stage_results.len(), 1); // fail-fast at permission
    }

    // -----------------------------------------------------------------------
    // 3. Updating someone else's object is rejected
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn foreign_update_rejected() {
        let chain = chain_with(GuardConfig::default(), 0);
        let batch = GuardBatch::new(vec![targeted(0, Action::Update, 7)]);
        let authz = auth(vec![(7, AuthSnapshot::owned_by(note(), "bob"))]);
        let report = chain
            .evaluate(&Caller::user("alice"), &batch, &authz, &BypassFlags::default())
            .await
            .unwrap();
        let GuardDecision::Rejected { stage, kind, reason } = report.decision else {
            panic!("expected rejection");
        };
        assert_eq!(stage, "permission");
        assert_eq!(kind, RejectionKind::Unauthorized);
        assert!(reason.contains("update"));
    }

    // -----------------------------------------------------------------------
    // 4. Updating a missing object is NotFound, deleting one passes
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn missing_update_target_not_found_but_delete_passes() {
        let chain = chain_with(GuardConfig::default(), 0);
        let caller = Caller::user("alice");
        let empty = AuthorizationMap::default();

        let update = GuardBatch::new(vec![targeted(0, Action::Update, 7)]);
        let report = chain
            .evaluate(&caller, &update, &empty, &BypassFlags::default())
            .await
            .unwrap();
        assert!(matches!(
            report.decision,
            GuardDecision::Rejected { kind: RejectionKind::NotFound, .. }
        ));

        let delete = GuardBatch::new(vec![targeted(0, Action::Delete, 7)]);
        let report = chain
            .evaluate(&caller, &delete, &empty, &BypassFlags::default())
            .await
            .unwrap();
        assert!(report.is_accepted());
    }

    // -----------------------------------------------------------------------
    // 5. References must be visible
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn private_reference_rejected_public_reference_passes() {
        let chain = chain_with(GuardConfig::default(), 0);
        let mut item = create(0, "child");
        item.references.push((note(), id(5)));
        let batch = GuardBatch::new(vec![item]);
        let caller = Caller::user("alice");

        let private = auth(vec![(5, AuthSnapshot::owned_by(note(), "bob"))]);
        let report = chain
            .evaluate(&caller, &batch, &private, &BypassFlags::default())
            .await
            .unwrap();
        assert!(!report.is_accepted());

        let mut snapshot = AuthSnapshot::owned_by(note(), "bob");
        snapshot.is_public = true;
        let public = auth(vec![(5, snapshot)]);
        let report = chain
            .evaluate(&caller, &batch, &public, &BypassFlags::default())
            .await
            .unwrap();
        assert!(report.is_accepted());
    }

    // -----------------------------------------------------------------------
    // 6. Moderation rejects blocked content
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn moderation_rejects_blocked_content() {
        let chain = chain_with(GuardConfig::default(), 0);
        let batch = GuardBatch::new(vec![create(0, "this is Forbidden text")]);
        let report = chain
            .evaluate(&Caller::user("alice"), &batch, &AuthorizationMap::default(), &BypassFlags::default())
            .await
            .unwrap();
        let GuardDecision::Rejected { stage, kind, .. } = report.decision else {
            panic!("expected rejection");
        };
        assert_eq!(stage, "moderation");
        assert_eq!(kind, RejectionKind::ContentRejected);
    }

    // -----------------------------------------------------------------------
    // 7. Quota counts creates in the batch
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn quota_counts_batch_creates() {
        let mut config = GuardConfig::default();
        config.quotas.insert("Note".into(), 3);
        let chain = chain_with(config, 2);
        let caller = Caller::user("alice");

        let one = GuardBatch::new(vec![create(0, "a")]);
        let report = chain
            .evaluate(&caller, &one, &AuthorizationMap::default(), &BypassFlags::default())
            .await
            .unwrap();
        assert!(report.is_accepted());

        let two = GuardBatch::new(vec![create(0, "a"), create(1, "b")]);
        let report = chain
            .evaluate(&caller, &two, &AuthorizationMap::default(), &BypassFlags::default())
            .await
            .unwrap();
        assert!(matches!(
            report.decision,
            GuardDecision::Rejected { kind: RejectionKind::QuotaExceeded, .. }
        ));
    }

    // -----------------------------------------------------------------------
    // 8. Bypass flags skip individual stages
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn bypass_skips_stage_and_records_it() {
        let chain = chain_with(GuardConfig::default(), 0);
        let batch = GuardBatch::new(vec![create(0, "forbidden")]);
        let bypass = BypassFlags {
            moderation: true,
            ..Default::default()
        };
        let report = chain
            .evaluate(&Caller::user("alice"), &batch, &AuthorizationMap::default(), &bypass)
            .await
            .unwrap();
        assert!(report.is_accepted());
        let moderation = report
            .stage_results
            .iter()
            .find(|r| r.stage_name == "moderation")
            .unwrap();
        assert_eq!(moderation.outcome, StageOutcome::Skipped);
    }

    // -----------------------------------------------------------------------
    // 9. Permissive config skips everything, even for anonymous callers
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn permissive_config_skips_all_stages() {
        let chain = chain_with(GuardConfig::permissive(), 0);
        let batch = GuardBatch::new(vec![create(0, "forbidden")]);
        let report = chain
            .evaluate(&Caller::anonymous(), &batch, &AuthorizationMap::default(), &BypassFlags::default())
            .await
            .unwrap();
        assert!(report.is_accepted());
        assert!(report
            .stage_results
            .iter()
            .all(|r| r.outcome == StageOutcome::Skipped));
    }

    // -----------------------------------------------------------------------
    // 10. Collaborator failures surface as errors, not rejections
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn quota_backend_failure_is_an_error() {
        let mut config = GuardConfig::default();
        config.default_quota = Some(10);
        let chain = GuardChain::with_default_stages(
            config,
            Arc::new(AllowAllModerator),
            Arc::new(BrokenQuota),
        );
        let batch = GuardBatch::new(vec![create(0, "a")]);
        let err = chain
            .evaluate(&Caller::user("alice"), &batch, &AuthorizationMap::default(), &BypassFlags::default())
            .await
            .unwrap_err();
        assert_eq!(err, GuardError::Quota("backend down".into()));
    }

    // -----------------------------------------------------------------------
    // 11. Empty chain accepts
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn empty_chain_accepts() {
        let chain = GuardChain::new(GuardConfig::default());
        assert_eq!(chain.stage_count(), 0);
        let report = chain
            .evaluate(&Caller::anonymous(), &GuardBatch::default(), &AuthorizationMap::default(), &BypassFlags::default())
            .await
            .unwrap();
        assert!(report.is_accepted());
    }
}
