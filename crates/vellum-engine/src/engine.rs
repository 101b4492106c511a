use std::sync::Arc;
use std::time::Instant;

use vellum_guard::{
    AllowAllModerator, AuthorizationLookup, ContentModerator, GuardChain, GuardDecision,
    QuotaLookup, RejectionKind,
};
use vellum_store::RelationalStore;
use vellum_types::{Caller, IdGenerator};

use crate::authz::{StoreAuthorization, StoreQuotaLookup};
use crate::batch::{BatchOutcome, MutationItem, MutationOptions};
use crate::config::EngineConfig;
use crate::context::ContextBuilder;
use crate::error::{EngineError, EngineResult};
use crate::executor::execute;
use crate::mapper::map_results;
use crate::normalizer::normalize;
use crate::planner::Planner;
use crate::registry::TypeRegistry;
use crate::resolver::resolve;
use crate::triggers::TriggerDispatcher;

/// The batch mutation pipeline.
///
/// Every create, update and delete goes through
/// [`perform_batch_mutation`](Self::perform_batch_mutation): normalize,
/// resolve placeholder ids, build context, run the guard chain, plan,
/// commit atomically, map results, fire triggers.
pub struct MutationEngine {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RelationalStore>,
    authorization: Arc<dyn AuthorizationLookup>,
    guard: GuardChain,
    ids: IdGenerator,
    config: EngineConfig,
}

impl MutationEngine {
    pub fn builder(registry: Arc<TypeRegistry>, store: Arc<dyn RelationalStore>) -> EngineBuilder {
        EngineBuilder {
            registry,
            store,
            config: EngineConfig::default(),
            authorization: None,
            moderator: None,
            quota: None,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply a batch atomically.
    ///
    /// `options` that bypass checks or mark a seeding run are refused with
    /// [`EngineError::Unauthorized`] unless the caller is an admin.
    ///
    /// On `Ok`, every write has committed and the outcome holds one result
    /// slot per input in input order. On `Err` nothing was written, except
    /// for [`EngineError::Internal`] raised while mapping outputs.
    pub async fn perform_batch_mutation(
        &self,
        batch: Vec<MutationItem>,
        caller: &Caller,
        options: MutationOptions,
    ) -> EngineResult<BatchOutcome> {
        if options.is_privileged() && !caller.is_admin {
            tracing::warn!(
                user = caller.log_name(),
                "bypass or seeding requested by a non-admin caller"
            );
            return Err(EngineError::Unauthorized(
                "bypass flags and seeding require an admin caller".into(),
            ));
        }
        if batch.is_empty() {
            return Ok(BatchOutcome::empty());
        }
        if batch.len() > self.config.max_batch_size {
            return Err(EngineError::BatchTooLarge {
                len: batch.len(),
                max: self.config.max_batch_size,
            });
        }
        let started = Instant::now();
        let registry = self.registry.as_ref();
        let store = self.store.as_ref();

        let items = normalize(registry, &batch, options.bypass.validation)?;
        let (items, placeholders) = resolve(items, registry, &self.ids)?;

        let context = ContextBuilder {
            registry,
            store,
            authorization: self.authorization.as_ref(),
        }
        .build(&items, caller)
        .await?;

        let report = self
            .guard
            .evaluate(caller, &context.guard_batch, &context.authorization, &options.bypass)
            .await?;
        if let GuardDecision::Rejected { kind, reason, .. } = &report.decision {
            return Err(match kind {
                RejectionKind::Unauthorized => EngineError::Unauthorized(reason.clone()),
                RejectionKind::NotFound => EngineError::NotFound(reason.clone()),
                RejectionKind::QuotaExceeded => EngineError::QuotaExceeded(reason.clone()),
                RejectionKind::ContentRejected => EngineError::ContentRejected(reason.clone()),
            });
        }

        let plan = Planner {
            registry,
            store,
            caller,
            options: &options,
            placeholders: &placeholders,
            context: &context,
        }
        .plan(&items)
        .await?;

        let outputs = execute(store, &plan).await?;
        let (results, cross_references) =
            map_results(&plan, outputs, batch.len(), registry, caller)?;

        let trigger_failures = if options.bypass.triggers {
            Vec::new()
        } else {
            TriggerDispatcher {
                registry,
                store,
                caller,
                context: &context,
                plan: &plan,
                cross_references: &cross_references,
            }
            .dispatch()
            .await
        };

        tracing::info!(
            batch_len = batch.len(),
            operations = plan.ops.len(),
            trigger_failures = trigger_failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch mutation committed"
        );

        Ok(BatchOutcome {
            results,
            trigger_failures,
            guard: Some(report),
        })
    }
}

/// Builder for [`MutationEngine`]. Collaborators left unset default to the
/// store-backed lookups and a moderator that accepts everything.
pub struct EngineBuilder {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RelationalStore>,
    config: EngineConfig,
    authorization: Option<Arc<dyn AuthorizationLookup>>,
    moderator: Option<Arc<dyn ContentModerator>>,
    quota: Option<Arc<dyn QuotaLookup>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn authorization(mut self, lookup: Arc<dyn AuthorizationLookup>) -> Self {
        self.authorization = Some(lookup);
        self
    }

    pub fn moderator(mut self, moderator: Arc<dyn ContentModerator>) -> Self {
        self.moderator = Some(moderator);
        self
    }

    pub fn quota(mut self, lookup: Arc<dyn QuotaLookup>) -> Self {
        self.quota = Some(lookup);
        self
    }

    pub fn build(self) -> EngineResult<MutationEngine> {
        self.config.validate()?;
        let ids = match self.config.worker_id {
            Some(worker) => IdGenerator::new(worker)?,
            None => IdGenerator::with_random_worker(),
        };

        let authorization: Arc<dyn AuthorizationLookup> = match self.authorization {
            Some(lookup) => lookup,
            None => Arc::new(StoreAuthorization::new(
                self.registry.clone(),
                self.store.clone(),
            )),
        };
        let moderator: Arc<dyn ContentModerator> = match self.moderator {
            Some(moderator) => moderator,
            None => Arc::new(AllowAllModerator),
        };
        let quota: Arc<dyn QuotaLookup> = match self.quota {
            Some(lookup) => lookup,
            None => Arc::new(StoreQuotaLookup::new(
                self.registry.clone(),
                self.store.clone(),
            )),
        };
        let guard = GuardChain::with_default_stages(self.config.guard.clone(), moderator, quota);

        tracing::debug!(
            worker = ids.worker(),
            types = self.registry.len(),
            guard_stages = guard.stage_count(),
            "mutation engine ready"
        );
        Ok(MutationEngine {
            registry: self.registry,
            store: self.store,
            authorization,
            guard,
            ids,
            config: self.config,
        })
    }
}
