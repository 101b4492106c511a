use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use vellum_types::Caller;

use crate::authz::AuthorizationMap;
use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::stage::{
    BypassFlags, GuardBatch, GuardContext, GuardKind, GuardStage, RejectionKind, StageDecision,
    StageOutcome, StageResult,
};
use crate::stages::{ContentModerator, ModerationStage, PermissionStage, QuotaLookup, QuotaStage};

// ---------------------------------------------------------------------------
// GuardReport
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GuardDecision {
    Accepted,
    Rejected {
        stage: String,
        kind: RejectionKind,
        reason: String,
    },
}

/// The outcome of running a batch through the chain.
#[derive(Clone, Debug, Serialize)]
pub struct GuardReport {
    pub decision: GuardDecision,
    /// Per-stage results in chain order, including skipped stages.
    pub stage_results: Vec<StageResult>,
    pub elapsed: Duration,
}

impl GuardReport {
    pub fn is_accepted(&self) -> bool {
        matches!(self.decision, GuardDecision::Accepted)
    }
}

// ---------------------------------------------------------------------------
// GuardChain
// ---------------------------------------------------------------------------

/// Ordered pre-write checks every batch passes through before the planner
/// sees it.
///
/// The chain is fail-fast. A stage is skipped when its kind is switched off
/// in [`GuardConfig`] or in the call's [`BypassFlags`]; skipped stages are
/// still recorded in the report.
pub struct GuardChain {
    stages: Vec<Box<dyn GuardStage>>,
    config: GuardConfig,
}

impl GuardChain {
    /// Create a chain with no stages.
    pub fn new(config: GuardConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    /// Create a chain with the standard stages:
    /// Permission -> Moderation -> Quota
    pub fn with_default_stages(
        config: GuardConfig,
        moderator: Arc<dyn ContentModerator>,
        quota: Arc<dyn QuotaLookup>,
    ) -> Self {
        let mut chain = Self::new(config);
        chain.add_stage(Box::new(PermissionStage));
        chain.add_stage(Box::new(ModerationStage::new(moderator)));
        chain.add_stage(Box::new(QuotaStage::new(quota)));
        chain
    }

    /// Append a stage to the end of the chain.
    pub fn add_stage(&mut self, stage: Box<dyn GuardStage>) {
        self.stages.push(stage);
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn enabled(&self, kind: GuardKind, bypass: &BypassFlags) -> bool {
        let configured = match kind {
            GuardKind::Permission => self.config.permission,
            GuardKind::Moderation => self.config.moderation,
            GuardKind::Quota => self.config.quota,
        };
        configured && !bypass.bypasses(kind)
    }

    /// Run every enabled stage against the batch.
    pub async fn evaluate(
        &self,
        caller: &Caller,
        batch: &GuardBatch,
        authorization: &AuthorizationMap,
        bypass: &BypassFlags,
    ) -> Result<GuardReport, GuardError> {
        let chain_start = Instant::now();
        let context = GuardContext {
            caller,
            batch,
            authorization,
            config: &self.config,
        };

        let mut stage_results = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            if !self.enabled(stage.kind(), bypass) {
                stage_results.push(StageResult {
                    stage_name: stage.name().to_string(),
                    outcome: StageOutcome::Skipped,
                    reason: None,
                    elapsed: Duration::ZERO,
                });
                continue;
            }

            let stage_start = Instant::now();
            let decision = stage.evaluate(&context).await?;
            let elapsed = stage_start.elapsed();

            match decision {
                StageDecision::Pass => stage_results.push(StageResult {
                    stage_name: stage.name().to_string(),
                    outcome: StageOutcome::Passed,
                    reason: None,
                    elapsed,
                }),
                StageDecision::Fail { kind, reason } => {
                    tracing::info!(stage = stage.name(), ?kind, %reason, "guard chain rejected batch");
                    stage_results.push(StageResult {
                        stage_name: stage.name().to_string(),
                        outcome: StageOutcome::Failed,
                        reason: Some(reason.clone()),
                        elapsed,
                    });
                    return Ok(GuardReport {
                        decision: GuardDecision::Rejected {
                            stage: stage.name().to_string(),
                            kind,
                            reason,
                        },
                        stage_results,
                        elapsed: chain_start.elapsed(),
                    });
                }
            }
        }

        Ok(GuardReport {
            decision: GuardDecision::Accepted,
            stage_results,
            elapsed: chain_start.elapsed(),
        })
    }
}
