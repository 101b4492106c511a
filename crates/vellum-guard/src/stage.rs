use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vellum_types::{Action, CanonicalId, Caller, ObjectType};

use crate::authz::AuthorizationMap;
use crate::config::GuardConfig;
use crate::error::GuardError;

// ---------------------------------------------------------------------------
// GuardBatch
// ---------------------------------------------------------------------------

/// One batch item as the guard chain sees it: ids already canonical,
/// input already validated.
#[derive(Clone, Debug)]
pub struct GuardItem {
    /// Position in the caller's batch.
    pub index: usize,
    pub action: Action,
    pub object_type: ObjectType,
    /// The existing object being updated or deleted. `None` for creates and
    /// for objects created in the same batch.
    pub target: Option<CanonicalId>,
    /// Normalized input (empty object for deletes).
    pub input: Value,
    /// Existing objects referenced by this item, excluding objects created
    /// in the same batch.
    pub references: Vec<(ObjectType, CanonicalId)>,
}

/// The whole batch, in caller order.
#[derive(Clone, Debug, Default)]
pub struct GuardBatch {
    pub items: Vec<GuardItem>,
}

impl GuardBatch {
    pub fn new(items: Vec<GuardItem>) -> Self {
        Self { items }
    }

    /// Items performing `action`.
    pub fn with_action(&self, action: Action) -> impl Iterator<Item = &GuardItem> {
        self.items.iter().filter(move |i| i.action == action)
    }
}

// ---------------------------------------------------------------------------
// Bypass flags
// ---------------------------------------------------------------------------

/// The gated stages, in chain order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    Permission,
    Moderation,
    Quota,
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Permission => "permission",
            Self::Moderation => "moderation",
            Self::Quota => "quota",
        })
    }
}

/// Per-call switches for trusted and seeding callers.
///
/// `validation` and `triggers` are honoured by the engine around the chain;
/// the other three switch off the matching guard stage. ID resolution has
/// no switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassFlags {
    pub validation: bool,
    pub permission: bool,
    pub moderation: bool,
    pub quota: bool,
    pub triggers: bool,
}

impl BypassFlags {
    /// Skip every optional stage.
    pub fn all() -> Self {
        Self {
            validation: true,
            permission: true,
            moderation: true,
            quota: true,
            triggers: true,
        }
    }

    pub fn bypasses(&self, kind: GuardKind) -> bool {
        match kind {
            GuardKind::Permission => self.permission,
            GuardKind::Moderation => self.moderation,
            GuardKind::Quota => self.quota,
        }
    }
}

// ---------------------------------------------------------------------------
// StageDecision
// ---------------------------------------------------------------------------

/// Why a stage rejected the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Unauthorized,
    NotFound,
    QuotaExceeded,
    ContentRejected,
}

/// The outcome of a single stage evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageDecision {
    /// The stage passed; proceed to the next stage.
    Pass,
    /// The stage failed; the batch is rejected.
    Fail { kind: RejectionKind, reason: String },
}

impl StageDecision {
    pub fn fail(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self::Fail {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Passed,
    Failed,
    Skipped,
}

/// Recorded result from one stage, for the audit trail.
#[derive(Clone, Debug, Serialize)]
pub struct StageResult {
    pub stage_name: String,
    pub outcome: StageOutcome,
    /// Populated on failure.
    pub reason: Option<String>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// GuardContext
// ---------------------------------------------------------------------------

/// Everything a stage may look at. Nothing in here is mutable.
pub struct GuardContext<'a> {
    pub caller: &'a Caller,
    pub batch: &'a GuardBatch,
    pub authorization: &'a AuthorizationMap,
    pub config: &'a GuardConfig,
}

// ---------------------------------------------------------------------------
// GuardStage trait
// ---------------------------------------------------------------------------

/// A single check in the guard chain.
///
/// Stages run in order and may consult external services, hence `async`.
/// The trait is object-safe so stages can live in a `Vec<Box<dyn GuardStage>>`.
#[async_trait]
pub trait GuardStage: Send + Sync {
    fn kind(&self) -> GuardKind;

    fn name(&self) -> &str;

    async fn evaluate(&self, context: &GuardContext<'_>) -> Result<StageDecision, GuardError>;
}
