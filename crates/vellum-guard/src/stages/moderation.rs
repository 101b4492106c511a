use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use vellum_types::{Action, CanonicalId};

use crate::error::{GuardError, GuardResult};
use crate::stage::{GuardContext, GuardKind, GuardStage, RejectionKind, StageDecision};

/// Verdict from a content-moderation service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModerationVerdict {
    Clean,
    Rejected { reason: String },
}

/// External content-moderation checker.
#[async_trait]
pub trait ContentModerator: Send + Sync {
    /// Judge every text fragment of one batch in a single call.
    async fn check(&self, texts: &[String]) -> GuardResult<ModerationVerdict>;
}

/// Moderator that accepts everything.
pub struct AllowAllModerator;

#[async_trait]
impl ContentModerator for AllowAllModerator {
    async fn check(&self, _texts: &[String]) -> GuardResult<ModerationVerdict> {
        Ok(ModerationVerdict::Clean)
    }
}

/// Moderator that rejects text containing any blocked word, matched
/// case-insensitively on word boundaries.
pub struct BlocklistModerator {
    blocked: Vec<String>,
}

impl BlocklistModerator {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocked: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl ContentModerator for BlocklistModerator {
    async fn check(&self, texts: &[String]) -> GuardResult<ModerationVerdict> {
        for text in texts {
            let lowered = text.to_lowercase();
            let hit = lowered
                .split(|c: char| !c.is_alphanumeric())
                .find(|word| self.blocked.iter().any(|b| b.as_str() == *word));
            if let Some(word) = hit {
                return Ok(ModerationVerdict::Rejected {
                    reason: format!("blocked term '{word}'"),
                });
            }
        }
        Ok(ModerationVerdict::Clean)
    }
}

/// Submits the text of every create and update to a [`ContentModerator`].
pub struct ModerationStage {
    moderator: Arc<dyn ContentModerator>,
}

impl ModerationStage {
    pub fn new(moderator: Arc<dyn ContentModerator>) -> Self {
        Self { moderator }
    }
}

#[async_trait]
impl GuardStage for ModerationStage {
    fn kind(&self) -> GuardKind {
        GuardKind::Moderation
    }

    fn name(&self) -> &str {
        "moderation"
    }

    async fn evaluate(&self, context: &GuardContext<'_>) -> Result<StageDecision, GuardError> {
        let limit = context.config.max_moderation_chars;
        let mut texts = Vec::new();
        for item in context
            .batch
            .items
            .iter()
            .filter(|i| matches!(i.action, Action::Create | Action::Update))
        {
            collect_text(&item.input, limit, &mut texts);
        }

        if texts.is_empty() {
            return Ok(StageDecision::Pass);
        }

        match self.moderator.check(&texts).await? {
            ModerationVerdict::Clean => Ok(StageDecision::Pass),
            ModerationVerdict::Rejected { reason } => {
                Ok(StageDecision::fail(RejectionKind::ContentRejected, reason))
            }
        }
    }
}

/// Gather string leaves, skipping ids and truncating to `limit` chars.
fn collect_text(value: &Value, limit: usize, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() && !CanonicalId::is_canonical(s) => {
            out.push(s.chars().take(limit).collect());
        }
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, limit, out)),
        Value::Object(map) => map.values().for_each(|v| collect_text(v, limit, out)),
        _ => {}
    }
}
