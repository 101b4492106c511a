use async_trait::async_trait;
use vellum_types::Action;

use crate::error::GuardError;
use crate::stage::{GuardContext, GuardKind, GuardStage, RejectionKind, StageDecision};

/// Ownership check against the batch's [`AuthorizationMap`].
///
/// - Anonymous callers may not mutate anything.
/// - Update targets must exist and be writable by the caller.
/// - Delete targets must be writable when they exist; targets that are
///   already gone pass and are dropped by the planner.
/// - Referenced objects must be public, owned, or shared with the caller.
///
/// [`AuthorizationMap`]: crate::authz::AuthorizationMap
pub struct PermissionStage;

#[async_trait]
impl GuardStage for PermissionStage {
    fn kind(&self) -> GuardKind {
        GuardKind::Permission
    }

    fn name(&self) -> &str {
        "permission"
    }

    async fn evaluate(&self, context: &GuardContext<'_>) -> Result<StageDecision, GuardError> {
        let caller = context.caller;
        if caller.is_anonymous() && !context.batch.items.is_empty() {
            return Ok(StageDecision::fail(
                RejectionKind::Unauthorized,
                "anonymous callers cannot mutate objects",
            ));
        }

        for item in &context.batch.items {
            if let Some(target) = item.target {
                match (item.action, context.authorization.get(&target)) {
                    (Action::Update, None) => {
                        return Ok(StageDecision::fail(
                            RejectionKind::NotFound,
                            format!("{} {target} not found", item.object_type),
                        ));
                    }
                    (Action::Update | Action::Delete, Some(snapshot))
                        if !snapshot.can_write(caller) =>
                    {
                        return Ok(StageDecision::fail(
                            RejectionKind::Unauthorized,
                            format!(
                                "caller may not {} {} {target}",
                                item.action.as_str().to_lowercase(),
                                item.object_type
                            ),
                        ));
                    }
                    _ => {}
                }
            }

            for (object_type, id) in &item.references {
                match context.authorization.get(id) {
                    None => {
                        return Ok(StageDecision::fail(
                            RejectionKind::NotFound,
                            format!("referenced {object_type} {id} not found"),
                        ));
                    }
                    Some(snapshot) if !snapshot.can_reference(caller) => {
                        return Ok(StageDecision::fail(
                            RejectionKind::Unauthorized,
                            format!("caller may not reference {object_type} {id}"),
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(StageDecision::Pass)
    }
}
