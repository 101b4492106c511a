//! Built-in guard stages.

pub mod moderation;
pub mod permission;
pub mod quota;

pub use moderation::{AllowAllModerator, BlocklistModerator, ContentModerator, ModerationStage, ModerationVerdict};
pub use permission::PermissionStage;
pub use quota::{QuotaLookup, QuotaStage};
