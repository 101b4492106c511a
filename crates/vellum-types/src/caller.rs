use serde::{Deserialize, Serialize};

/// The identity on whose behalf a request runs.
///
/// Session issuance happens elsewhere; the engine only consumes the result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Stable user identifier, `None` for anonymous callers.
    pub user_id: Option<String>,
    /// Admins bypass ownership checks (never the guard chain as a whole).
    pub is_admin: bool,
    /// Preferred languages, most preferred first.
    #[serde(default)]
    pub languages: Vec<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            is_admin: false,
            languages: Vec::new(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
            is_admin: false,
            languages: Vec::new(),
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
            is_admin: true,
            languages: Vec::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    /// Returns `true` if `owner` names this caller.
    pub fn owns(&self, owner: Option<&str>) -> bool {
        matches!((self.user_id.as_deref(), owner), (Some(me), Some(o)) if me == o)
    }

    /// Name used in log fields. Not unique: a user may be called `anonymous`.
    pub fn log_name(&self) -> &str {
        self.user_id.as_deref().unwrap_or("anonymous")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership() {
        let alice = Caller::user("alice");
        assert!(alice.owns(Some("alice")));
        assert!(!alice.owns(Some("bob")));
        assert!(!alice.owns(None));
        assert!(!Caller::anonymous().owns(None));
    }

    #[test]
    fn log_name_for_anonymous() {
        assert_eq!(Caller::anonymous().log_name(), "anonymous");
        assert_eq!(Caller::admin("root").log_name(), "root");
    }
}
