use async_trait::async_trait;
use axum::http::HeaderMap;
use vellum_types::Caller;

use crate::error::{ServerError, ServerResult};

/// Header carrying the caller's user id.
pub const USER_HEADER: &str = "x-vellum-user";
/// Header marking the caller as an admin (`true` or `1`).
pub const ADMIN_HEADER: &str = "x-vellum-admin";
/// Comma-separated preferred languages.
pub const LANGUAGE_HEADER: &str = "accept-language";

/// What the request claims about its caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub admin: bool,
    pub languages: Vec<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> ServerResult<Self> {
        let text = |name: &str| -> ServerResult<Option<String>> {
            headers
                .get(name)
                .map(|v| {
                    v.to_str()
                        .map(|s| s.trim().to_string())
                        .map_err(|_| ServerError::AuthFailed(format!("{name} is not valid text")))
                })
                .transpose()
        };
        let user = text(USER_HEADER)?.filter(|u| !u.is_empty());
        let admin = matches!(text(ADMIN_HEADER)?.as_deref(), Some("true" | "1"));
        let languages = text(LANGUAGE_HEADER)?
            .map(|raw| {
                raw.split(',')
                    .filter_map(|part| part.split(';').next())
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            user,
            admin,
            languages,
        })
    }
}

/// Turns request credentials into the [`Caller`] the engine runs as.
///
/// Session issuance lives outside this service; a deployment plugs its own
/// verifier in here.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Caller>;
}

/// Trusts the identity headers as sent. For development and for
/// deployments behind a gateway that sets them.
pub struct TrustedHeaders;

#[async_trait]
impl IdentityProvider for TrustedHeaders {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Caller> {
        let mut caller = match &credentials.user {
            Some(user) if credentials.admin => Caller::admin(user.clone()),
            Some(user) => Caller::user(user.clone()),
            None if credentials.admin => {
                return Err(ServerError::AuthFailed(format!(
                    "{ADMIN_HEADER} requires {USER_HEADER}"
                )))
            }
            None => Caller::anonymous(),
        };
        caller.languages = credentials.languages.clone();
        Ok(caller)
    }
}
