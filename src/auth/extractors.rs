use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;

pub const SESSION_COOKIE: &str = "taskdock_session";

/// Session token presented with a request, if any. Carries no identity by
/// itself; handlers resolve it with `SessionAuthenticator::require_identity`.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    token: Option<String>,
}

impl SessionContext {
    pub fn from_token(token: String) -> Self {
        Self { token: Some(token) }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Cookie first (browser pages), then "Bearer <token>" (API clients)
        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            if !cookie.value().is_empty() {
                return Ok(Self::from_token(cookie.value().to_string()));
            }
        }

        let bearer = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|auth| {
                auth.strip_prefix("Bearer ")
                    .or_else(|| auth.strip_prefix("bearer "))
            })
            .map(str::trim)
            .filter(|t| !t.is_empty());

        Ok(match bearer {
            Some(token) => Self::from_token(token.to_string()),
            None => Self::anonymous(),
        })
    }
}
