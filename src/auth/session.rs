use std::sync::Arc;

use anyhow::Context;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::extractors::{SessionContext, SESSION_COOKIE};
use crate::auth::repo::SessionRepo;
use crate::auth::repo_types::{SessionRecord, User};
use crate::config::SessionConfig;
use crate::error::{AppError, AppResult};

/// Signing and verification keys for session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl From<&SessionConfig> for SessionKeys {
    fn from(cfg: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }
}

impl SessionKeys {
    fn sign(&self, session: &SessionRecord) -> anyhow::Result<String> {
        let claims = Claims {
            sub: session.user_id,
            sid: session.id,
            iat: session.created_at.unix_timestamp() as usize,
            exp: session.expires_at.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = session.user_id, session_id = %session.id, "session token signed");
        Ok(token)
    }

    fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

/// A freshly opened session, ready to hand to the client.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub remember: bool,
    pub expires_at: OffsetDateTime,
}

/// Turns verified credentials into a session and resolves sessions back into
/// users.
#[derive(Clone)]
pub struct SessionAuthenticator {
    repo: Arc<dyn SessionRepo>,
    keys: SessionKeys,
    ttl: Duration,
    remember_ttl: Duration,
    cookie_secure: bool,
}

impl SessionAuthenticator {
    pub fn new(repo: Arc<dyn SessionRepo>, cfg: &SessionConfig) -> Self {
        Self {
            repo,
            keys: SessionKeys::from(cfg),
            ttl: Duration::minutes(cfg.ttl_minutes),
            remember_ttl: Duration::days(cfg.remember_days),
            cookie_secure: cfg.cookie_secure,
        }
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn establish(&self, user: &User, remember: bool) -> AppResult<IssuedSession> {
        let now = OffsetDateTime::now_utc();
        let ttl = if remember { self.remember_ttl } else { self.ttl };
        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            remember,
            created_at: now,
            expires_at: now + ttl,
        };
        let token = self.keys.sign(&record).context("sign session token")?;
        self.repo.open(record.clone()).await?;

        info!(session_id = %record.id, remember, "session established");
        Ok(IssuedSession {
            token,
            remember,
            expires_at: record.expires_at,
        })
    }

    pub async fn current_identity(&self, ctx: &SessionContext) -> AppResult<Option<User>> {
        let Some(claims) = self.claims(ctx) else {
            return Ok(None);
        };
        self.repo
            .find_user(claims.sid, claims.sub, OffsetDateTime::now_utc())
            .await
    }

    /// Precondition for every protected operation.
    pub async fn require_identity(&self, ctx: &SessionContext) -> AppResult<User> {
        self.current_identity(ctx)
            .await?
            .ok_or(AppError::Unauthenticated)
    }

    #[instrument(skip(self, ctx))]
    pub async fn end(&self, ctx: &SessionContext) -> AppResult<()> {
        if let Some(claims) = self.claims(ctx) {
            if self.repo.close(claims.sid).await? {
                info!(user_id = claims.sub, session_id = %claims.sid, "session ended");
            }
        }
        Ok(())
    }

    /// Cookie carrying the session token. Sessions opened without "remember
    /// me" get no `Max-Age`, so the browser drops them when it closes.
    pub fn cookie(&self, issued: &IssuedSession) -> Cookie<'static> {
        let mut builder = Cookie::build((SESSION_COOKIE, issued.token.clone()))
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .path("/");
        if issued.remember {
            builder = builder.max_age(issued.expires_at - OffsetDateTime::now_utc());
        }
        builder.build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE).path("/").build()
    }

    fn claims(&self, ctx: &SessionContext) -> Option<Claims> {
        let token = ctx.token()?;
        match self.keys.verify(token) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, "invalid or expired session token");
                None
            }
        }
    }
}
