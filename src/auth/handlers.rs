use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        extractors::SessionContext,
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let user = state
        .credentials
        .register(payload.as_registration())
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let user = state
        .credentials
        .verify(&payload.username, &payload.password)
        .await?;
    let issued = state.sessions.establish(&user, payload.remember).await?;
    let jar = jar.add(state.sessions.cookie(&issued));

    Ok((
        jar,
        Json(AuthResponse {
            token: issued.token,
            expires_at: issued.expires_at,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, ctx, jar))]
pub async fn logout(
    State(state): State<AppState>,
    ctx: SessionContext,
    jar: CookieJar,
) -> AppResult<(CookieJar, StatusCode)> {
    state.sessions.end(&ctx).await?;
    Ok((jar.remove(state.sessions.removal_cookie()), StatusCode::NO_CONTENT))
}

#[instrument(skip(state, ctx))]
pub async fn get_me(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> AppResult<Json<PublicUser>> {
    let user = state.sessions.require_identity(&ctx).await?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod me_tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn public_user_serialization_hides_hash() {
        let user = crate::auth::repo_types::User {
            id: 7,
            username: "alice".into(),
            email: "test@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));

        let public: PublicUser = user.into();
        let json = serde_json::to_string(&public).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("\"created_at\":\"1970-01-01T00:00:00Z\""));
    }
}
