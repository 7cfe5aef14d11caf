use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, SessionRecord, User};
use crate::db;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Inserts a user; a taken username or email comes back as the matching
    /// duplicate error.
    async fn insert(&self, user: NewUser) -> AppResult<User>;
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;
    /// Removes the user together with its tasks and sessions.
    async fn delete(&self, id: i64) -> AppResult<bool>;
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Stores a new session, dropping the owner's expired ones.
    async fn open(&self, session: SessionRecord) -> AppResult<()>;
    /// Owner of a live session, matched on session id and user id together.
    async fn find_user(
        &self,
        session_id: Uuid,
        user_id: i64,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>>;
    async fn close(&self, session_id: Uuid) -> AppResult<bool>;
}

/// Domain error for a tripped unique constraint on `users`.
fn duplicate_for(constraint: &str) -> Option<AppError> {
    match constraint {
        "users_username_key" => Some(AppError::DuplicateUsername),
        "users_email_key" => Some(AppError::DuplicateEmail),
        _ => None,
    }
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert(&self, user: NewUser) -> AppResult<User> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(u) => Ok(u),
            Err(e) => Err(db::unique_violation(&e)
                .and_then(|constraint| duplicate_for(&constraint))
                .unwrap_or_else(|| e.into())),
        }
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgSessionRepo {
    db: PgPool,
}

impl PgSessionRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionRepo for PgSessionRepo {
    async fn open(&self, session: SessionRecord) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND expires_at <= $2")
            .bind(session.user_id)
            .bind(session.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, remember, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.remember)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_user(
        &self,
        session_id: Uuid,
        user_id: i64,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.email, u.password_hash, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = $1 AND s.user_id = $2 AND s.expires_at > $3
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn close(&self, session_id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
