use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::AppResult;
use crate::tasks::repo_types::{Task, TaskStats};

/// Task persistence. Every call naming a task id also names its owner and
/// the two are matched together; a task owned by someone else is simply
/// absent.
#[async_trait]
pub trait TaskRepo: Send + Sync {
    /// Newest first.
    async fn list(&self, owner_id: i64) -> AppResult<Vec<Task>>;
    async fn find(&self, owner_id: i64, id: i64) -> AppResult<Option<Task>>;
    async fn create(
        &self,
        owner_id: i64,
        title: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> AppResult<Task>;
    async fn toggle(&self, owner_id: i64, id: i64, now: OffsetDateTime) -> AppResult<Option<Task>>;
    async fn update(
        &self,
        owner_id: i64,
        id: i64,
        title: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> AppResult<Option<Task>>;
    async fn remove(&self, owner_id: i64, id: i64) -> AppResult<bool>;
    async fn stats(&self, owner_id: i64) -> AppResult<TaskStats>;
}

#[derive(Clone)]
pub struct PgTaskRepo {
    db: PgPool,
}

impl PgTaskRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskRepo for PgTaskRepo {
    async fn list(&self, owner_id: i64) -> AppResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, owner_id, title, description, completed, created_at, updated_at
            FROM tasks
            WHERE owner_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find(&self, owner_id: i64, id: i64) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, owner_id, title, description, completed, created_at, updated_at
            FROM tasks
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn create(
        &self,
        owner_id: i64,
        title: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> AppResult<Task> {
        let row = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (owner_id, title, description, completed, created_at, updated_at)
            VALUES ($1, $2, $3, FALSE, $4, $4)
            RETURNING id, owner_id, title, description, completed, created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(title)
        .bind(description)
        .bind(now)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn toggle(&self, owner_id: i64, id: i64, now: OffsetDateTime) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
               SET completed = NOT completed, updated_at = $3
             WHERE id = $1 AND owner_id = $2
            RETURNING id, owner_id, title, description, completed, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(
        &self,
        owner_id: i64,
        id: i64,
        title: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
               SET title = $3, description = $4, updated_at = $5
             WHERE id = $1 AND owner_id = $2
            RETURNING id, owner_id, title, description, completed, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(title)
        .bind(description)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn remove(&self, owner_id: i64, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn stats(&self, owner_id: i64) -> AppResult<TaskStats> {
        let (total, completed) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE completed)
            FROM tasks
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.db)
        .await?;
        Ok(TaskStats::from_counts(total, completed))
    }
}
