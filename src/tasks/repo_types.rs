use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Task {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Per-owner counters, always derived from the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
}

impl TaskStats {
    pub fn from_counts(total: i64, completed: i64) -> Self {
        Self {
            total,
            completed,
            pending: total - completed,
        }
    }
}
