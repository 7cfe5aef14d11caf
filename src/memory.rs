use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo::{SessionRepo, UserRepo};
use crate::auth::repo_types::{NewUser, SessionRecord, User};
use crate::error::{AppError, AppResult};
use crate::tasks::repo::TaskRepo;
use crate::tasks::repo_types::{Task, TaskStats};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    tasks: BTreeMap<i64, Task>,
    sessions: HashMap<Uuid, SessionRecord>,
    last_user_id: i64,
    last_task_id: i64,
}

impl Tables {
    /// Task matched on id and owner together; foreign tasks are absent.
    fn owned(&self, owner_id: i64, id: i64) -> Option<&Task> {
        self.tasks.get(&id).filter(|t| is_owned(t, owner_id, id))
    }

    fn owned_mut(&mut self, owner_id: i64, id: i64) -> Option<&mut Task> {
        self.tasks.get_mut(&id).filter(|t| is_owned(t, owner_id, id))
    }
}

fn is_owned(task: &Task, owner_id: i64, id: i64) -> bool {
    task.id == id && task.owner_id == owner_id
}

/// Process-local store with the same constraints as the Postgres schema:
/// unique usernames and emails, owner references that must exist, and
/// cascading deletes from users.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[cfg(test)]
    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

fn unknown_user(user_id: i64) -> AppError {
    AppError::Internal(anyhow::anyhow!("user {} does not exist", user_id))
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn insert(&self, user: NewUser) -> AppResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.username == user.username) {
            return Err(AppError::DuplicateUsername);
        }
        if t.users.values().any(|u| u.email == user.email) {
            return Err(AppError::DuplicateEmail);
        }
        t.last_user_id += 1;
        let row = User {
            id: t.last_user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        if t.users.remove(&id).is_none() {
            return Ok(false);
        }
        t.tasks.retain(|_, task| task.owner_id != id);
        t.sessions.retain(|_, s| s.user_id != id);
        Ok(true)
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn open(&self, session: SessionRecord) -> AppResult<()> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&session.user_id) {
            return Err(unknown_user(session.user_id));
        }
        let now = session.created_at;
        t.sessions
            .retain(|_, s| s.user_id != session.user_id || s.expires_at > now);
        t.sessions.insert(session.id, session);
        Ok(())
    }

    async fn find_user(
        &self,
        session_id: Uuid,
        user_id: i64,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>> {
        let t = self.tables.read().await;
        let user = t
            .sessions
            .get(&session_id)
            .filter(|s| s.user_id == user_id && s.expires_at > now)
            .and_then(|s| t.users.get(&s.user_id))
            .cloned();
        Ok(user)
    }

    async fn close(&self, session_id: Uuid) -> AppResult<bool> {
        Ok(self.tables.write().await.sessions.remove(&session_id).is_some())
    }
}

#[async_trait]
impl TaskRepo for MemoryStore {
    async fn list(&self, owner_id: i64) -> AppResult<Vec<Task>> {
        let t = self.tables.read().await;
        let mut tasks: Vec<Task> = t
            .tasks
            .values()
            .filter(|task| task.owner_id == owner_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tasks)
    }

    async fn find(&self, owner_id: i64, id: i64) -> AppResult<Option<Task>> {
        Ok(self.tables.read().await.owned(owner_id, id).cloned())
    }

    async fn create(
        &self,
        owner_id: i64,
        title: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> AppResult<Task> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&owner_id) {
            return Err(unknown_user(owner_id));
        }
        t.last_task_id += 1;
        let task = Task {
            id: t.last_task_id,
            owner_id,
            title: title.to_string(),
            description: description.map(str::to_string),
            completed: false,
            created_at: now,
            updated_at: now,
        };
        t.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn toggle(&self, owner_id: i64, id: i64, now: OffsetDateTime) -> AppResult<Option<Task>> {
        let mut t = self.tables.write().await;
        Ok(t.owned_mut(owner_id, id).map(|task| {
            task.completed = !task.completed;
            task.updated_at = now;
            task.clone()
        }))
    }

    async fn update(
        &self,
        owner_id: i64,
        id: i64,
        title: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> AppResult<Option<Task>> {
        let mut t = self.tables.write().await;
        Ok(t.owned_mut(owner_id, id).map(|task| {
            task.title = title.to_string();
            task.description = description.map(str::to_string);
            task.updated_at = now;
            task.clone()
        }))
    }

    async fn remove(&self, owner_id: i64, id: i64) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        let owned = t.owned(owner_id, id).is_some();
        if owned {
            t.tasks.remove(&id);
        }
        Ok(owned)
    }

    async fn stats(&self, owner_id: i64) -> AppResult<TaskStats> {
        let t = self.tables.read().await;
        let (total, completed) = t
            .tasks
            .values()
            .filter(|task| task.owner_id == owner_id)
            .fold((0, 0), |(total, done), task| {
                (total + 1, done + i64::from(task.completed))
            });
        Ok(TaskStats::from_counts(total, completed))
    }
}
