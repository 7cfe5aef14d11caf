use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use crate::auth::repo_types::User;
use crate::error::{AppError, AppResult};
use crate::tasks::repo::TaskRepo;
use crate::tasks::repo_types::{Task, TaskStats};

pub const MAX_TITLE_LEN: usize = 100;

/// CRUD over tasks, always on behalf of an authenticated owner. Missing tasks
/// and tasks belonging to other users both come back as `NotFound`.
#[derive(Clone)]
pub struct TaskStore {
    repo: Arc<dyn TaskRepo>,
}

impl TaskStore {
    pub fn new(repo: Arc<dyn TaskRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, owner: &User) -> AppResult<Vec<Task>> {
        self.repo.list(owner.id).await
    }

    pub async fn get(&self, owner: &User, task_id: i64) -> AppResult<Task> {
        self.repo
            .find(owner.id, task_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    #[instrument(skip(self, owner, title, description), fields(owner_id = owner.id))]
    pub async fn create(
        &self,
        owner: &User,
        title: &str,
        description: Option<&str>,
    ) -> AppResult<Task> {
        let (title, description) = normalize(title, description)?;
        let task = self
            .repo
            .create(owner.id, title, description, OffsetDateTime::now_utc())
            .await?;
        info!(task_id = task.id, "task created");
        Ok(task)
    }

    #[instrument(skip(self, owner), fields(owner_id = owner.id))]
    pub async fn toggle_complete(&self, owner: &User, task_id: i64) -> AppResult<Task> {
        let task = self
            .repo
            .toggle(owner.id, task_id, OffsetDateTime::now_utc())
            .await?
            .ok_or(AppError::NotFound)?;
        debug!(completed = task.completed, "task toggled");
        Ok(task)
    }

    #[instrument(skip(self, owner, title, description), fields(owner_id = owner.id))]
    pub async fn edit(
        &self,
        owner: &User,
        task_id: i64,
        title: &str,
        description: Option<&str>,
    ) -> AppResult<Task> {
        let (title, description) = normalize(title, description)?;
        self.repo
            .update(owner.id, task_id, title, description, OffsetDateTime::now_utc())
            .await?
            .ok_or(AppError::NotFound)
    }

    #[instrument(skip(self, owner), fields(owner_id = owner.id))]
    pub async fn delete(&self, owner: &User, task_id: i64) -> AppResult<()> {
        if !self.repo.remove(owner.id, task_id).await? {
            return Err(AppError::NotFound);
        }
        info!("task deleted");
        Ok(())
    }

    pub async fn stats(&self, owner: &User) -> AppResult<TaskStats> {
        self.repo.stats(owner.id).await
    }
}

/// Trims the title and drops a blank description.
fn normalize<'a>(
    title: &'a str,
    description: Option<&'a str>,
) -> AppResult<(&'a str, Option<&'a str>)> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::invalid("Title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::invalid(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    let description = description.filter(|d| !d.trim().is_empty());
    Ok((title, description))
}
