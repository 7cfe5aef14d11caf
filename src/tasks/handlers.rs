use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::SessionContext,
    error::AppResult,
    state::AppState,
    tasks::{
        dto::{TaskRequest, TaskResponse},
        repo_types::TaskStats,
    },
};

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:id", put(edit_task).delete(delete_task))
        .route("/tasks/:id/toggle", post(toggle_task))
        .route("/stats", get(task_stats))
}

#[instrument(skip(state, ctx))]
pub async fn list_tasks(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> AppResult<Json<Vec<TaskResponse>>> {
    let user = state.sessions.require_identity(&ctx).await?;
    let tasks = state.tasks.list(&user).await?;
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

#[instrument(skip(state, ctx, body))]
pub async fn create_task(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(body): Json<TaskRequest>,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    let user = state.sessions.require_identity(&ctx).await?;
    let task = state
        .tasks
        .create(&user, &body.title, body.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(task.into())))
}

#[instrument(skip(state, ctx, body))]
pub async fn edit_task(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
    Json(body): Json<TaskRequest>,
) -> AppResult<Json<TaskResponse>> {
    let user = state.sessions.require_identity(&ctx).await?;
    let task = state
        .tasks
        .edit(&user, id, &body.title, body.description.as_deref())
        .await?;
    Ok(Json(task.into()))
}

#[instrument(skip(state, ctx))]
pub async fn toggle_task(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> AppResult<Json<TaskResponse>> {
    let user = state.sessions.require_identity(&ctx).await?;
    let task = state.tasks.toggle_complete(&user, id).await?;
    Ok(Json(task.into()))
}

#[instrument(skip(state, ctx))]
pub async fn delete_task(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let user = state.sessions.require_identity(&ctx).await?;
    state.tasks.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, ctx))]
pub async fn task_stats(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> AppResult<Json<TaskStats>> {
    let user = state.sessions.require_identity(&ctx).await?;
    Ok(Json(state.tasks.stats(&user).await?))
}
