use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Form,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tracing::instrument;

use crate::{
    auth::{
        dto::RegisterRequest, extractors::SessionContext, repo_types::User,
        services::CredentialStore, session::SessionAuthenticator,
    },
    error::AppError,
    pages::{
        render,
        templates::{
            display_time, EditTemplate, IndexTemplate, LoginTemplate, ProfileTemplate,
            RegisterTemplate, TaskView,
        },
        PageResult,
    },
    state::AppState,
    tasks::{dto::TaskRequest, services::TaskStore},
};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Checkbox; present ("on") when ticked.
    #[serde(default)]
    pub remember: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub registered: Option<String>,
}

fn register_template(
    credentials: &CredentialStore,
    username: &str,
    email: &str,
    error: String,
) -> RegisterTemplate {
    let rules = credentials.rules();
    RegisterTemplate {
        username: username.to_string(),
        email: email.to_string(),
        error,
        min_password_length: rules.min_password_length,
        require_confirmation: rules.require_confirmation,
    }
}

#[instrument(skip_all)]
pub async fn index(
    State(sessions): State<SessionAuthenticator>,
    State(tasks): State<TaskStore>,
    ctx: SessionContext,
) -> PageResult {
    let user = sessions.require_identity(&ctx).await?;
    index_page(&tasks, user, StatusCode::OK, String::new(), TaskRequest::default()).await
}

async fn index_page(
    tasks: &TaskStore,
    user: User,
    status: StatusCode,
    error: String,
    form: TaskRequest,
) -> PageResult {
    let list = tasks.list(&user).await?;
    render(
        status,
        IndexTemplate {
            username: user.username,
            tasks: list.into_iter().map(TaskView::from).collect(),
            error,
            title: form.title,
            description: form.description.unwrap_or_default(),
        },
    )
}

pub async fn register_page(State(credentials): State<CredentialStore>) -> PageResult {
    render(
        StatusCode::OK,
        register_template(&credentials, "", "", String::new()),
    )
}

#[instrument(skip_all)]
pub async fn register_submit(
    State(credentials): State<CredentialStore>,
    Form(form): Form<RegisterRequest>,
) -> PageResult {
    match credentials.register(form.as_registration()).await {
        Ok(_) => Ok(Redirect::to("/login?registered=1").into_response()),
        Err(e @ (AppError::InvalidInput(_) | AppError::DuplicateUsername | AppError::DuplicateEmail)) => {
            render(
                e.status(),
                register_template(&credentials, &form.username, &form.email, e.to_string()),
            )
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn login_page(Query(q): Query<LoginQuery>) -> PageResult {
    let notice = match q.registered {
        Some(_) => "Registration successful! Please log in.".to_string(),
        None => String::new(),
    };
    render(
        StatusCode::OK,
        LoginTemplate {
            notice,
            ..Default::default()
        },
    )
}

#[instrument(skip_all)]
pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> PageResult {
    let user = match state.credentials.verify(&form.username, &form.password).await {
        Ok(u) => u,
        Err(e @ AppError::InvalidCredentials) => {
            return render(
                e.status(),
                LoginTemplate {
                    username: form.username,
                    error: e.to_string(),
                    ..Default::default()
                },
            )
        }
        Err(e) => return Err(e.into()),
    };

    let issued = state
        .sessions
        .establish(&user, form.remember.is_some())
        .await?;
    Ok((jar.add(state.sessions.cookie(&issued)), Redirect::to("/")).into_response())
}

#[instrument(skip_all)]
pub async fn logout(
    State(sessions): State<SessionAuthenticator>,
    ctx: SessionContext,
    jar: CookieJar,
) -> PageResult {
    sessions.end(&ctx).await?;
    Ok((jar.remove(sessions.removal_cookie()), Redirect::to("/login")).into_response())
}

#[instrument(skip_all)]
pub async fn add_task(
    State(sessions): State<SessionAuthenticator>,
    State(tasks): State<TaskStore>,
    ctx: SessionContext,
    Form(form): Form<TaskRequest>,
) -> PageResult {
    let user = sessions.require_identity(&ctx).await?;
    let created = tasks
        .create(&user, &form.title, form.description.as_deref())
        .await;
    match created {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(AppError::InvalidInput(msg)) => {
            index_page(&tasks, user, StatusCode::BAD_REQUEST, msg, form).await
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(sessions, tasks, ctx))]
pub async fn complete_task(
    State(sessions): State<SessionAuthenticator>,
    State(tasks): State<TaskStore>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> PageResult {
    let user = sessions.require_identity(&ctx).await?;
    tasks.toggle_complete(&user, id).await?;
    Ok(Redirect::to("/").into_response())
}

#[instrument(skip(sessions, tasks, ctx))]
pub async fn delete_task(
    State(sessions): State<SessionAuthenticator>,
    State(tasks): State<TaskStore>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> PageResult {
    let user = sessions.require_identity(&ctx).await?;
    tasks.delete(&user, id).await?;
    Ok(Redirect::to("/").into_response())
}

#[instrument(skip(sessions, tasks, ctx))]
pub async fn edit_page(
    State(sessions): State<SessionAuthenticator>,
    State(tasks): State<TaskStore>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> PageResult {
    let user = sessions.require_identity(&ctx).await?;
    let task = tasks.get(&user, id).await?;
    render(
        StatusCode::OK,
        EditTemplate {
            username: user.username,
            task: task.into(),
            error: String::new(),
        },
    )
}

#[instrument(skip(sessions, tasks, ctx, form))]
pub async fn edit_submit(
    State(sessions): State<SessionAuthenticator>,
    State(tasks): State<TaskStore>,
    ctx: SessionContext,
    Path(id): Path<i64>,
    Form(form): Form<TaskRequest>,
) -> PageResult {
    let user = sessions.require_identity(&ctx).await?;
    match tasks
        .edit(&user, id, &form.title, form.description.as_deref())
        .await
    {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(AppError::InvalidInput(msg)) => {
            // re-show the submitted values, but only for a task the caller owns
            let mut view = TaskView::from(tasks.get(&user, id).await?);
            view.title = form.title;
            view.description = form.description.unwrap_or_default();
            render(
                StatusCode::BAD_REQUEST,
                EditTemplate {
                    username: user.username,
                    task: view,
                    error: msg,
                },
            )
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip_all)]
pub async fn profile(
    State(sessions): State<SessionAuthenticator>,
    State(tasks): State<TaskStore>,
    ctx: SessionContext,
) -> PageResult {
    let user = sessions.require_identity(&ctx).await?;
    let stats = tasks.stats(&user).await?;
    render(
        StatusCode::OK,
        ProfileTemplate {
            member_since: display_time(user.created_at),
            username: user.username,
            email: user.email,
            stats,
        },
    )
}
