//! Server-rendered pages. Every protected page resolves the session itself
//! and sends anonymous visitors to `/login`.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};

use crate::{error::AppError, state::AppState};

pub mod handlers;
pub mod templates;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::index))
        .route("/register", get(handlers::register_page).post(handlers::register_submit))
        .route("/login", get(handlers::login_page).post(handlers::login_submit))
        .route("/logout", get(handlers::logout))
        .route("/add", post(handlers::add_task))
        .route("/complete/:id", get(handlers::complete_task))
        .route("/delete/:id", get(handlers::delete_task))
        .route("/edit/:id", get(handlers::edit_page).post(handlers::edit_submit))
        .route("/profile", get(handlers::profile))
}

/// Error of a page handler: anonymous requests become a redirect, the rest
/// answer like the API does.
#[derive(Debug)]
pub struct PageError(AppError);

pub type PageResult = Result<Response, PageError>;

impl From<AppError> for PageError {
    fn from(e: AppError) -> Self {
        Self(e)
    }
}

impl From<askama::Error> for PageError {
    fn from(e: askama::Error) -> Self {
        Self(AppError::Internal(anyhow::anyhow!("render template: {}", e)))
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self.0 {
            AppError::Unauthenticated => Redirect::to("/login").into_response(),
            other => other.into_response(),
        }
    }
}

pub(crate) fn render<T: Template>(status: StatusCode, page: T) -> PageResult {
    Ok((status, Html(page.render()?)).into_response())
}
