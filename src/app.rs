use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, pages, tasks};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(pages::router())
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(tasks::router()),
        )
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    // path only: query strings never reach the logs
                    let path = req.uri().path().to_string();
                    tracing::info_span!("http_request", %method, %path, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, Response};
    use tower::ServiceExt; // for `oneshot`

    use crate::auth::extractors::SESSION_COOKIE;

    async fn body_json(res: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(res: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn form_request(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn page(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn location(res: &Response<Body>) -> &str {
        res.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// Registers and logs in over the JSON API, returning the bearer token.
    async fn login(app: &Router, username: &str) -> String {
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({ "username": username, "email": format!("{}@x.com", username), "password": "secret1" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                None,
                json!({ "username": username, "password": "secret1" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(AppState::fake());
        let res = app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let app = build_app(AppState::fake());
        let res = app.oneshot(get("/nope", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await, json!({ "error": "Not found" }));
    }

    #[tokio::test]
    async fn api_requires_a_session() {
        let app = build_app(AppState::fake());
        for uri in ["/api/tasks", "/api/stats", "/api/me"] {
            let res = app.clone().oneshot(get(uri, None)).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
        let res = app
            .oneshot(get("/api/tasks", Some("garbage")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_conflicts_and_bad_input() {
        let app = build_app(AppState::fake());
        login(&app, "alice").await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({ "username": "alice", "email": "b@x.com", "password": "other" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(res).await["error"], "Username already exists");

        let res = app
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({ "username": "carol", "password": "pw" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = build_app(AppState::fake());
        login(&app, "alice").await;
        let res = app
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                None,
                json!({ "username": "alice", "password": "secret2" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn task_api_round_trip_is_owner_scoped() {
        let app = build_app(AppState::fake());
        let alice = login(&app, "alice").await;
        let bob = login(&app, "bob").await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/tasks",
                Some(&alice),
                json!({ "title": "buy milk", "description": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let task = body_json(res).await;
        assert_eq!(task["completed"], false);
        let id = task["id"].as_i64().unwrap();

        let res = app
            .clone()
            .oneshot(json_request("POST", &format!("/api/tasks/{}/toggle", id), Some(&alice), json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["completed"], true);

        for (method, uri) in [
            ("POST", format!("/api/tasks/{}/toggle", id)),
            ("PUT", format!("/api/tasks/{}", id)),
            ("DELETE", format!("/api/tasks/{}", id)),
        ] {
            let res = app
                .clone()
                .oneshot(json_request(method, &uri, Some(&bob), json!({ "title": "mine now" })))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
        }

        let res = app.clone().oneshot(get("/api/tasks", Some(&bob))).await.unwrap();
        assert_eq!(body_json(res).await, json!([]));

        let res = app.clone().oneshot(get("/api/tasks", Some(&alice))).await.unwrap();
        let list = body_json(res).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["title"], "buy milk");
        assert_eq!(list[0]["completed"], true);
        assert!(list[0]["created_at"].as_str().unwrap().contains('T'));

        let res = app.clone().oneshot(get("/api/stats", Some(&alice))).await.unwrap();
        assert_eq!(
            body_json(res).await,
            json!({ "total": 1, "completed": 1, "pending": 0 })
        );

        let res = app
            .clone()
            .oneshot(json_request("DELETE", &format!("/api/tasks/{}", id), Some(&alice), json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn logout_revokes_the_token() {
        let app = build_app(AppState::fake());
        let token = login(&app, "alice").await;

        let res = app.clone().oneshot(get("/api/me", Some(&token))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["username"], "alice");

        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/auth/logout", Some(&token), json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = app.oneshot(get("/api/me", Some(&token))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn anonymous_pages_redirect_to_login() {
        let app = build_app(AppState::fake());
        for uri in ["/", "/profile", "/edit/1", "/complete/1", "/delete/1"] {
            let res = app.clone().oneshot(page(uri, None)).await.unwrap();
            assert_eq!(res.status(), StatusCode::SEE_OTHER, "{}", uri);
            assert_eq!(location(&res), "/login");
        }
    }

    #[tokio::test]
    async fn browser_flow_with_cookie_session() {
        let app = build_app(AppState::fake());

        let res = app
            .clone()
            .oneshot(form_request(
                "/register",
                None,
                "username=alice&email=a%40x.com&password=secret1",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/login?registered=1");

        let res = app
            .clone()
            .oneshot(form_request("/login", None, "username=alice&password=secret1&remember=on"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/");
        let set_cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with(&format!("{}=", SESSION_COOKIE)));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Max-Age="));
        let cookie = set_cookie.split(';').next().unwrap().to_string();

        let res = app
            .clone()
            .oneshot(form_request("/add", Some(&cookie), "title=water+plants&description="))
            .await
            .unwrap();
        assert_eq!(location(&res), "/");

        let res = app.clone().oneshot(page("/", Some(&cookie))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("water plants"));
        assert!(html.contains("/complete/1"));

        let res = app.clone().oneshot(page("/complete/1", Some(&cookie))).await.unwrap();
        assert_eq!(location(&res), "/");

        let res = app
            .clone()
            .oneshot(form_request("/edit/1", Some(&cookie), "title=&description=x"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(res).await.contains("Title is required"));

        let res = app.clone().oneshot(page("/profile", Some(&cookie))).await.unwrap();
        let html = body_text(res).await;
        assert!(html.contains("a@x.com"));
        assert!(html.contains("<td>1</td>"));

        let res = app.clone().oneshot(page("/edit/99", Some(&cookie))).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app.clone().oneshot(page("/logout", Some(&cookie))).await.unwrap();
        assert_eq!(location(&res), "/login");

        let res = app.oneshot(page("/", Some(&cookie))).await.unwrap();
        assert_eq!(location(&res), "/login");
    }

    #[tokio::test]
    async fn rejected_add_rerenders_with_typed_values() {
        let app = build_app(AppState::fake());
        let token = login(&app, "alice").await;
        let cookie = format!("{}={}", SESSION_COOKIE, token);

        let long = "x".repeat(101);
        let res = app
            .clone()
            .oneshot(form_request("/add", Some(&cookie), &format!("title={}&description=notes", long)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let html = body_text(res).await;
        assert!(html.contains("Title must be at most 100 characters"));
        assert!(html.contains(&format!("value=\"{}\"", long)));
        assert!(html.contains(">notes</textarea>"));

        let res = app
            .clone()
            .oneshot(form_request("/add", Some(&cookie), "title=+++&description="))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(res).await.contains("Title is required"));

        let res = app.oneshot(get("/api/tasks", Some(&token))).await.unwrap();
        assert_eq!(body_json(res).await, json!([]));
    }

    #[tokio::test]
    async fn failed_page_login_rerenders_form() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(form_request("/login", None, "username=ghost&password=nope"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        let html = body_text(res).await;
        assert!(html.contains("Invalid credentials"));
        assert!(html.contains("value=\"ghost\""));
    }
}
