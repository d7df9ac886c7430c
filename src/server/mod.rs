//! The REST API served by `hodol serve`.
//!
//! Every route lives under `/api`. Responses are wrapped in an envelope,
//! `{"success": bool, "data": ..., "error": "...", "message": "..."}`. Callers identify
//! themselves with a household token, either as `Authorization: Bearer <token>` or as a `token`
//! query parameter. Callers without an allowed token may call every route, but reads come back
//! empty and writes are answered with 401.

mod categories;
mod expenses;

use crate::db::Db;
use crate::Result;
use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

const AUTH_REQUIRED: &str = "Authentication required.";

/// Where the server listens, which browser origin it answers, and which tokens may write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    port: u16,
    allowed_origin: String,
    allowed_tokens: Vec<String>,
}

impl ServerSettings {
    pub fn new(port: u16, allowed_origin: impl Into<String>, allowed_tokens: Vec<String>) -> Self {
        Self {
            port,
            allowed_origin: allowed_origin.into(),
            allowed_tokens: allowed_tokens
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn allowed_origin(&self) -> &str {
        &self.allowed_origin
    }

    pub fn allowed_tokens(&self) -> &[String] {
        &self.allowed_tokens
    }
}

#[derive(Clone)]
struct AppState {
    db: Db,
    tokens: Arc<HashSet<String>>,
}

/// Whether the caller presented an allowed token. Inserted by the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Caller {
    authenticated: bool,
}

/// Builds the application: the `/api` routes, the auth middleware and CORS.
pub fn router(db: Db, settings: &ServerSettings) -> Result<Router> {
    let origin = HeaderValue::from_str(settings.allowed_origin())
        .with_context(|| format!("Invalid allowed origin '{}'", settings.allowed_origin()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let state = AppState {
        db,
        tokens: Arc::new(settings.allowed_tokens().iter().cloned().collect()),
    };

    let api = Router::new()
        .route(
            "/categories",
            get(categories::list).post(categories::create),
        )
        .route(
            "/categories/:id",
            put(categories::update).delete(categories::delete),
        )
        .route("/expenses", get(expenses::list).post(expenses::create))
        .route("/expenses/batch", post(expenses::create_batch))
        .route(
            "/expenses/:id",
            put(expenses::update).delete(expenses::delete),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .route("/health", get(health));

    Ok(Router::new()
        .nest("/api", api)
        .layer(cors)
        .with_state(state))
}

/// Listens on all interfaces at the configured port until the process is stopped.
pub async fn serve(db: Db, settings: &ServerSettings) -> Result<()> {
    let app = router(db, settings)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Unable to listen on {addr}"))?;
    info!("Server is running on http://localhost:{}", settings.port());
    info!("API endpoint: http://localhost:{}/api", settings.port());
    if settings.allowed_tokens().is_empty() {
        info!("No tokens are allowed; every write will be rejected");
    }
    axum::serve(listener, app)
        .await
        .context("The server stopped with an error")
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Server is running" }))
}

async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = bearer_token(request.headers()).or_else(|| query_token(request.uri()));
    let authenticated = token.is_some_and(|t| state.tokens.contains(&t));
    request.extensions_mut().insert(Caller { authenticated });
    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn query_token(uri: &Uri) -> Option<String> {
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|t| !t.is_empty())
}

fn success(status: StatusCode, data: impl serde::Serialize) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

fn success_message(message: impl Into<String>) -> Response {
    Json(json!({ "success": true, "message": message.into() })).into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

fn unauthorized() -> Response {
    failure(StatusCode::UNAUTHORIZED, AUTH_REQUIRED)
}

fn internal(context: &str, e: anyhow::Error) -> Response {
    error!("{context}: {e:#}");
    failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub(super) struct TestServer {
        _dir: TempDir,
        pub(super) app: Router,
    }

    impl TestServer {
        pub(super) async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let db = Db::init(dir.path().join("hodol.sqlite")).await.unwrap();
            let settings = ServerSettings::new(
                0,
                DEFAULT_ORIGIN,
                vec!["hodol".into(), " doldol ".into()],
            );
            let app = router(db, &settings).unwrap();
            Self { _dir: dir, app }
        }

        /// Sends a request and returns the status and the JSON body.
        pub(super) async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = axum::http::Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let server = TestServer::new().await;
        let (status, body) = server.call(Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_token_from_query_or_header() {
        let server = TestServer::new().await;
        let body = json!({ "main_category": "Food", "sub_category": "Cafe" });
        let (status, _) = server
            .call(Method::POST, "/api/categories?token=doldol", None, Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = server
            .call(Method::POST, "/api/categories", Some("intruder"), Some(body))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_empty_allow_list_rejects_every_write() {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("hodol.sqlite")).await.unwrap();
        let app = router(db, &ServerSettings::new(0, DEFAULT_ORIGIN, vec![])).unwrap();
        let server = TestServer { _dir: dir, app };
        let (status, _) = server
            .call(
                Method::POST,
                "/api/categories",
                Some("hodol"),
                Some(json!({ "main_category": "Food", "sub_category": "Cafe" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let server = TestServer::new().await;
        let request = axum::http::Request::builder()
            .uri("/api/health")
            .header(header::ORIGIN, DEFAULT_ORIGIN)
            .body(Body::empty())
            .unwrap();
        let response = server.app.clone().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            DEFAULT_ORIGIN
        );
    }

    #[test]
    fn test_invalid_origin_is_an_error() {
        let settings = ServerSettings::new(0, "bad\norigin", vec![]);
        assert!(HeaderValue::from_str(settings.allowed_origin()).is_err());
        assert_eq!(
            ServerSettings::new(1, "x", vec![" a ".into(), "".into()]).allowed_tokens(),
            &["a".to_string()]
        );
    }
}
