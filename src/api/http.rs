//! Implements the `ExpenseStore` trait over the JSON REST API served by `hodol serve`.

use crate::api::{ApiError, ApiResult, ExpenseStore};
use crate::auth::AuthGate;
use crate::model::{Category, CategoryId, ExpenseId, ExpensePayload, ExpenseRecord, ExpenseType};
use crate::Result;
use anyhow::Context;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};
use url::Url;

/// Requests that take longer than this are abandoned and reported as a remote failure.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Called whenever the server answers 401, before the error (or empty read result) is returned.
pub type AuthFailureHandler = Arc<dyn Fn() + Send + Sync>;

/// Every response from the server is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

pub struct HttpStore {
    client: reqwest::Client,
    base: Url,
    gate: AuthGate,
    on_auth_failure: Option<AuthFailureHandler>,
}

impl HttpStore {
    /// Creates a client for the API rooted at `base_url`, e.g. `http://localhost:3001/api`.
    ///
    /// The token held by `gate` is sent as a bearer token when it is header-safe.
    /// `on_auth_failure` is invoked every time the server rejects the token.
    pub fn new(
        base_url: &str,
        gate: AuthGate,
        timeout: Duration,
        on_auth_failure: Option<AuthFailureHandler>,
    ) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("Invalid API URL '{base_url}'"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Unable to build the HTTP client")?;
        Ok(Self {
            client,
            base,
            gate,
            on_auth_failure,
        })
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Sends a request and unwraps the envelope. A 401 on a `GET` yields `T::default()`; on any
    /// other method it yields `ApiError::Authentication`.
    async fn send<T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> ApiResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let url = self
            .base
            .join(path)
            .map_err(|e| ApiError::Remote(format!("Invalid API path '{path}': {e}")))?;
        trace!("{method} {url}");

        let mut request = self.client.request(method.clone(), url).query(query);
        if let Some(token) = self.gate.header_token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Remote(format!("Request to '{path}' failed: {e}")))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!("The server rejected the token for {method} '{path}'");
            if let Some(handler) = &self.on_auth_failure {
                handler();
            }
            if method == Method::GET {
                return Ok(T::default());
            }
            return Err(ApiError::Authentication);
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Remote(format!("Unable to read response from '{path}': {e}")))?;
        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Remote(format!("HTTP error! status: {status}")))
            }
            Err(e) => {
                return Err(ApiError::Remote(format!(
                    "Unable to parse response from '{path}': {e}"
                )))
            }
        };

        if !status.is_success() || !envelope.success {
            return Err(ApiError::Remote(
                envelope
                    .error
                    .unwrap_or_else(|| format!("HTTP error! status: {status}")),
            ));
        }
        Ok(envelope.data.unwrap_or_default())
    }

    /// Like `send` for endpoints that must return an object.
    async fn send_one<T>(&self, method: Method, path: &str, body: Value) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        self.send::<Option<T>>(method, path, &[], Some(body))
            .await?
            .ok_or_else(|| ApiError::Remote(format!("The response from '{path}' had no data")))
    }
}

#[async_trait::async_trait]
impl ExpenseStore for HttpStore {
    async fn list_expenses(
        &self,
        month: Option<u8>,
        expense_type: Option<ExpenseType>,
    ) -> ApiResult<Vec<ExpenseRecord>> {
        let mut query = Vec::new();
        if let Some(month) = month {
            query.push(("month", month.to_string()));
        }
        if let Some(expense_type) = expense_type {
            query.push(("type", expense_type.to_string()));
        }
        self.send(Method::GET, "expenses", &query, None).await
    }

    async fn create_expense(&self, payload: &ExpensePayload) -> ApiResult<ExpenseRecord> {
        self.send_one(Method::POST, "expenses", to_value(payload)?)
            .await
    }

    async fn update_expense(
        &self,
        id: &ExpenseId,
        payload: &ExpensePayload,
    ) -> ApiResult<ExpenseRecord> {
        self.send_one(Method::PUT, &format!("expenses/{id}"), to_value(payload)?)
            .await
    }

    async fn delete_expense(&self, id: &ExpenseId) -> ApiResult<()> {
        self.send::<Value>(Method::DELETE, &format!("expenses/{id}"), &[], None)
            .await
            .map(|_| ())
    }

    async fn list_categories(&self) -> ApiResult<Vec<Category>> {
        self.send(Method::GET, "categories", &[], None).await
    }

    async fn create_category(&self, main: &str, sub: &str) -> ApiResult<Category> {
        let body = json!({ "main_category": main, "sub_category": sub });
        self.send_one(Method::POST, "categories", body).await
    }

    async fn update_category(
        &self,
        id: &CategoryId,
        main: &str,
        sub: &str,
    ) -> ApiResult<Category> {
        let body = json!({ "main_category": main, "sub_category": sub });
        self.send_one(Method::PUT, &format!("categories/{id}"), body)
            .await
    }

    async fn delete_category(&self, id: &CategoryId) -> ApiResult<()> {
        self.send::<Value>(Method::DELETE, &format!("categories/{id}"), &[], None)
            .await
            .map(|_| ())
    }
}

fn to_value(payload: &ExpensePayload) -> ApiResult<Value> {
    serde_json::to_value(payload)
        .map_err(|e| ApiError::Remote(format!("Unable to serialize expense: {e}")))
}
