//! The remote store boundary.
//!
//! Everything the expense tables and the category directory need from the outside world goes
//! through the [`ExpenseStore`] trait. [`HttpStore`] talks to the REST server; [`MemoryStore`]
//! keeps everything in memory and is used by tests and by test mode.

mod http;
mod memory;

use crate::auth::AuthGate;
use crate::model::{Category, CategoryId, ExpenseId, ExpensePayload, ExpenseRecord, ExpenseType};
use crate::{Config, Result};
use std::sync::Arc;

pub use http::{AuthFailureHandler, HttpStore, DEFAULT_TIMEOUT};
pub use memory::{MemoryStore, StoreCall};

/// The message shown whenever a write needs a recognized household token.
pub const AUTH_REQUIRED_MESSAGE: &str =
    "Authentication required. Please enter a valid household token.";

/// A failure reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The store refused a write because the token is missing or not recognized.
    #[error("{}", AUTH_REQUIRED_MESSAGE)]
    Authentication,
    /// Any other failure: transport errors, timeouts, server errors.
    #[error("{0}")]
    Remote(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Authentication)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// The operations the client side depends on. Reads never fail for lack of a token; they return
/// empty lists instead.
#[async_trait::async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn list_expenses(
        &self,
        month: Option<u8>,
        expense_type: Option<ExpenseType>,
    ) -> ApiResult<Vec<ExpenseRecord>>;

    async fn create_expense(&self, payload: &ExpensePayload) -> ApiResult<ExpenseRecord>;

    async fn update_expense(
        &self,
        id: &ExpenseId,
        payload: &ExpensePayload,
    ) -> ApiResult<ExpenseRecord>;

    async fn delete_expense(&self, id: &ExpenseId) -> ApiResult<()>;

    async fn list_categories(&self) -> ApiResult<Vec<Category>>;

    async fn create_category(&self, main: &str, sub: &str) -> ApiResult<Category>;

    async fn update_category(&self, id: &CategoryId, main: &str, sub: &str)
        -> ApiResult<Category>;

    async fn delete_category(&self, id: &CategoryId) -> ApiResult<()>;
}

/// Whether client commands talk to the real server or to a seeded in-memory store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Http,
    Test,
}

impl Mode {
    /// `Mode::Test` when `HODOL_IN_TEST_MODE` is set to a non-empty value, `Mode::Http` otherwise.
    pub fn from_env() -> Self {
        match std::env::var("HODOL_IN_TEST_MODE") {
            Ok(value) if !value.is_empty() => Mode::Test,
            _ => Mode::Http,
        }
    }
}

/// Builds the store used by client commands.
pub fn store(config: &Config, mode: Mode) -> Result<Arc<dyn ExpenseStore>> {
    let gate = AuthGate::new(config.token());
    match mode {
        Mode::Http => Ok(Arc::new(HttpStore::new(
            config.api_url(),
            gate,
            DEFAULT_TIMEOUT,
            None,
        )?)),
        Mode::Test => Ok(Arc::new(MemoryStore::seeded(gate))),
    }
}
