//! Implements the `ExpenseStore` trait with in-memory data.
//!
//! Note: this is compiled into the binary as well so that the client commands can be run
//! top-to-bottom without a server (see `Mode::Test`). Tests additionally use it to count calls,
//! inject failures and simulate network latency.

use crate::api::{ApiError, ApiResult, ExpenseStore};
use crate::auth::AuthGate;
use crate::model::{Category, CategoryId, ExpenseId, ExpensePayload, ExpenseRecord, ExpenseType};
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// A record of one call made against a `MemoryStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    ListExpenses(Option<u8>, Option<ExpenseType>),
    CreateExpense(ExpensePayload),
    UpdateExpense(ExpenseId, ExpensePayload),
    DeleteExpense(ExpenseId),
    ListCategories,
    CreateCategory(String, String),
    UpdateCategory(CategoryId, String, String),
    DeleteCategory(CategoryId),
}

impl StoreCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, StoreCall::ListExpenses(..) | StoreCall::ListCategories)
    }
}

#[derive(Debug, Default)]
struct Inner {
    expenses: Vec<ExpenseRecord>,
    categories: Vec<Category>,
    calls: Vec<StoreCall>,
    failures: VecDeque<ApiError>,
    latency: Option<Duration>,
}

/// An in-memory store that behaves like the server: reads without a token come back empty and
/// writes without a member token are rejected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    gate: AuthGate,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(gate: AuthGate) -> Self {
        Self {
            gate,
            inner: Mutex::default(),
        }
    }

    /// A store pre-loaded with a small household ledger.
    pub fn seeded(gate: AuthGate) -> Self {
        let store = Self::new(gate);
        {
            let mut inner = store.lock();
            inner.categories = seed_categories();
            inner.expenses = seed_expenses();
        }
        store
    }

    pub fn with_expenses(self, expenses: Vec<ExpenseRecord>) -> Self {
        self.lock().expenses = expenses;
        self
    }

    pub fn with_categories(self, categories: Vec<Category>) -> Self {
        self.lock().categories = categories;
        self
    }

    /// Every write call sleeps for `latency` before completing.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// The next write call fails with `error` instead of touching the data.
    pub fn fail_next_write(&self, error: ApiError) {
        self.lock().failures.push_back(error);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<StoreCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }

    pub fn expenses(&self) -> Vec<ExpenseRecord> {
        self.lock().expenses.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock can only come from a failing test.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_read(&self, call: StoreCall) -> bool {
        self.lock().calls.push(call);
        self.gate.is_authenticated()
    }

    /// Records a write, waits out the configured latency, and checks failures and capability.
    async fn begin_write(&self, call: StoreCall) -> ApiResult<()> {
        let latency = {
            let mut inner = self.lock();
            inner.calls.push(call);
            inner.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = self.lock().failures.pop_front() {
            return Err(error);
        }
        if !self.gate.can_write() {
            return Err(ApiError::Authentication);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ExpenseStore for MemoryStore {
    async fn list_expenses(
        &self,
        month: Option<u8>,
        expense_type: Option<ExpenseType>,
    ) -> ApiResult<Vec<ExpenseRecord>> {
        if !self.record_read(StoreCall::ListExpenses(month, expense_type)) {
            return Ok(Vec::new());
        }
        let mut found: Vec<ExpenseRecord> = self
            .lock()
            .expenses
            .iter()
            .filter(|e| month.map_or(true, |m| e.month == m))
            .filter(|e| expense_type.map_or(true, |t| e.expense_type == t))
            .cloned()
            .collect();
        crate::table::sort_records_by_date(&mut found);
        Ok(found)
    }

    async fn create_expense(&self, payload: &ExpensePayload) -> ApiResult<ExpenseRecord> {
        self.begin_write(StoreCall::CreateExpense(payload.clone()))
            .await?;
        let record = ExpenseRecord::from_payload(ExpenseId::new(Uuid::new_v4().to_string()), payload);
        self.lock().expenses.push(record.clone());
        Ok(record)
    }

    async fn update_expense(
        &self,
        id: &ExpenseId,
        payload: &ExpensePayload,
    ) -> ApiResult<ExpenseRecord> {
        self.begin_write(StoreCall::UpdateExpense(id.clone(), payload.clone()))
            .await?;
        let mut inner = self.lock();
        let existing = inner
            .expenses
            .iter_mut()
            .find(|e| e.id.as_ref() == Some(id))
            .ok_or_else(|| ApiError::Remote(format!("Expense '{id}' not found")))?;
        *existing = ExpenseRecord::from_payload(id.clone(), payload);
        Ok(existing.clone())
    }

    async fn delete_expense(&self, id: &ExpenseId) -> ApiResult<()> {
        self.begin_write(StoreCall::DeleteExpense(id.clone()))
            .await?;
        self.lock().expenses.retain(|e| e.id.as_ref() != Some(id));
        Ok(())
    }

    async fn list_categories(&self) -> ApiResult<Vec<Category>> {
        if !self.record_read(StoreCall::ListCategories) {
            return Ok(Vec::new());
        }
        Ok(self.lock().categories.clone())
    }

    async fn create_category(&self, main: &str, sub: &str) -> ApiResult<Category> {
        self.begin_write(StoreCall::CreateCategory(main.into(), sub.into()))
            .await?;
        let category = Category::new(Uuid::new_v4().to_string(), main, sub, 0);
        self.lock().categories.push(category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        id: &CategoryId,
        main: &str,
        sub: &str,
    ) -> ApiResult<Category> {
        self.begin_write(StoreCall::UpdateCategory(id.clone(), main.into(), sub.into()))
            .await?;
        let mut inner = self.lock();
        let existing = inner
            .categories
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| ApiError::Remote(format!("Category '{id}' not found")))?;
        existing.main_category = main.to_string();
        existing.sub_category = sub.to_string();
        Ok(existing.clone())
    }

    async fn delete_category(&self, id: &CategoryId) -> ApiResult<()> {
        self.begin_write(StoreCall::DeleteCategory(id.clone()))
            .await?;
        self.lock().categories.retain(|c| &c.id != id);
        Ok(())
    }
}

/// Seed category data.
fn seed_categories() -> Vec<Category> {
    [
        ("c1", "Food", "Groceries", 12),
        ("c2", "Food", "Cafe", 7),
        ("c3", "Food", "Delivery", 7),
        ("c4", "Home", "Utilities", 4),
        ("c5", "Home", "Supplies", 2),
        ("c6", "Transport", "Fuel", 5),
        ("c7", "Transport", "Transit", 3),
    ]
    .into_iter()
    .map(|(id, main, sub, count)| Category::new(id, main, sub, count))
    .collect()
}

/// Seed expense data.
fn seed_expenses() -> Vec<ExpenseRecord> {
    [
        ("e1", 5, ExpenseType::Both, (2024, 5, 2), 54000, "Food", "Groceries", "weekly shop"),
        ("e2", 5, ExpenseType::Both, (2024, 5, 9), 128500, "Home", "Utilities", "electricity"),
        ("e3", 5, ExpenseType::Hodol, (2024, 5, 3), 4800, "Food", "Cafe", ""),
        ("e4", 5, ExpenseType::Doldol, (2024, 5, 4), 62000, "Transport", "Fuel", ""),
        ("e5", 6, ExpenseType::Both, (2024, 6, 1), 47300, "Food", "Groceries", ""),
        ("e6", 6, ExpenseType::Hodol, (2024, 6, 7), 1450, "Transport", "Transit", "bus"),
    ]
    .into_iter()
    .map(
        |(id, month, expense_type, (y, m, d), amount, major, minor, note)| ExpenseRecord {
            id: Some(ExpenseId::new(id)),
            month,
            expense_type,
            date: NaiveDate::from_ymd_opt(y, m, d),
            amount: Some(amount),
            major_category: Some(major.to_string()),
            minor_category: Some(minor.to_string()),
            note: note.to_string(),
        },
    )
    .collect()
}
