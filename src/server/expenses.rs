//! `/api/expenses`

use super::{failure, internal, success, success_message, unauthorized, AppState, Caller};
use crate::db::{ExpensePatch, NewExpense};
use crate::model::{wire_date, ExpenseId, ExpenseType};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::{debug, info};

const PANE_REQUIRED: &str = "A month between 1 and 12 and a type are required.";

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListQuery {
    month: Option<u8>,
    #[serde(rename = "type")]
    expense_type: Option<ExpenseType>,
}

/// The body of a create, and of each entry of a batch. `type` is kept as text so that an unknown
/// type is answered like a missing one.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ExpenseBody {
    month: Option<i64>,
    #[serde(rename = "type")]
    expense_type: Option<String>,
    #[serde(deserialize_with = "wire_date")]
    date: Option<NaiveDate>,
    amount: Option<AmountValue>,
    #[serde(alias = "majorCategory")]
    major_category: Option<String>,
    #[serde(alias = "minorCategory")]
    minor_category: Option<String>,
    note: Option<String>,
}

/// The body of an update. Only the fields present are changed; an explicit `null` clears one.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PatchBody {
    #[serde(rename = "type")]
    expense_type: Option<String>,
    #[serde(deserialize_with = "present_date")]
    date: Option<Option<NaiveDate>>,
    #[serde(deserialize_with = "present")]
    amount: Option<Option<AmountValue>>,
    #[serde(alias = "majorCategory", deserialize_with = "present")]
    major_category: Option<Option<String>>,
    #[serde(alias = "minorCategory", deserialize_with = "present")]
    minor_category: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    note: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BatchBody {
    #[serde(default)]
    expenses: Vec<ExpenseBody>,
}

/// Amounts arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum AmountValue {
    Number(f64),
    Text(String),
}

impl AmountValue {
    /// Rounded to a whole amount. Zero and anything unparseable are stored as no amount.
    fn whole(&self) -> Option<i64> {
        let amount = match self {
            AmountValue::Number(n) => *n,
            AmountValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        (amount.is_finite() && amount != 0.0).then(|| amount.round() as i64)
    }

    fn is_blank(&self) -> bool {
        match self {
            AmountValue::Number(n) => *n == 0.0,
            AmountValue::Text(s) => s.is_empty(),
        }
    }
}

impl ExpenseBody {
    /// Rows with no date, amount, major category or note are skipped by a batch.
    fn has_content(&self) -> bool {
        self.date.is_some()
            || self.amount.as_ref().is_some_and(|a| !a.is_blank())
            || self.major_category.as_deref().is_some_and(|s| !s.is_empty())
            || self.note.as_deref().is_some_and(|s| !s.is_empty())
    }

    fn into_new_expense(self) -> Result<NewExpense, &'static str> {
        let month = self
            .month
            .and_then(|m| u8::try_from(m).ok())
            .filter(|m| (1..=12).contains(m));
        let expense_type = self
            .expense_type
            .and_then(|t| t.parse::<ExpenseType>().ok());
        let (Some(month), Some(expense_type)) = (month, expense_type) else {
            return Err(PANE_REQUIRED);
        };
        Ok(NewExpense {
            month,
            expense_type,
            date: self.date,
            amount: self.amount.as_ref().and_then(AmountValue::whole),
            major_category: non_empty(self.major_category),
            minor_category: non_empty(self.minor_category),
            note: non_empty(self.note),
        })
    }
}

impl From<PatchBody> for ExpensePatch {
    /// An unknown `type` is ignored.
    fn from(body: PatchBody) -> Self {
        ExpensePatch {
            expense_type: body.expense_type.and_then(|t| t.parse().ok()),
            date: body.date,
            amount: body.amount.map(|a| a.as_ref().and_then(AmountValue::whole)),
            major_category: body.major_category.map(non_empty),
            minor_category: body.minor_category.map(non_empty),
            note: body.note,
        }
    }
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListQuery>,
) -> Response {
    if !caller.authenticated {
        return success(StatusCode::OK, Value::Array(Vec::new()));
    }
    debug!("GET /api/expenses - {query:?}");
    match state.db.list_expenses(query.month, query.expense_type).await {
        Ok(expenses) => success(StatusCode::OK, expenses),
        Err(e) => internal("Error listing expenses", e),
    }
}

pub(super) async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ExpenseBody>, JsonRejection>,
) -> Response {
    if !caller.authenticated {
        return unauthorized();
    }
    let expense = match body {
        Ok(Json(body)) => match body.into_new_expense() {
            Ok(expense) => expense,
            Err(message) => return failure(StatusCode::BAD_REQUEST, message),
        },
        Err(rejection) => return bad_body(rejection),
    };
    info!(
        "POST /api/expenses - {}/{}",
        expense.month, expense.expense_type
    );
    match state.db.insert_expense(&expense).await {
        Ok(record) => success(StatusCode::CREATED, record),
        Err(e) => internal("Error adding expense", e),
    }
}

pub(super) async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<PatchBody>, JsonRejection>,
) -> Response {
    if !caller.authenticated {
        return unauthorized();
    }
    let patch = match body {
        Ok(Json(body)) => ExpensePatch::from(body),
        Err(rejection) => return bad_body(rejection),
    };
    info!("PUT /api/expenses/{id}");
    match state.db.update_expense(&ExpenseId::new(id), patch).await {
        Ok(Some(record)) => success(StatusCode::OK, record),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Expense not found."),
        Err(e) => internal("Error updating expense", e),
    }
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Response {
    if !caller.authenticated {
        return unauthorized();
    }
    info!("DELETE /api/expenses/{id}");
    match state.db.delete_expense(&ExpenseId::new(id)).await {
        Ok(_) => success_message("Expense deleted."),
        Err(e) => internal("Error deleting expense", e),
    }
}

/// Saves several expenses at once. Entries without any content are skipped.
pub(super) async fn create_batch(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<BatchBody>, JsonRejection>,
) -> Response {
    if !caller.authenticated {
        return unauthorized();
    }
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return bad_body(rejection),
    };
    if body.expenses.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "A list of expenses is required.");
    }
    let mut expenses = Vec::new();
    for entry in body.expenses.into_iter().filter(ExpenseBody::has_content) {
        match entry.into_new_expense() {
            Ok(expense) => expenses.push(expense),
            Err(message) => return failure(StatusCode::BAD_REQUEST, message),
        }
    }
    if expenses.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "There are no expenses to save.");
    }
    info!("POST /api/expenses/batch - {} expenses", expenses.len());
    match state.db.insert_expenses(&expenses).await {
        Ok(records) => {
            let message = format!("{} expenses saved.", records.len());
            let body = json!({ "success": true, "data": records, "message": message });
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => internal("Error saving expenses", e),
    }
}

fn bad_body(rejection: JsonRejection) -> Response {
    debug!("rejected expense body: {rejection}");
    failure(StatusCode::BAD_REQUEST, rejection.body_text())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Marks a field as present, so that `null` and a missing field can be told apart.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn present_date<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    wire_date(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::super::tests::TestServer;
    use super::*;
    use axum::http::Method;

    fn body(month: u8, expense_type: &str, date: &str, amount: i64) -> Value {
        json!({
            "month": month, "type": expense_type, "date": date, "amount": amount,
            "major_category": "Food", "minor_category": "Cafe", "note": "latte"
        })
    }

    #[tokio::test]
    async fn test_create_list_update_delete() {
        let server = TestServer::new().await;
        let token = Some("hodol");

        let (status, created) = server
            .call(Method::POST, "/api/expenses", token, Some(body(5, "both", "2024-05-02", 4500)))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["amount"], 4500);
        let id = created["data"]["id"].as_str().unwrap().to_string();
        server
            .call(Method::POST, "/api/expenses", token, Some(body(5, "hodol", "2024-05-09", 100)))
            .await;
        server
            .call(Method::POST, "/api/expenses", token, Some(body(6, "both", "2024-06-01", 7)))
            .await;

        let (_, listed) = server
            .call(Method::GET, "/api/expenses?month=5&type=both", token, None)
            .await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);
        let (_, listed) = server.call(Method::GET, "/api/expenses?month=5", token, None).await;
        assert_eq!(listed["data"][0]["type"], "hodol");

        let (status, updated) = server
            .call(
                Method::PUT,
                &format!("/api/expenses/{id}"),
                token,
                Some(json!({ "note": "two lattes", "type": "sum" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["data"]["note"], "two lattes");
        assert_eq!(updated["data"]["type"], "both");
        assert_eq!(updated["data"]["amount"], 4500);

        let (status, _) = server
            .call(
                Method::PUT,
                &format!("/api/expenses/{id}"),
                token,
                Some(json!({ "type": "doldol" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (_, listed) = server
            .call(Method::GET, "/api/expenses?type=doldol", token, None)
            .await;
        assert_eq!(listed["data"][0]["id"], id.as_str());

        let (status, body) = server
            .call(Method::DELETE, &format!("/api/expenses/{id}"), token, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());
        let (_, listed) = server.call(Method::GET, "/api/expenses", token, None).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_requires_pane() {
        let server = TestServer::new().await;
        let (status, body) = server
            .call(Method::POST, "/api/expenses", Some("hodol"), Some(json!({ "month": 13, "type": "both" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], PANE_REQUIRED);
        let (status, _) = server
            .call(Method::POST, "/api/expenses", Some("hodol"), Some(json!({ "month": 3 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_anonymous_reads_empty_and_cannot_write() {
        let server = TestServer::new().await;
        server
            .call(Method::POST, "/api/expenses", Some("doldol"), Some(body(5, "both", "2024-05-02", 1)))
            .await;
        let (status, listed) = server.call(Method::GET, "/api/expenses", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["data"], json!([]));
        let (status, _) = server
            .call(Method::POST, "/api/expenses", Some("guest"), Some(body(5, "both", "2024-05-02", 1)))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_batch_skips_empty_rows() {
        let server = TestServer::new().await;
        let (status, saved) = server
            .call(
                Method::POST,
                "/api/expenses/batch",
                Some("hodol"),
                Some(json!({ "expenses": [
                    { "month": 5, "type": "both", "date": "", "amount": 0, "note": "" },
                    { "month": 5, "type": "hodol", "amount": "1200", "majorCategory": "Food" },
                ] })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let saved = saved["data"].as_array().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0]["amount"], 1200);
        assert_eq!(saved[0]["major_category"], "Food");

        let (status, _) = server
            .call(
                Method::POST,
                "/api/expenses/batch",
                Some("hodol"),
                Some(json!({ "expenses": [{ "month": 5, "type": "both" }] })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_clears_fields_given_as_null() {
        let server = TestServer::new().await;
        let token = Some("hodol");
        let (_, created) = server
            .call(Method::POST, "/api/expenses", token, Some(body(5, "both", "2024-05-02", 4500)))
            .await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, updated) = server
            .call(
                Method::PUT,
                &format!("/api/expenses/{id}"),
                token,
                Some(json!({ "amount": null, "majorCategory": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["data"]["amount"], Value::Null);
        assert_eq!(updated["data"]["major_category"], Value::Null);
        assert_eq!(updated["data"]["minor_category"], "Cafe");
        assert_eq!(updated["data"]["date"], "2024-05-02");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let server = TestServer::new().await;
        let (status, body) = server
            .call(
                Method::POST,
                "/api/expenses",
                Some("hodol"),
                Some(json!({ "month": "five", "type": "both" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());

        let (status, _) = server
            .call(
                Method::POST,
                "/api/expenses",
                Some("guest"),
                Some(json!({ "month": "five" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    fn whole(value: Value) -> Option<i64> {
        serde_json::from_value::<Option<AmountValue>>(value)
            .unwrap()
            .and_then(|a| a.whole())
    }

    #[test]
    fn test_amount_parsing() {
        assert_eq!(whole(json!(1200)), Some(1200));
        assert_eq!(whole(json!(12.6)), Some(13));
        assert_eq!(whole(json!(" 300 ")), Some(300));
        assert_eq!(whole(json!(0)), None);
        assert_eq!(whole(json!("abc")), None);
        assert_eq!(whole(Value::Null), None);
    }
}
