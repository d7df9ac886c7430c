//! `/api/categories`

use super::{failure, internal, success, success_message, unauthorized, AppState, Caller};
use crate::model::CategoryId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

const NAMES_REQUIRED: &str = "Both main_category and sub_category are required.";
const NOT_FOUND: &str = "Category not found.";

#[derive(Debug, Default, Deserialize)]
pub(super) struct CategoryBody {
    #[serde(default)]
    main_category: Option<String>,
    #[serde(default)]
    sub_category: Option<String>,
}

impl CategoryBody {
    fn names(&self) -> Option<(&str, &str)> {
        let main = self.main_category.as_deref().map(str::trim).unwrap_or("");
        let sub = self.sub_category.as_deref().map(str::trim).unwrap_or("");
        (!main.is_empty() && !sub.is_empty()).then_some((main, sub))
    }
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Response {
    if !caller.authenticated {
        return Json(json!({ "success": true, "data": [], "mainCategoryCounts": {} }))
            .into_response();
    }
    let categories = match state.db.list_categories().await {
        Ok(categories) => categories,
        Err(e) => return internal("Error listing categories", e),
    };
    let mut main_counts: BTreeMap<&str, i64> = BTreeMap::new();
    for category in &categories {
        *main_counts
            .entry(category.main_category.as_str())
            .or_default() += category.count;
    }
    Json(json!({
        "success": true,
        "data": categories,
        "mainCategoryCounts": main_counts,
    }))
    .into_response()
}

pub(super) async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CategoryBody>,
) -> Response {
    if !caller.authenticated {
        return unauthorized();
    }
    let Some((main, sub)) = body.names() else {
        return failure(StatusCode::BAD_REQUEST, NAMES_REQUIRED);
    };
    info!("POST /api/categories - {main} > {sub}");
    match state.db.insert_category(main, sub).await {
        Ok(category) => success(StatusCode::CREATED, category),
        Err(e) => internal("Error adding category", e),
    }
}

pub(super) async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(body): Json<CategoryBody>,
) -> Response {
    if !caller.authenticated {
        return unauthorized();
    }
    let Some((main, sub)) = body.names() else {
        return failure(StatusCode::BAD_REQUEST, NAMES_REQUIRED);
    };
    info!("PUT /api/categories/{id} - {main} > {sub}");
    match state
        .db
        .update_category(&CategoryId::new(id), main, sub)
        .await
    {
        Ok(Some(category)) => success(StatusCode::OK, category),
        Ok(None) => failure(StatusCode::NOT_FOUND, NOT_FOUND),
        Err(e) => internal("Error updating category", e),
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
    info!("DELETE /api/categories/{id}");
    match state.db.delete_category(&CategoryId::new(id)).await {
        Ok(true) => success_message("Category deleted."),
        Ok(false) => failure(StatusCode::NOT_FOUND, NOT_FOUND),
        Err(e) => internal("Error deleting category", e),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::TestServer;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_category_lifecycle() {
        let server = TestServer::new().await;
        let token = Some("hodol");

        let (status, body) = server
            .call(
                Method::POST,
                "/api/categories",
                token,
                Some(json!({ "main_category": "Food", "sub_category": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = server
            .call(
                Method::POST,
                "/api/categories",
                token,
                Some(json!({ "main_category": "Food", "sub_category": "Cafe" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        server
            .call(
                Method::POST,
                "/api/expenses",
                token,
                Some(json!({
                    "month": 5, "type": "both", "date": "2024-05-01", "amount": 4500,
                    "major_category": "Food", "minor_category": "Cafe", "note": ""
                })),
            )
            .await;

        let (_, body) = server.call(Method::GET, "/api/categories", token, None).await;
        assert_eq!(body["data"][0]["count"], 1);
        assert_eq!(body["mainCategoryCounts"]["Food"], 1);

        let (status, body) = server
            .call(
                Method::PUT,
                &format!("/api/categories/{id}"),
                token,
                Some(json!({ "main_category": "Food", "sub_category": "Coffee" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["sub_category"], "Coffee");
        let (_, body) = server.call(Method::GET, "/api/expenses", token, None).await;
        assert_eq!(body["data"][0]["minor_category"], "Coffee");

        let (status, body) = server
            .call(Method::DELETE, &format!("/api/categories/{id}"), token, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let (_, body) = server.call(Method::GET, "/api/expenses", token, None).await;
        assert!(body["data"][0]["major_category"].is_null());

        let (status, _) = server
            .call(Method::DELETE, &format!("/api/categories/{id}"), token, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_anonymous_list_is_empty() {
        let server = TestServer::new().await;
        server
            .call(
                Method::POST,
                "/api/categories",
                Some("doldol"),
                Some(json!({ "main_category": "Home", "sub_category": "Rent" })),
            )
            .await;
        let (status, body) = server.call(Method::GET, "/api/categories", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["mainCategoryCounts"], json!({}));
    }

    #[tokio::test]
    async fn test_update_unknown_category() {
        let server = TestServer::new().await;
        let (status, _) = server
            .call(
                Method::PUT,
                "/api/categories/nope",
                Some("hodol"),
                Some(json!({ "main_category": "A", "sub_category": "B" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
