use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use racun_core::models::Receipt;
use racun_core::AppError;

fn default_user() -> String {
    "unknown".to_string()
}

fn default_sort() -> String {
    "desc".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListReceiptsQuery {
    #[serde(default = "default_user")]
    pub user_name: String,
    pub from_dt: Option<DateTime<Utc>>,
    /// "asc" or "desc" by receipt timestamp
    #[serde(default = "default_sort")]
    pub sort: String,
}

/// List a user's receipts, newest first by default.
#[utoipa::path(
    get,
    path = "/api/v0/receipts",
    tag = "receipts",
    params(
        ("user_name" = Option<String>, Query, description = "Owning user (defaults to 'unknown')"),
        ("from_dt" = Option<String>, Query, description = "Only receipts at or after this RFC 3339 timestamp"),
        ("sort" = Option<String>, Query, description = "'asc' or 'desc' by receipt timestamp")
    ),
    responses(
        (status = 200, description = "Receipts", body = Vec<Receipt>),
        (status = 400, description = "Invalid query", body = ErrorResponse)
    )
)]
pub async fn list_receipts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListReceiptsQuery>,
) -> Result<Json<Vec<Receipt>>, HttpAppError> {
    let ascending = match query.sort.as_str() {
        "asc" => true,
        "desc" => false,
        other => {
            return Err(HttpAppError(AppError::InvalidInput(format!(
                "sort must be 'asc' or 'desc', got '{other}'"
            ))))
        }
    };

    let receipts = state
        .receipts
        .list(&query.user_name, query.from_dt, ascending)
        .await?;
    Ok(Json(receipts))
}

/// Fetch one receipt by id.
#[utoipa::path(
    get,
    path = "/api/v0/receipts/{id}",
    tag = "receipts",
    params(
        ("id" = Uuid, Path, description = "Receipt id")
    ),
    responses(
        (status = 200, description = "Receipt", body = Receipt),
        (status = 404, description = "Receipt not found", body = ErrorResponse)
    )
)]
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Receipt>, HttpAppError> {
    let receipt = state
        .receipts
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("receipt '{id}' not found")))?;
    Ok(Json(receipt))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCategoryRequest {
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default = "default_user")]
    pub user_name: String,
}

/// Update a receipt's category, the only mutable field.
#[utoipa::path(
    patch,
    path = "/api/v0/receipts/{id}/category",
    tag = "receipts",
    params(
        ("id" = Uuid, Path, description = "Receipt id"),
        ("user_name" = Option<String>, Query, description = "Owning user (defaults to 'unknown')")
    ),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Updated receipt", body = Receipt),
        (status = 404, description = "Receipt not found for this user", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, body), fields(user_name = %query.user_name))]
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<UserQuery>,
    Json(body): Json<UpdateCategoryRequest>,
) -> Result<Json<Receipt>, HttpAppError> {
    if body.category.trim().is_empty() {
        return Err(HttpAppError(AppError::InvalidInput(
            "category must not be empty".to_string(),
        )));
    }

    let receipt = state
        .receipts
        .update_category(id, &query.user_name, body.category.trim())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("receipt '{id}' not found")))?;
    Ok(Json(receipt))
}
