use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ErrorResponse, HttpAppError};
use crate::middleware::RequestId;
use crate::state::AppState;
use crate::utils::{extract_multipart_image, validate_image_size};
use racun_core::models::Receipt;
use racun_core::AppError;

use super::images::UserQuery;

/// Run the full ingestion pipeline on an uploaded image.
///
/// The orchestrator decides how much work is actually needed: an already
/// resolved image returns immediately, a known URL is cloned, and only a
/// genuinely new receipt triggers the QR decode and the two external calls.
#[utoipa::path(
    post,
    path = "/api/v0/pipeline/process",
    tag = "pipeline",
    params(
        ("user_name" = Option<String>, Query, description = "Owning user (defaults to 'unknown')")
    ),
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Canonical receipt", body = Receipt),
        (status = 422, description = "Decode, validation or parse failure", body = ErrorResponse),
        (status = 502, description = "Fiscal service unreachable", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart), fields(user_name = %query.user_name))]
pub async fn process_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
    Extension(request_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<Receipt>, HttpAppError> {
    let bytes = extract_multipart_image(multipart).await?;
    validate_image_size(bytes.len(), state.config.max_image_size_bytes)?;

    let receipt = state
        .ingest
        .resolve_image(&bytes, &query.user_name, &request_id.0)
        .await?;
    Ok(Json(receipt))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessByNameRequest {
    pub image_name: String,
}

/// Re-run the pipeline on a previously stored image (the retry path after a
/// failed decode was captured for debugging).
#[utoipa::path(
    post,
    path = "/api/v0/pipeline/process-by-name",
    tag = "pipeline",
    params(
        ("user_name" = Option<String>, Query, description = "Owning user (defaults to 'unknown')")
    ),
    request_body = ProcessByNameRequest,
    responses(
        (status = 200, description = "Canonical receipt", body = Receipt),
        (status = 404, description = "Image not found", body = ErrorResponse),
        (status = 422, description = "Decode, validation or parse failure", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, body), fields(user_name = %query.user_name, image_name = %body.image_name))]
pub async fn process_image_name(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<ProcessByNameRequest>,
) -> Result<Json<Receipt>, HttpAppError> {
    let image = state
        .images
        .find_by_name(&body.image_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("image '{}' not found", body.image_name)))?;

    let receipt = state
        .ingest
        .resolve_image(&image.bytes, &query.user_name, &request_id.0)
        .await?;
    Ok(Json(receipt))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessUrlRequest {
    pub qr_url: String,
}

/// Run the URL half of the pipeline for an already-known verification URL.
#[utoipa::path(
    post,
    path = "/api/v0/pipeline/process-url",
    tag = "pipeline",
    params(
        ("user_name" = Option<String>, Query, description = "Owning user (defaults to 'unknown')")
    ),
    request_body = ProcessUrlRequest,
    responses(
        (status = 200, description = "Canonical receipt", body = Receipt),
        (status = 422, description = "Invalid URL or parse failure", body = ErrorResponse),
        (status = 502, description = "Fiscal service unreachable", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, body), fields(user_name = %query.user_name))]
pub async fn process_url(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<ProcessUrlRequest>,
) -> Result<Json<Receipt>, HttpAppError> {
    let receipt = state
        .ingest
        .resolve_url(&body.qr_url, &query.user_name, &request_id.0)
        .await?;
    Ok(Json(receipt))
}
