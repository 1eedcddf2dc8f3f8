use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ErrorResponse, HttpAppError};
use crate::middleware::RequestId;
use crate::state::AppState;
use crate::utils::{extract_multipart_image, validate_image_size};
use racun_core::models::StoredImage;
use racun_core::{content_hash, AppError};

fn default_user() -> String {
    "unknown".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default = "default_user")]
    pub user_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadImageResponse {
    pub image_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QrUrlResponse {
    pub qr_url: String,
}

/// Upload an image, deduplicated by content hash.
#[utoipa::path(
    post,
    path = "/api/v0/images",
    tag = "images",
    params(
        ("user_name" = Option<String>, Query, description = "Owning user (defaults to 'unknown')")
    ),
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored (or already present)", body = UploadImageResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 413, description = "Image too large", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart), fields(user_name = %query.user_name))]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
    Extension(request_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<UploadImageResponse>, HttpAppError> {
    let bytes = extract_multipart_image(multipart).await?;
    validate_image_size(bytes.len(), state.config.max_image_size_bytes)?;

    let image_name = content_hash(&bytes);
    let stored = StoredImage::new(&image_name, &query.user_name, bytes);
    let inserted = state.images.insert_if_absent(&stored).await?;

    if inserted {
        tracing::info!(
            request_id = %request_id.0,
            image_name,
            "image successfully uploaded"
        );
    }

    Ok(Json(UploadImageResponse { image_name }))
}

/// List the image names a user has uploaded.
#[utoipa::path(
    get,
    path = "/api/v0/images",
    tag = "images",
    params(
        ("user_name" = Option<String>, Query, description = "Owning user (defaults to 'unknown')")
    ),
    responses(
        (status = 200, description = "Image names", body = Vec<String>)
    )
)]
pub async fn list_images(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<String>>, HttpAppError> {
    let names = state.images.list_names(&query.user_name).await?;
    Ok(Json(names))
}

/// Decode the QR payload of an uploaded image body.
#[utoipa::path(
    post,
    path = "/api/v0/images/qr/decode",
    tag = "images",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Decoded QR payload", body = QrUrlResponse),
        (status = 422, description = "No QR payload found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart))]
pub async fn qr_decode_image(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<QrUrlResponse>, HttpAppError> {
    let bytes = extract_multipart_image(multipart).await?;
    validate_image_size(bytes.len(), state.config.max_image_size_bytes)?;

    let image_name = content_hash(&bytes);
    let qr_url = state.decoder.decode(&bytes).await.inspect_err(|_| {
        tracing::warn!(request_id = %request_id.0, image_name, "QR decode failed");
    })?;

    tracing::info!(request_id = %request_id.0, image_name, "QR code successfully decoded");
    Ok(Json(QrUrlResponse { qr_url }))
}

#[derive(Debug, Deserialize)]
pub struct DecodeByNameQuery {
    pub image_name: String,
}

/// Decode the QR payload of a previously stored image.
#[utoipa::path(
    get,
    path = "/api/v0/images/qr/decode-by-name",
    tag = "images",
    params(
        ("image_name" = String, Query, description = "Content hash of a stored image")
    ),
    responses(
        (status = 200, description = "Decoded QR payload", body = QrUrlResponse),
        (status = 404, description = "Image not found", body = ErrorResponse),
        (status = 422, description = "No QR payload found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(image_name = %query.image_name))]
pub async fn qr_decode_by_name(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DecodeByNameQuery>,
) -> Result<Json<QrUrlResponse>, HttpAppError> {
    let image = state
        .images
        .find_by_name(&query.image_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("image '{}' not found", query.image_name)))?;

    let qr_url = state.decoder.decode(&image.bytes).await?;
    Ok(Json(QrUrlResponse { qr_url }))
}
