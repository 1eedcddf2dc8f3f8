//! Route configuration and setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, patch, post},
    Json, Router,
};
use racun_core::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::api_doc::ApiDoc;
use crate::handlers;
use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;

    // Multipart uploads carry form-data overhead on top of the image itself.
    let body_limit = config.max_image_size_bytes + 64 * 1024;

    let app = api_routes()
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest(
            "/docs",
            utoipa_rapidoc::RapiDoc::new("/api/openapi.json")
                .path("/docs")
                .into(),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state);

    Ok(app)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v0/health", get(handlers::health::health_check))
        .route(
            "/api/v0/images",
            post(handlers::images::upload_image).get(handlers::images::list_images),
        )
        .route(
            "/api/v0/images/qr/decode",
            post(handlers::images::qr_decode_image),
        )
        .route(
            "/api/v0/images/qr/decode-by-name",
            get(handlers::images::qr_decode_by_name),
        )
        .route(
            "/api/v0/pipeline/process",
            post(handlers::pipeline::process_image),
        )
        .route(
            "/api/v0/pipeline/process-by-name",
            post(handlers::pipeline::process_image_name),
        )
        .route(
            "/api/v0/pipeline/process-url",
            post(handlers::pipeline::process_url),
        )
        .route("/api/v0/receipts", get(handlers::receipts::list_receipts))
        .route("/api/v0/receipts/{id}", get(handlers::receipts::get_receipt))
        .route(
            "/api/v0/receipts/{id}/category",
            patch(handlers::receipts::update_category),
        )
        .route("/api/v0/analytics", get(handlers::analytics::get_analytics))
        .route(
            "/api/v0/analytics/by-categories",
            get(handlers::analytics::get_analytics_by_categories),
        )
}

/// Setup CORS configuration
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let cors = if config.cors_origins.contains(&"*".to_string()) {
        if config.is_production() {
            tracing::warn!("CORS configured to allow all origins in production");
        }
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        let origins: Result<Vec<HeaderValue>, _> =
            config.cors_origins.iter().map(|o| o.parse()).collect();

        CorsLayer::new()
            .allow_origin(origins.unwrap_or_default())
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers(Any)
    };
    Ok(cors)
}
