//! OpenAPI documentation served at /api/openapi.json and browsable at /docs.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use racun_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Racun API",
        version = "0.1.0",
        description = "Fiscal receipt ingestion API. Uploads photographed receipts, decodes their QR verification URLs, fetches and parses the fiscal verification pages, and stores deduplicated receipts per user. All endpoints are versioned under /api/v0/."
    ),
    paths(
        // Images
        handlers::images::upload_image,
        handlers::images::list_images,
        handlers::images::qr_decode_image,
        handlers::images::qr_decode_by_name,
        // Pipeline
        handlers::pipeline::process_image,
        handlers::pipeline::process_image_name,
        handlers::pipeline::process_url,
        // Receipts
        handlers::receipts::list_receipts,
        handlers::receipts::get_receipt,
        handlers::receipts::update_category,
        // Analytics
        handlers::analytics::get_analytics,
        handlers::analytics::get_analytics_by_categories,
        // Health
        handlers::health::health_check,
    ),
    components(
        schemas(
            // Core models
            models::Receipt,
            models::SellerInfo,
            models::LineItem,
            // Image responses
            handlers::images::UploadImageResponse,
            handlers::images::QrUrlResponse,
            // Pipeline requests
            handlers::pipeline::ProcessByNameRequest,
            handlers::pipeline::ProcessUrlRequest,
            // Receipt requests
            handlers::receipts::UpdateCategoryRequest,
            // Analytics models
            handlers::analytics::AnalyticsResponse,
            handlers::analytics::NameTotal,
            handlers::analytics::ByCategoriesResponse,
            handlers::analytics::CategoryTotal,
            // Health
            handlers::health::HealthResponse,
            // Error
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "images", description = "Receipt image upload, listing, and QR decoding"),
        (name = "pipeline", description = "End-to-end receipt ingestion from image or verification URL"),
        (name = "receipts", description = "Stored receipt queries and categorization"),
        (name = "analytics", description = "Spending totals by company, item, and category"),
        (name = "health", description = "Service health checks")
    )
)]
pub struct ApiDoc;
