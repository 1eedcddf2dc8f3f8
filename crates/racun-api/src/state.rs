//! Application state shared across handlers.

use std::sync::Arc;

use racun_core::Config;
use racun_db::{ImageStore, ReceiptStore};
use racun_services::QrDecoder;
use sqlx::PgPool;

use crate::services::ingest::IngestService;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub receipts: Arc<dyn ReceiptStore>,
    pub images: Arc<dyn ImageStore>,
    pub decoder: Arc<dyn QrDecoder>,
    pub ingest: IngestService,
}
