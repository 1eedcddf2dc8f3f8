//! Store and service initialization

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use racun_core::Config;
use racun_db::{ImageStore, PostgresImageStore, PostgresReceiptStore, ReceiptStore};
use racun_services::{FiscalGateway, QrDecoder, RqrrQrDecoder, SufClient};
use sqlx::PgPool;

use crate::services::ingest::IngestService;
use crate::state::AppState;

/// Wire the stores, the decoder, the fiscal gateway and the orchestrator
/// into the shared application state.
pub fn initialize_services(config: &Config, pool: PgPool) -> Result<Arc<AppState>> {
    let receipts: Arc<dyn ReceiptStore> = Arc::new(PostgresReceiptStore::new(pool.clone()));
    let images: Arc<dyn ImageStore> = Arc::new(PostgresImageStore::new(pool.clone()));
    let decoder: Arc<dyn QrDecoder> = Arc::new(RqrrQrDecoder::new());

    let gateway: Arc<dyn FiscalGateway> = Arc::new(
        SufClient::new(
            Duration::from_secs(config.http_timeout_seconds),
            config.specifications_url.clone(),
        )
        .context("Failed to build fiscal service client")?,
    );

    let ingest = IngestService::new(
        receipts.clone(),
        images.clone(),
        decoder.clone(),
        gateway,
        config.verification_host.clone(),
    );

    tracing::info!(
        verification_host = %config.verification_host,
        specifications_url = %config.specifications_url,
        "Services initialized"
    );

    Ok(Arc::new(AppState {
        config: config.clone(),
        pool,
        receipts,
        images,
        decoder,
        ingest,
    }))
}
