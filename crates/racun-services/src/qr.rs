//! QR payload decoding capability.
//!
//! The orchestrator depends only on the [`QrDecoder`] trait: bytes in,
//! decoded text or a typed not-found out. The vision algorithm behind it is
//! replaceable; [`RqrrQrDecoder`] is the default implementation.

use std::time::Instant;

use async_trait::async_trait;
use racun_core::AppError;

#[async_trait]
pub trait QrDecoder: Send + Sync {
    /// Decode the first QR payload found in the image.
    ///
    /// Returns [`AppError::QrDecodeNotFound`] for unreadable or QR-free
    /// images; that is an expected outcome, not a crash.
    async fn decode(&self, image_bytes: &[u8]) -> Result<String, AppError>;
}

/// Pure-Rust decoder backed by `image` + `rqrr`.
#[derive(Debug, Default, Clone)]
pub struct RqrrQrDecoder;

impl RqrrQrDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QrDecoder for RqrrQrDecoder {
    /// Detection is CPU-bound on photo-sized inputs, so it runs inside
    /// `spawn_blocking` to keep the runtime worker threads free.
    async fn decode(&self, image_bytes: &[u8]) -> Result<String, AppError> {
        let start = Instant::now();
        let bytes = image_bytes.to_vec();

        let result = tokio::task::spawn_blocking(move || decode_blocking(&bytes))
            .await
            .map_err(|e| AppError::Internal(format!("QR decode task failed: {e}")))?;

        tracing::debug!(
            duration_ms = start.elapsed().as_millis(),
            found = result.is_ok(),
            "QR decode finished"
        );
        result
    }
}

fn decode_blocking(bytes: &[u8]) -> Result<String, AppError> {
    // Bytes that do not decode as an image cannot carry a QR payload either;
    // both cases report not-found so the caller stores the debug artifact.
    let luma = image::load_from_memory(bytes)
        .map_err(|_| AppError::QrDecodeNotFound)?
        .to_luma8();

    let mut prepared = rqrr::PreparedImage::prepare(luma);
    for grid in prepared.detect_grids() {
        if let Ok((_meta, content)) = grid.decode() {
            return Ok(content);
        }
    }
    Err(AppError::QrDecodeNotFound)
}
