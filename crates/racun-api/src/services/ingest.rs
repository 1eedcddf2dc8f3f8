//! Receipt ingestion orchestrator.
//!
//! Given raw image bytes (or a verification URL directly), this resolves
//! exactly one canonical receipt for the requesting user while
//! short-circuiting around work already done by this user, by another user,
//! or for the same verification URL. Lookups run in
//! priority order; the QR decode, the two network calls and the parse only
//! happen when every cheaper identity check missed.
//!
//! There is no per-key lock around the resolution; concurrent first-time
//! uploads of the same image race on the final upsert and the storage
//! layer's unique indexes pick the winner. The loser's upsert comes back as
//! the winner's record, so both callers see the same receipt.

use std::sync::Arc;

use racun_core::models::{NewReceipt, Receipt, StoredImage, VerificationUrl, DEFAULT_CATEGORY};
use racun_core::{content_hash, parse_verification_page, AppError};
use racun_db::{ImageStore, ReceiptStore, UpsertKey};
use racun_services::{FiscalGateway, QrDecoder};

#[derive(Clone)]
pub struct IngestService {
    receipts: Arc<dyn ReceiptStore>,
    images: Arc<dyn ImageStore>,
    decoder: Arc<dyn QrDecoder>,
    gateway: Arc<dyn FiscalGateway>,
    verification_host: String,
}

impl IngestService {
    pub fn new(
        receipts: Arc<dyn ReceiptStore>,
        images: Arc<dyn ImageStore>,
        decoder: Arc<dyn QrDecoder>,
        gateway: Arc<dyn FiscalGateway>,
        verification_host: String,
    ) -> Self {
        Self {
            receipts,
            images,
            decoder,
            gateway,
            verification_host,
        }
    }

    /// Resolve uploaded image bytes into the canonical receipt for `user_name`.
    #[tracing::instrument(skip(self, image_bytes), fields(user_name, request_id))]
    pub async fn resolve_image(
        &self,
        image_bytes: &[u8],
        user_name: &str,
        request_id: &str,
    ) -> Result<Receipt, AppError> {
        let image_name = content_hash(image_bytes);

        // Owned exact match: this user already resolved these exact bytes.
        if let Some(receipt) = self
            .receipts
            .find_by_image_and_user(&image_name, user_name)
            .await?
        {
            tracing::debug!(request_id, image_name, "image already resolved for user");
            return Ok(receipt);
        }

        // Foreign image match: someone resolved these exact bytes. Their
        // record carries the verification URL, so no decode is needed.
        if let Some(foreign) = self.receipts.find_by_image(&image_name).await? {
            if let Some(own) = self
                .receipts
                .find_by_url_and_user(&foreign.qr_url, user_name)
                .await?
            {
                return Ok(own);
            }
            tracing::info!(
                request_id,
                image_name,
                source_user = %foreign.user_name,
                "cloning receipt resolved by another user"
            );
            let clone = NewReceipt::clone_for_user(&foreign, user_name, &image_name);
            return self.receipts.upsert(clone, UpsertKey::ImageUser).await;
        }

        // Never-seen image: decode the QR payload. A failed decode still
        // leaves a debug artifact so the image can be re-decoded later.
        let payload = match self.decoder.decode(image_bytes).await {
            Ok(payload) => payload,
            Err(err @ AppError::QrDecodeNotFound) => {
                let stored = StoredImage::new(&image_name, user_name, image_bytes.to_vec());
                self.images.insert_if_absent(&stored).await?;
                tracing::info!(request_id, image_name, "image saved for later decode debugging");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let url = VerificationUrl::parse(&payload, &self.verification_host)?;

        self.resolve_for_url(&url, image_name, user_name, request_id)
            .await
    }

    /// Resolve a known verification URL (no image bytes available).
    ///
    /// Used when a URL was obtained out of band, e.g. re-decoded from a
    /// stored debug image. A receipt created this way gets a synthetic
    /// image name derived from the URL itself so the dedup identities stay
    /// total.
    #[tracing::instrument(skip(self), fields(user_name, request_id))]
    pub async fn resolve_url(
        &self,
        raw_url: &str,
        user_name: &str,
        request_id: &str,
    ) -> Result<Receipt, AppError> {
        let url = VerificationUrl::parse(raw_url, &self.verification_host)?;
        let image_name = content_hash(url.as_str().as_bytes());
        self.resolve_for_url(&url, image_name, user_name, request_id)
            .await
    }

    /// URL-keyed resolution: owned URL match, foreign URL clone, or the full
    /// fetch-parse-fetch pipeline.
    async fn resolve_for_url(
        &self,
        url: &VerificationUrl,
        image_name: String,
        user_name: &str,
        request_id: &str,
    ) -> Result<Receipt, AppError> {
        // Same receipt re-photographed by the same user.
        if let Some(own) = self
            .receipts
            .find_by_url_and_user(url.as_str(), user_name)
            .await?
        {
            return Ok(own);
        }

        // Same receipt resolved by another user: clone, no external call.
        if let Some(foreign) = self.receipts.find_by_url(url.as_str()).await? {
            tracing::info!(
                request_id,
                url = %url,
                source_user = %foreign.user_name,
                "cloning receipt with known verification URL"
            );
            let clone = NewReceipt::clone_for_user(&foreign, user_name, &image_name);
            return self.receipts.upsert(clone, UpsertKey::ImageUser).await;
        }

        // Full resolution: fetch page, parse, fetch line items, persist.
        let page = self.gateway.fetch_verification_page(url).await?;
        let parsed = parse_verification_page(&page)?;
        let items = self
            .gateway
            .fetch_specifications(&parsed.invoice_number, &parsed.token)
            .await?;

        tracing::info!(
            request_id,
            url = %url,
            item_count = items.len(),
            "receipt fully resolved"
        );

        let receipt = NewReceipt {
            image_name,
            user_name: user_name.to_string(),
            qr_url: url.as_str().to_string(),
            dt: parsed.dt,
            seller: parsed.seller,
            items,
            category: DEFAULT_CATEGORY.to_string(),
        };
        self.receipts.upsert(receipt, UpsertKey::ImageUserUrl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use racun_core::models::{LineItem, SellerInfo};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Barrier;
    use uuid::Uuid;

    const HOST: &str = "suf.purs.gov.rs";
    const URL_A: &str = "https://suf.purs.gov.rs/v/?vl=AAAA";
    const URL_B: &str = "https://suf.purs.gov.rs/v/?vl=BBBB";

    fn sample_page() -> String {
        let meta = [
            "112233445",
            "PREDUZEĆE D.O.O.",
            "1023456-Prodavnica 7",
            "БУЛЕВАР КРАЉА АЛЕКСАНДРА 100",
            "Београд-Звездара",
            "Kasir 2",
            "ESIR br: 125/2.0",
        ]
        .join("\r\n");

        format!(
            concat!(
                "<span id=\"sdcDateTimeLabel\">14.02.2025. 18:35:02</span>\n",
                "============ ФИСКАЛНИ РАЧУН ============\r\n",
                "{meta}\r\n",
                "-------------ПРОМЕТ ПРОДАЈА-------------\n",
                "viewModel.InvoiceNumber('XYZW1234-XYZW1234-51234');\n",
                "viewModel.Token('3cd30f60-3c5e-4a50-b49e-a34b4d07a15f');"
            ),
            meta = meta
        )
    }

    fn sample_item() -> LineItem {
        LineItem {
            gtin: "8600000000001".into(),
            name: "Mleko 2.8%".into(),
            quantity: 1.0,
            total: 129.99,
            unit_price: 129.99,
            label: "Ђ".into(),
            label_rate: 20.0,
            tax_base_amount: 108.33,
            vat_amount: 21.66,
        }
    }

    // ----- In-memory stores mirroring the Postgres index semantics -----

    #[derive(Default)]
    struct MemReceiptStore {
        rows: Mutex<Vec<Receipt>>,
    }

    impl MemReceiptStore {
        fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReceiptStore for MemReceiptStore {
        async fn find_by_image_and_user(
            &self,
            image_name: &str,
            user_name: &str,
        ) -> Result<Option<Receipt>, AppError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.image_name == image_name && r.user_name == user_name)
                .cloned())
        }

        async fn find_by_image(&self, image_name: &str) -> Result<Option<Receipt>, AppError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.image_name == image_name)
                .cloned())
        }

        async fn find_by_url_and_user(
            &self,
            qr_url: &str,
            user_name: &str,
        ) -> Result<Option<Receipt>, AppError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.qr_url == qr_url && r.user_name == user_name)
                .cloned())
        }

        async fn find_by_url(&self, qr_url: &str) -> Result<Option<Receipt>, AppError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.qr_url == qr_url)
                .cloned())
        }

        async fn get_by_id(&self, id: Uuid) -> Result<Option<Receipt>, AppError> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }

        async fn list(
            &self,
            user_name: &str,
            _from_dt: Option<DateTime<Utc>>,
            _ascending: bool,
        ) -> Result<Vec<Receipt>, AppError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_name == user_name)
                .cloned()
                .collect())
        }

        async fn upsert(&self, receipt: NewReceipt, key: UpsertKey) -> Result<Receipt, AppError> {
            let mut rows = self.rows.lock().unwrap();

            // Conflict on the chosen key replaces the row's content,
            // keeping the winner's id (ON CONFLICT ... DO UPDATE).
            let pos = rows.iter().position(|r| match key {
                UpsertKey::ImageUser => {
                    r.image_name == receipt.image_name && r.user_name == receipt.user_name
                }
                UpsertKey::ImageUserUrl => {
                    r.image_name == receipt.image_name
                        && r.user_name == receipt.user_name
                        && r.qr_url == receipt.qr_url
                }
            });
            if let Some(i) = pos {
                let row = &mut rows[i];
                row.qr_url = receipt.qr_url;
                row.dt = receipt.dt;
                row.seller = receipt.seller;
                row.items = receipt.items;
                row.category = receipt.category;
                return Ok(row.clone());
            }

            // A violation of one of the other unique indexes reconciles
            // into a read of the winning row, as the Postgres store does.
            if let Some(winner) = rows
                .iter()
                .find(|r| r.qr_url == receipt.qr_url && r.user_name == receipt.user_name)
            {
                return Ok(winner.clone());
            }
            if let Some(winner) = rows
                .iter()
                .find(|r| r.image_name == receipt.image_name && r.user_name == receipt.user_name)
            {
                return Ok(winner.clone());
            }

            let row = Receipt {
                id: Uuid::new_v4(),
                image_name: receipt.image_name,
                user_name: receipt.user_name,
                qr_url: receipt.qr_url,
                dt: receipt.dt,
                seller: receipt.seller,
                items: receipt.items,
                category: receipt.category,
                created_at: Utc::now(),
            };
            rows.push(row.clone());
            Ok(row)
        }

        async fn update_category(
            &self,
            id: Uuid,
            user_name: &str,
            category: &str,
        ) -> Result<Option<Receipt>, AppError> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows
                .iter_mut()
                .find(|r| r.id == id && r.user_name == user_name)
            {
                row.category = category.to_string();
                return Ok(Some(row.clone()));
            }
            Ok(None)
        }
    }

    #[derive(Default)]
    struct MemImageStore {
        rows: Mutex<HashMap<(String, String), Vec<u8>>>,
    }

    impl MemImageStore {
        fn contains(&self, image_name: &str, user_name: &str) -> bool {
            self.rows
                .lock()
                .unwrap()
                .contains_key(&(image_name.to_string(), user_name.to_string()))
        }

        fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ImageStore for MemImageStore {
        async fn find_by_name(&self, image_name: &str) -> Result<Option<StoredImage>, AppError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|((name, _), _)| name == image_name)
                .map(|((name, user), bytes)| StoredImage::new(name, user, bytes.clone())))
        }

        async fn insert_if_absent(&self, image: &StoredImage) -> Result<bool, AppError> {
            let mut rows = self.rows.lock().unwrap();
            let key = (image.image_name.clone(), image.user_name.clone());
            if rows.contains_key(&key) {
                return Ok(false);
            }
            rows.insert(key, image.bytes.clone());
            Ok(true)
        }

        async fn list_names(&self, user_name: &str) -> Result<Vec<String>, AppError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .keys()
                .filter(|(_, user)| user == user_name)
                .map(|(name, _)| name.clone())
                .collect())
        }
    }

    // ----- Mock capabilities with call counters -----

    struct MockDecoder {
        payload: Option<String>,
        calls: AtomicUsize,
    }

    impl MockDecoder {
        fn returning(payload: &str) -> Self {
            Self {
                payload: Some(payload.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn not_found() -> Self {
            Self {
                payload: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QrDecoder for MockDecoder {
        async fn decode(&self, _image_bytes: &[u8]) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payload.clone().ok_or(AppError::QrDecodeNotFound)
        }
    }

    struct MockGateway {
        page: String,
        items: Vec<LineItem>,
        page_calls: AtomicUsize,
        spec_calls: AtomicUsize,
        // When set, fetch_verification_page waits until all racers arrive,
        // forcing concurrent resolutions past every lookup before any upsert.
        barrier: Option<Arc<Barrier>>,
    }

    impl MockGateway {
        fn new(page: String, items: Vec<LineItem>) -> Self {
            Self {
                page,
                items,
                page_calls: AtomicUsize::new(0),
                spec_calls: AtomicUsize::new(0),
                barrier: None,
            }
        }

        fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
            self.barrier = Some(barrier);
            self
        }

        fn page_call_count(&self) -> usize {
            self.page_calls.load(Ordering::SeqCst)
        }

        fn spec_call_count(&self) -> usize {
            self.spec_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FiscalGateway for MockGateway {
        async fn fetch_verification_page(
            &self,
            _url: &VerificationUrl,
        ) -> Result<String, AppError> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            Ok(self.page.clone())
        }

        async fn fetch_specifications(
            &self,
            _invoice_number: &str,
            _token: &str,
        ) -> Result<Vec<LineItem>, AppError> {
            self.spec_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.clone())
        }
    }

    struct Harness {
        receipts: Arc<MemReceiptStore>,
        images: Arc<MemImageStore>,
        decoder: Arc<MockDecoder>,
        gateway: Arc<MockGateway>,
        service: IngestService,
    }

    fn harness(decoder: MockDecoder, gateway: MockGateway) -> Harness {
        let receipts = Arc::new(MemReceiptStore::default());
        let images = Arc::new(MemImageStore::default());
        let decoder = Arc::new(decoder);
        let gateway = Arc::new(gateway);
        let service = IngestService::new(
            receipts.clone(),
            images.clone(),
            decoder.clone(),
            gateway.clone(),
            HOST.to_string(),
        );
        Harness {
            receipts,
            images,
            decoder,
            gateway,
            service,
        }
    }

    #[tokio::test]
    async fn resolving_same_image_twice_is_idempotent() {
        let h = harness(
            MockDecoder::returning(URL_A),
            MockGateway::new(sample_page(), vec![sample_item()]),
        );

        let first = h.service.resolve_image(b"bytes", "ana", "req-1").await.unwrap();
        let second = h.service.resolve_image(b"bytes", "ana", "req-2").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(h.decoder.call_count(), 1);
        assert_eq!(h.gateway.page_call_count(), 1);
        assert_eq!(h.gateway.spec_call_count(), 1);
        assert_eq!(h.receipts.row_count(), 1);
    }

    #[tokio::test]
    async fn second_user_gets_clone_without_external_calls() {
        let h = harness(
            MockDecoder::returning(URL_A),
            MockGateway::new(sample_page(), vec![sample_item()]),
        );

        let ana = h.service.resolve_image(b"bytes", "ana", "req-1").await.unwrap();
        let ceca = h.service.resolve_image(b"bytes", "ceca", "req-2").await.unwrap();

        assert_eq!(ceca.user_name, "ceca");
        assert_ne!(ceca.id, ana.id);
        assert_eq!(ceca.seller, ana.seller);
        assert_eq!(ceca.items, ana.items);
        assert_eq!(ceca.qr_url, ana.qr_url);

        // The whole point: no decode, no network for the second uploader.
        assert_eq!(h.decoder.call_count(), 1);
        assert_eq!(h.gateway.page_call_count(), 1);
        assert_eq!(h.gateway.spec_call_count(), 1);
        assert_eq!(h.receipts.row_count(), 2);
    }

    #[tokio::test]
    async fn different_images_with_same_url_converge() {
        let h = harness(
            MockDecoder::returning(URL_A),
            MockGateway::new(sample_page(), vec![sample_item()]),
        );

        let first = h.service.resolve_image(b"photo one", "ana", "req-1").await.unwrap();
        let second = h.service.resolve_image(b"photo two", "ana", "req-2").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(h.receipts.row_count(), 1);
        assert_eq!(h.gateway.page_call_count(), 1);
    }

    #[tokio::test]
    async fn missing_token_fails_and_stores_nothing() {
        let page = sample_page().replace("viewModel.Token", "viewModel.Gone");
        let h = harness(
            MockDecoder::returning(URL_A),
            MockGateway::new(page, vec![sample_item()]),
        );

        let err = h.service.resolve_image(b"bytes", "ana", "req-1").await.unwrap_err();
        assert!(matches!(err, AppError::MissingField("token")));
        assert_eq!(h.receipts.row_count(), 0);
        assert_eq!(h.gateway.spec_call_count(), 0);
    }

    #[tokio::test]
    async fn foreign_host_is_rejected_without_side_effects() {
        let h = harness(
            MockDecoder::returning("https://not-suf.example/x"),
            MockGateway::new(sample_page(), vec![sample_item()]),
        );

        let err = h.service.resolve_image(b"bytes", "ana", "req-1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidVerificationUrl(_)));
        assert_eq!(h.gateway.page_call_count(), 0);
        assert_eq!(h.receipts.row_count(), 0);
        assert_eq!(h.images.len(), 0);
    }

    #[tokio::test]
    async fn failed_decode_captures_image_for_debugging() {
        let h = harness(
            MockDecoder::not_found(),
            MockGateway::new(sample_page(), vec![sample_item()]),
        );

        let bytes = b"unreadable photo";
        let err = h.service.resolve_image(bytes, "ana", "req-1").await.unwrap_err();
        assert!(matches!(err, AppError::QrDecodeNotFound));

        let image_name = content_hash(bytes);
        assert!(h.images.contains(&image_name, "ana"));
        assert_eq!(h.receipts.row_count(), 0);
    }

    #[tokio::test]
    async fn zero_item_receipt_is_stored() {
        let h = harness(
            MockDecoder::returning(URL_A),
            MockGateway::new(sample_page(), Vec::new()),
        );

        let receipt = h.service.resolve_image(b"bytes", "ana", "req-1").await.unwrap();
        assert!(receipt.items.is_empty());
        assert_eq!(h.receipts.row_count(), 1);
    }

    #[tokio::test]
    async fn resolve_url_clones_foreign_record_without_fetch() {
        let h = harness(
            MockDecoder::returning(URL_B),
            MockGateway::new(sample_page(), vec![sample_item()]),
        );

        h.service.resolve_image(b"bytes", "ana", "req-1").await.unwrap();
        let ceca = h.service.resolve_url(URL_B, "ceca", "req-2").await.unwrap();

        assert_eq!(ceca.user_name, "ceca");
        assert_eq!(ceca.qr_url, URL_B);
        assert_eq!(h.gateway.page_call_count(), 1);
        assert_eq!(h.receipts.row_count(), 2);
    }

    #[tokio::test]
    async fn resolve_url_rejects_foreign_host() {
        let h = harness(
            MockDecoder::returning(URL_A),
            MockGateway::new(sample_page(), vec![sample_item()]),
        );

        let err = h
            .service
            .resolve_url("https://not-suf.example/x", "ana", "req-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidVerificationUrl(_)));
    }

    #[tokio::test]
    async fn concurrent_first_time_resolutions_converge_on_one_record() {
        let barrier = Arc::new(Barrier::new(2));
        let h = harness(
            MockDecoder::returning(URL_A),
            MockGateway::new(sample_page(), vec![sample_item()]).with_barrier(barrier),
        );

        let svc_a = h.service.clone();
        let svc_b = h.service.clone();
        let (a, b) = tokio::join!(
            svc_a.resolve_image(b"bytes", "ana", "req-1"),
            svc_b.resolve_image(b"bytes", "ana", "req-2"),
        );

        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(h.receipts.row_count(), 1);
    }
}
