use async_trait::async_trait;
use chrono::{DateTime, Utc};
use racun_core::models::{NewReceipt, Receipt};
use racun_core::AppError;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

/// Key set an upsert matches on. Postgres resolves the conflict against the
/// unique index backing the chosen key; violations of the *other* unique
/// indexes surface as `23505` and are reconciled by a re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKey {
    /// `(image_name, user_name)`: used when cloning a resolved receipt for
    /// another uploader of the same bytes
    ImageUser,
    /// `(image_name, user_name, qr_url)`: used on full resolution
    ImageUserUrl,
}

/// Persistence contract the ingestion orchestrator depends on.
///
/// Implementations must enforce uniqueness on `(qr_url, user_name)`,
/// `(image_name, user_name)` and `(image_name, user_name, qr_url)`
/// independently of application logic, and must resolve a losing concurrent
/// upsert into the winner's record instead of an error.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn find_by_image_and_user(
        &self,
        image_name: &str,
        user_name: &str,
    ) -> Result<Option<Receipt>, AppError>;

    /// Any user, first match.
    async fn find_by_image(&self, image_name: &str) -> Result<Option<Receipt>, AppError>;

    async fn find_by_url_and_user(
        &self,
        qr_url: &str,
        user_name: &str,
    ) -> Result<Option<Receipt>, AppError>;

    /// Any user, first match.
    async fn find_by_url(&self, qr_url: &str) -> Result<Option<Receipt>, AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Receipt>, AppError>;

    async fn list(
        &self,
        user_name: &str,
        from_dt: Option<DateTime<Utc>>,
        ascending: bool,
    ) -> Result<Vec<Receipt>, AppError>;

    /// Replace-or-insert by the given key set, returning the persisted row.
    async fn upsert(&self, receipt: NewReceipt, key: UpsertKey) -> Result<Receipt, AppError>;

    /// Update the user-assigned category; the only mutable receipt field.
    async fn update_category(
        &self,
        id: Uuid,
        user_name: &str,
        category: &str,
    ) -> Result<Option<Receipt>, AppError>;
}

const RECEIPT_COLUMNS: &str =
    "id, image_name, user_name, qr_url, dt, seller, items, category, created_at";

#[derive(Debug, FromRow)]
struct ReceiptRow {
    id: Uuid,
    image_name: String,
    user_name: String,
    qr_url: String,
    dt: DateTime<Utc>,
    seller: JsonValue,
    items: JsonValue,
    category: String,
    created_at: DateTime<Utc>,
}

impl ReceiptRow {
    fn into_receipt(self) -> Result<Receipt, AppError> {
        let seller = serde_json::from_value(self.seller)
            .map_err(|e| AppError::Internal(format!("corrupt seller column: {e}")))?;
        let items = serde_json::from_value(self.items)
            .map_err(|e| AppError::Internal(format!("corrupt items column: {e}")))?;
        Ok(Receipt {
            id: self.id,
            image_name: self.image_name,
            user_name: self.user_name,
            qr_url: self.qr_url,
            dt: self.dt,
            seller,
            items,
            category: self.category,
            created_at: self.created_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[derive(Clone)]
pub struct PostgresReceiptStore {
    pool: PgPool,
}

impl PostgresReceiptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, where_clause: &str, binds: &[&str]) -> Result<Option<Receipt>, AppError> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE {where_clause} LIMIT 1");
        let mut query = sqlx::query_as::<Postgres, ReceiptRow>(&sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        let row = query.fetch_optional(&self.pool).await?;
        row.map(ReceiptRow::into_receipt).transpose()
    }

    /// A concurrent writer won one of the unique indexes. Read its row back;
    /// the URL+user pair is checked first since that is the identity of the
    /// physical receipt for this user.
    async fn reconcile_conflict(&self, receipt: &NewReceipt) -> Result<Receipt, AppError> {
        if let Some(existing) = self
            .find_by_url_and_user(&receipt.qr_url, &receipt.user_name)
            .await?
        {
            return Ok(existing);
        }
        if let Some(existing) = self
            .find_by_image_and_user(&receipt.image_name, &receipt.user_name)
            .await?
        {
            return Ok(existing);
        }
        // The winning row disappeared between the violation and the re-read;
        // callers treat this as retryable.
        Err(AppError::StorageConflict(format!(
            "unique violation for image={} user={} but no winning row found",
            receipt.image_name, receipt.user_name
        )))
    }
}

#[async_trait]
impl ReceiptStore for PostgresReceiptStore {
    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "select"))]
    async fn find_by_image_and_user(
        &self,
        image_name: &str,
        user_name: &str,
    ) -> Result<Option<Receipt>, AppError> {
        self.find_one("image_name = $1 AND user_name = $2", &[image_name, user_name])
            .await
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "select"))]
    async fn find_by_image(&self, image_name: &str) -> Result<Option<Receipt>, AppError> {
        self.find_one("image_name = $1", &[image_name]).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "select"))]
    async fn find_by_url_and_user(
        &self,
        qr_url: &str,
        user_name: &str,
    ) -> Result<Option<Receipt>, AppError> {
        self.find_one("qr_url = $1 AND user_name = $2", &[qr_url, user_name])
            .await
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "select"))]
    async fn find_by_url(&self, qr_url: &str) -> Result<Option<Receipt>, AppError> {
        self.find_one("qr_url = $1", &[qr_url]).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "select"))]
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Receipt>, AppError> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = $1");
        let row = sqlx::query_as::<Postgres, ReceiptRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ReceiptRow::into_receipt).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "select"))]
    async fn list(
        &self,
        user_name: &str,
        from_dt: Option<DateTime<Utc>>,
        ascending: bool,
    ) -> Result<Vec<Receipt>, AppError> {
        let order = if ascending { "ASC" } else { "DESC" };
        let sql = format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts \
             WHERE user_name = $1 AND ($2::timestamptz IS NULL OR dt >= $2) \
             ORDER BY dt {order}"
        );
        let rows = sqlx::query_as::<Postgres, ReceiptRow>(&sql)
            .bind(user_name)
            .bind(from_dt)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ReceiptRow::into_receipt).collect()
    }

    #[tracing::instrument(
        skip(self, receipt),
        fields(
            db.table = "receipts",
            db.operation = "upsert",
            image_name = %receipt.image_name,
            user_name = %receipt.user_name,
        )
    )]
    async fn upsert(&self, receipt: NewReceipt, key: UpsertKey) -> Result<Receipt, AppError> {
        let conflict_target = match key {
            UpsertKey::ImageUser => "(image_name, user_name)",
            UpsertKey::ImageUserUrl => "(image_name, user_name, qr_url)",
        };
        let sql = format!(
            "INSERT INTO receipts (id, image_name, user_name, qr_url, dt, seller, items, category) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT {conflict_target} DO UPDATE SET \
                 qr_url = EXCLUDED.qr_url, \
                 dt = EXCLUDED.dt, \
                 seller = EXCLUDED.seller, \
                 items = EXCLUDED.items, \
                 category = EXCLUDED.category \
             RETURNING {RECEIPT_COLUMNS}"
        );

        let seller = serde_json::to_value(&receipt.seller)
            .map_err(|e| AppError::Internal(format!("seller serialization failed: {e}")))?;
        let items = serde_json::to_value(&receipt.items)
            .map_err(|e| AppError::Internal(format!("items serialization failed: {e}")))?;

        let result = sqlx::query_as::<Postgres, ReceiptRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&receipt.image_name)
            .bind(&receipt.user_name)
            .bind(&receipt.qr_url)
            .bind(receipt.dt)
            .bind(seller)
            .bind(items)
            .bind(&receipt.category)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => row.into_receipt(),
            // A concurrent writer beat us on one of the other unique indexes.
            // The loser's write becomes a read of the winner's record.
            Err(err) if is_unique_violation(&err) => {
                tracing::warn!(
                    image_name = %receipt.image_name,
                    user_name = %receipt.user_name,
                    "upsert lost a uniqueness race, re-reading winner"
                );
                self.reconcile_conflict(&receipt).await
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "receipts", db.operation = "update"))]
    async fn update_category(
        &self,
        id: Uuid,
        user_name: &str,
        category: &str,
    ) -> Result<Option<Receipt>, AppError> {
        let sql = format!(
            "UPDATE receipts SET category = $3 \
             WHERE id = $1 AND user_name = $2 \
             RETURNING {RECEIPT_COLUMNS}"
        );
        let row = sqlx::query_as::<Postgres, ReceiptRow>(&sql)
            .bind(id)
            .bind(user_name)
            .bind(category)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ReceiptRow::into_receipt).transpose()
    }
}
