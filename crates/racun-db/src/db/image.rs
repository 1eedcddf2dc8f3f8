use async_trait::async_trait;
use racun_core::models::StoredImage;
use racun_core::AppError;
use sqlx::{PgPool, Row};

/// Persistence contract for raw image bytes.
///
/// Images are write-once per `(image_name, user_name)`; a second upload of
/// the same bytes by the same user is a no-op.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Any user, first match. Used when re-decoding a stored image by name.
    async fn find_by_name(&self, image_name: &str) -> Result<Option<StoredImage>, AppError>;

    /// Returns `true` when a row was written, `false` when one already existed.
    async fn insert_if_absent(&self, image: &StoredImage) -> Result<bool, AppError>;

    async fn list_names(&self, user_name: &str) -> Result<Vec<String>, AppError>;
}

#[derive(Clone)]
pub struct PostgresImageStore {
    pool: PgPool,
}

impl PostgresImageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageStore for PostgresImageStore {
    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "select"))]
    async fn find_by_name(&self, image_name: &str) -> Result<Option<StoredImage>, AppError> {
        let row = sqlx::query(
            "SELECT image_name, user_name, bytes FROM images WHERE image_name = $1 LIMIT 1",
        )
        .bind(image_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StoredImage {
            image_name: r.get("image_name"),
            user_name: r.get("user_name"),
            bytes: r.get("bytes"),
        }))
    }

    #[tracing::instrument(
        skip(self, image),
        fields(
            db.table = "images",
            db.operation = "insert",
            image_name = %image.image_name,
            user_name = %image.user_name,
        )
    )]
    async fn insert_if_absent(&self, image: &StoredImage) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO images (image_name, user_name, bytes) VALUES ($1, $2, $3) \
             ON CONFLICT (image_name, user_name) DO NOTHING",
        )
        .bind(&image.image_name)
        .bind(&image.user_name)
        .bind(&image.bytes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "select"))]
    async fn list_names(&self, user_name: &str) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT image_name FROM images WHERE user_name = $1")
            .bind(user_name)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.get("image_name")).collect())
    }
}
