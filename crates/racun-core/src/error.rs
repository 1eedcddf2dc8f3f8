//! Error types module
//!
//! All errors in the receipt pipeline are unified under the [`AppError`] enum.
//! The variants mirror the failure taxonomy of the ingestion pipeline: QR
//! decoding, verification-URL validation, content parsing, the two outbound
//! fiscal-service calls, and storage.

use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like upstream hiccups
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Which of the two outbound fiscal-service calls failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCallSite {
    /// `GET` of the verification page behind the QR code
    VerificationPage,
    /// `POST` to the specifications endpoint
    Specifications,
}

impl std::fmt::Display for FetchCallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchCallSite::VerificationPage => write!(f, "verification page"),
            FetchCallSite::Specifications => write!(f, "specifications endpoint"),
        }
    }
}

/// Metadata for error responses - defines how an error should be presented.
/// This trait allows errors to self-describe their HTTP response characteristics.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "QR_DECODE_NOT_FOUND")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (the whole request can be retried)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("No QR payload found in image")]
    QrDecodeNotFound,

    #[error("Invalid verification URL: {0}")]
    InvalidVerificationUrl(String),

    #[error("Required field '{0}' not found in verification page")]
    MissingField(&'static str),

    #[error("External fetch failed at {call_site} (status: {status:?})")]
    ExternalFetch {
        status: Option<u16>,
        call_site: FetchCallSite,
    },

    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        match self {
            AppError::Database(_) => 500,
            AppError::QrDecodeNotFound => 422,
            AppError::InvalidVerificationUrl(_) => 422,
            AppError::MissingField(_) => 422,
            // Propagate the upstream status when we have one; a timeout or
            // transport failure has none and maps to 502.
            AppError::ExternalFetch { status, .. } => status.unwrap_or(502),
            AppError::StorageConflict(_) => 409,
            AppError::NotFound(_) => 404,
            AppError::InvalidInput(_) => 400,
            AppError::PayloadTooLarge(_) => 413,
            AppError::Internal(_) => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::QrDecodeNotFound => "QR_DECODE_NOT_FOUND",
            AppError::InvalidVerificationUrl(_) => "INVALID_VERIFICATION_URL",
            AppError::MissingField(_) => "MISSING_FIELD",
            AppError::ExternalFetch { .. } => "EXTERNAL_FETCH_ERROR",
            AppError::StorageConflict(_) => "STORAGE_CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::QrDecodeNotFound
                | AppError::ExternalFetch { .. }
                | AppError::StorageConflict(_)
                | AppError::Database(_)
        )
    }

    fn client_message(&self) -> String {
        match self {
            // Never leak driver/internal details to clients
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            AppError::Database(_) | AppError::Internal(_) | AppError::StorageConflict(_) => {
                LogLevel::Error
            }
            AppError::QrDecodeNotFound | AppError::ExternalFetch { .. } => LogLevel::Warn,
            _ => LogLevel::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_fetch_propagates_upstream_status() {
        let err = AppError::ExternalFetch {
            status: Some(503),
            call_site: FetchCallSite::VerificationPage,
        };
        assert_eq!(err.http_status_code(), 503);
        assert!(err.is_recoverable());
    }

    #[test]
    fn external_fetch_without_status_maps_to_bad_gateway() {
        let err = AppError::ExternalFetch {
            status: None,
            call_site: FetchCallSite::Specifications,
        };
        assert_eq!(err.http_status_code(), 502);
        assert_eq!(err.error_code(), "EXTERNAL_FETCH_ERROR");
    }

    #[test]
    fn missing_field_names_the_field() {
        let err = AppError::MissingField("token");
        assert_eq!(err.http_status_code(), 422);
        assert!(err.to_string().contains("token"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn database_details_hidden_from_clients() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.client_message(), "A database error occurred");
        assert_eq!(err.log_level(), LogLevel::Error);
    }
}
