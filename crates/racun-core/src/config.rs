//! Configuration module
//!
//! Environment-driven configuration for the API and the outbound fiscal
//! service client. Every knob has a default so a local run only needs
//! `DATABASE_URL`.

use std::env;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_IMAGE_SIZE_MB: usize = 10;

/// Host every decoded QR payload must point at.
pub const DEFAULT_VERIFICATION_HOST: &str = "suf.purs.gov.rs";
/// Endpoint the extracted `{invoiceNumber, token}` pair is posted to.
pub const DEFAULT_SPECIFICATIONS_URL: &str = "https://suf.purs.gov.rs/specifications";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// Upper bound for uploaded image bodies, in bytes
    pub max_image_size_bytes: usize,
    /// Timeout applied to each outbound fiscal-service call
    pub http_timeout_seconds: u64,
    pub verification_host: String,
    pub specifications_url: String,
    pub environment: String,
    /// Emit JSON logs instead of the human-readable format
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        // Load .env if present; real env always wins.
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let cors_origins = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_image_size_mb = env::var("MAX_IMAGE_SIZE_MB")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_IMAGE_SIZE_MB);

        Ok(Self {
            server_port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            cors_origins,
            database_url,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS),
            max_image_size_bytes: max_image_size_mb * 1024 * 1024,
            http_timeout_seconds: env::var("HTTP_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            verification_host: env::var("VERIFICATION_HOST")
                .unwrap_or_else(|_| DEFAULT_VERIFICATION_HOST.to_string()),
            specifications_url: env::var("SPECIFICATIONS_URL")
                .unwrap_or_else(|_| DEFAULT_SPECIFICATIONS_URL.to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_json: env::var("LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
