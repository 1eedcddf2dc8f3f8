//! Racun Core Library
//!
//! Domain models, error taxonomy, configuration, image identity and the
//! fiscal content parser shared across all service components. This crate
//! performs no I/O.

pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod parser;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, FetchCallSite, LogLevel};
pub use identity::content_hash;
pub use parser::{parse_verification_page, ParsedVerification};
