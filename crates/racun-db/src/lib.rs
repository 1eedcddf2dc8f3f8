//! Racun persistence layer (PostgreSQL via sqlx).
//!
//! The orchestrator depends on the [`ReceiptStore`] and [`ImageStore`]
//! traits, not on Postgres directly; the implementations here carry the
//! uniqueness constraints that make concurrent first-time resolutions safe.

pub mod db;

pub use db::image::{ImageStore, PostgresImageStore};
pub use db::receipt::{PostgresReceiptStore, ReceiptStore, UpsertKey};
