//! Application setup and initialization
//!
//! All startup logic lives here rather than in main.rs so the pieces can be
//! wired independently.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;

use crate::state::AppState;
use anyhow::Result;
use racun_core::Config;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    tracing::info!(environment = %config.environment, "Configuration loaded");

    // Setup database
    let pool = database::setup_database(&config).await?;

    // Initialize stores and services
    let state = services::initialize_services(&config, pool)?;

    // Setup routes
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
