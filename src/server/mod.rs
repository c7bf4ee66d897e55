//! The widget-config endpoint the runtime fetches display settings from.

pub mod directory;
pub mod origin;
pub mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;

pub use directory::{CompanyDirectory, CompanyRecord, CompanyStatus};
pub use routes::ConfigState;

const ENABLE_LOGS: bool = true;

use crate::widget_info;

pub fn router(directory: CompanyDirectory) -> Router {
    let state = ConfigState {
        directory: Arc::new(directory),
    };
    Router::new()
        .route(
            "/api/widget-config",
            get(routes::get_widget_config).options(routes::preflight),
        )
        .route("/health", get(routes::get_health))
        .with_state(state)
}

/// Binds `bind` and serves the endpoint until the process exits.
pub async fn serve(bind: &str, directory: CompanyDirectory) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind widget config server to {bind}"))?;
    let local = listener.local_addr().context("Listener has no local address")?;
    widget_info!(
        "widget config server listening on {} ({} companies)",
        local,
        directory.len()
    );

    axum::serve(listener, router(directory))
        .await
        .context("Widget config server stopped unexpectedly")
}
