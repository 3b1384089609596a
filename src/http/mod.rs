//! HTTP surface for the analysis pipeline.
//!
//! An Axum server exposing health plus one POST route per pipeline stage.
//! Stage work runs on the blocking pool; the server stops gracefully on
//! Ctrl-C.

mod routes;

pub use routes::{build_router, HttpState, MAX_BODY_BYTES};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api::AnalysisService;

/// Bind the listener; port 0 picks a free port.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding HTTP listener on {addr}"))
}

/// Serve the router on `listener` until Ctrl-C.
pub async fn run_http_server(listener: TcpListener, service: Arc<AnalysisService>) -> anyhow::Result<()> {
    let local = listener.local_addr().context("reading listener address")?;
    info!("[HTTP] Serving on {}", local);
    let router = build_router(HttpState::new(service));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP router")?;
    info!("[HTTP] Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("[HTTP] Shutdown signal received"),
        Err(err) => {
            error!("[HTTP] Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await
        }
    }
}
