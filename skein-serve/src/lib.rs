//! HTTP + SSE adapter exposing a bound `skein::Workflow` as a network
//! surface; the core itself never listens on a socket. Uses an axum
//! `Router` over a bound `AppState`, with one SSE stream per workflow run.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`].

mod app;
mod error;
mod runs;

use std::sync::Arc;

use skein::Workflow;
use tokio::net::TcpListener;
use tracing::info;

pub use app::AppState;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Runs the HTTP server on an existing listener until `shutdown` resolves.
/// Used by tests (bind to `127.0.0.1:0`, pass the listener, cancel a token
/// to stop).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    workflow: Arc<Workflow>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!(%addr, "skein-serve listening");

    let app = app::router(AppState::new(workflow));
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

/// Runs the HTTP server on `addr` (default `127.0.0.1:8080`) until `shutdown`
/// resolves.
pub async fn run_serve(
    addr: Option<&str>,
    workflow: Arc<Workflow>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, workflow, shutdown).await
}
