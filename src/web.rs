//! Static asset server.
//!
//! Serves one fixed directory: `GET /` returns the index document, every
//! other path resolves against the directory, anything else is 404. Runs
//! on the same runtime as the protocol client but shares no state with it.

use std::io;
use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the router for the assets directory. Shared between production
/// startup and tests.
pub fn router(assets_dir: impl AsRef<Path>) -> Router {
    let assets_dir = assets_dir.as_ref();

    Router::new()
        .route_service("/", ServeFile::new(assets_dir.join("index.html")))
        .fallback_service(ServeDir::new(assets_dir))
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured port and serve until the task is dropped.
pub async fn serve(port: u16, assets_dir: impl AsRef<Path>) -> io::Result<()> {
    let app = router(assets_dir);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("serving assets on http://{addr}");

    axum::serve(listener, app).await
}
