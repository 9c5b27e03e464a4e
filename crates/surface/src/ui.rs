//! UI surface: static asset serving via `tower-http`'s `ServeDir`. Has no
//! in-flight request state worth draining, so shutdown just drops the
//! listener.

use std::net::SocketAddr;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::info;

pub async fn serve(
    dir: &Path,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let router = axum::Router::new().fallback_service(ServeDir::new(dir));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port, dir = %dir.display(), "UI surface bound");

    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        });
        if let Err(e) = server.await {
            tracing::error!("UI surface exited with error: {e}");
        }
    });

    Ok(handle)
}
