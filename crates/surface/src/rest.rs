//! REST surface: the manifest-declared router nested under `base_path`,
//! plus a `/health` endpoint that reads the shared [`ReadinessGate`].

use crate::readiness::SharedReadinessGate;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::info;

async fn health_handler(Extension(gate): Extension<SharedReadinessGate>) -> impl IntoResponse {
    if gate.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Builds the full REST router: `/health`, the package's own router (if
/// declared) nested under `base_path`, and — in multiplexed mode — the UI
/// static bundle as a fallback under the same `base_path` in multiplexed
/// mode, where a single REST port serves both API and UI. The gate is
/// carried as a request extension rather than typed router state, so it
/// composes with whatever state type the package's own router uses.
pub fn build_router(
    gate: SharedReadinessGate,
    base_path: &str,
    package_router: Option<Router>,
    ui_dir: Option<&Path>,
) -> Router {
    let mut router = Router::new().route("/health", get(health_handler));

    let has_surface = package_router.is_some() || ui_dir.is_some();
    let mut surface = package_router.unwrap_or_default();
    if let Some(dir) = ui_dir {
        surface = surface.fallback_service(ServeDir::new(dir));
    }

    if has_surface {
        router = if base_path == "/" {
            router.merge(surface)
        } else {
            router.nest(base_path, surface)
        };
    }

    router.layer(Extension(gate))
}

/// Serves `router` on `port` until `shutdown` is cancelled, resolving once
/// the listener has bound (the caller awaits this before marking the REST
/// surface ready) and then waits out in-flight requests on graceful
/// shutdown.
pub async fn serve(
    router: Router,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port, "REST surface bound");

    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        });
        if let Err(e) = server.await {
            tracing::error!("REST surface exited with error: {e}");
        }
    });

    Ok(handle)
}
