//! Orchestrates the graceful shutdown sequence: flip readiness, drain
//! RPC, drain REST, drop UI, release the downloaded package.

use crate::readiness::SharedReadinessGate;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Surfaces {
    pub rpc: Option<(CancellationToken, JoinHandle<()>)>,
    pub rest: Option<(CancellationToken, JoinHandle<()>)>,
    pub ui: Option<(CancellationToken, JoinHandle<()>)>,
}

/// Runs the ordered drain on a polite termination signal, then releases
/// the downloaded package file (if any) so the caller can exit 0.
pub async fn graceful_shutdown(
    gate: &SharedReadinessGate,
    surfaces: Surfaces,
    grace: Duration,
    downloaded_package: Option<PathBuf>,
) {
    gate.mark_not_ready();
    info!("readiness flipped to not-ready, beginning drain");

    let deadline = tokio::time::Instant::now() + grace;

    if let Some((token, handle)) = surfaces.rpc {
        token.cancel();
        let _ = tokio::time::timeout_at(deadline, handle).await;
        info!("RPC surface drained");
    }

    if let Some((token, handle)) = surfaces.rest {
        token.cancel();
        // REST gets whatever remains of the grace budget after the RPC
        // drain, not a fresh allotment.
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let _ = tokio::time::timeout(remaining, handle).await;
        info!("REST surface drained");
    }

    if let Some((token, handle)) = surfaces.ui {
        token.cancel();
        let _ = handle.await;
        info!("UI surface closed");
    }

    if let Some(path) = downloaded_package {
        let _ = tokio::fs::remove_file(&path).await;
        info!(path = %path.display(), "released downloaded package");
    }
}
