//! Three-Surface Runtime: the library half of the agent process the
//! Supervisor spawns. One process serves up to three surfaces — REST,
//! RPC, UI — concurrently, gated behind a single readiness flag and a
//! shared boot budget.

pub mod boot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod readiness;
pub mod rest;
pub mod rpc;
pub mod shutdown;
pub mod ui;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use handlers::AgentHandlers;
pub use readiness::{ReadinessGate, SharedReadinessGate};

use agentrt_package::manifest as manifest_reader;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the full boot → serve → drain lifecycle for one package, using
/// `handlers` for whatever REST/RPC logic the package itself implements.
/// Returns the process exit code the caller's `main` should use.
///
/// On failure, sleeps `min(60, 2^BOOT_FAILURE_COUNT)` seconds *before*
/// returning, per the boot back-off rule: the first failure (count 0 on
/// entry) exits immediately, subsequent consecutive failures
/// sleep longer each time. A successful boot never sleeps here — the
/// counter reset is the external orchestrator's responsibility when it
/// next spawns with `BOOT_FAILURE_COUNT=0`.
pub async fn run(config: RuntimeConfig, handlers: Arc<dyn AgentHandlers>) -> i32 {
    let failure_count = config.boot_failure_count;
    match run_inner(config, handlers).await {
        Ok(()) => 0,
        Err(e) => {
            let delay = boot::backoff_delay(failure_count);
            if !delay.is_zero() {
                warn!(?delay, failures = failure_count, "boot back-off sleeping before exit");
                tokio::time::sleep(delay).await;
            }
            tracing::error!(kind = %e.kind(), "runtime exiting non-zero: {e}");
            1
        }
    }
}

async fn run_inner(config: RuntimeConfig, handlers: Arc<dyn AgentHandlers>) -> Result<()> {
    let mut boot = boot::BootTimer::start(config.boot_budget_ms, config.hard_boot_budget_ms());

    let mut downloaded_package = None;
    let package_path = if let Some(url) = &config.package_url {
        let object_store = Arc::new(agentrt_fetcher::object_store::LocalDiskObjectStore::new("/"));
        let fetcher = agentrt_fetcher::Fetcher::new(object_store);
        let dest = config.package_path.clone();
        fetcher
            .fetch(
                url,
                &dest,
                agentrt_fetcher::DEFAULT_MAX_BYTES,
                agentrt_fetcher::DEFAULT_TIMEOUT,
                config.package_fingerprint.as_deref(),
            )
            .await?;
        downloaded_package = Some(dest.clone());
        dest
    } else {
        config.package_path.clone()
    };
    boot.mark("acquire_package");
    boot.check_hard_budget()?;

    let manifest = manifest_reader::read_manifest(&package_path).await?;
    boot.mark("load_manifest");
    boot.check_hard_budget()?;

    let declared = manifest.declared_surfaces();
    let gate = ReadinessGate::new(declared);

    let mut rpc_surface = None;
    let mut rest_surface = None;
    let mut ui_surface = None;

    if declared.rpc {
        let port = config
            .rpc_port
            .ok_or_else(|| Error::ConfigInvalid("manifest declares an rpc surface but RPC_PORT is unset".into()))?;
        let service = handlers
            .rpc_service()
            .ok_or_else(|| Error::SurfaceInitFailed("rpc", "manifest declares rpc but no handler was linked".into()))?;
        let token = CancellationToken::new();
        let handle = rpc::serve(rpc::AgentRpcServer::new(service), port, token.clone())
            .await
            .map_err(|e| Error::SurfaceInitFailed("rpc", e.to_string()))?;
        gate.mark_rpc_ready().await;
        rpc_surface = Some((token, handle));
    }
    boot.mark("start_rpc");
    boot.check_hard_budget()?;

    if declared.rest && config.rest_port.is_none() {
        return Err(Error::ConfigInvalid("manifest declares a rest surface but REST_PORT is unset".into()));
    }

    let ui_path = if declared.ui {
        Some(
            manifest
                .ui
                .path
                .as_ref()
                .map(|p| package_path.join(p))
                .ok_or_else(|| Error::SurfaceInitFailed("ui", "manifest declares ui but no path is set".into()))?,
        )
    } else {
        None
    };

    // Multiplexed mode: a declared UI rides along on the REST listener
    // under `base_path` instead of getting its own port.
    let multiplex_ui = declared.ui && config.multiplexed;
    if multiplex_ui && config.rest_port.is_none() {
        return Err(Error::ConfigInvalid(
            "manifest declares a ui surface with MULTIPLEXED=true but REST_PORT is unset".into(),
        ));
    }

    // `/health` always lives on the REST surface, so it is served whenever
    // REST_PORT is set, even for packages that declare no REST handlers.
    if let Some(port) = config.rest_port {
        let package_router = if declared.rest { handlers.rest_router() } else { None };
        let router = rest::build_router(
            gate.clone(),
            &config.base_path,
            package_router,
            if multiplex_ui { ui_path.as_deref() } else { None },
        );
        let token = CancellationToken::new();
        let handle = rest::serve(router, port, token.clone())
            .await
            .map_err(|e| Error::SurfaceInitFailed("rest", e.to_string()))?;
        gate.mark_rest_ready().await;
        if multiplex_ui {
            gate.mark_ui_ready().await;
        }
        rest_surface = Some((token, handle));
    }
    boot.mark("start_rest");
    boot.check_hard_budget()?;

    if declared.ui && !config.multiplexed {
        let port = config
            .ui_port
            .ok_or_else(|| Error::ConfigInvalid("manifest declares a ui surface but UI_PORT is unset".into()))?;
        let ui_path = ui_path.expect("ui_path is Some whenever declared.ui is true");
        let token = CancellationToken::new();
        let handle = ui::serve(&ui_path, port, token.clone())
            .await
            .map_err(|e| Error::SurfaceInitFailed("ui", e.to_string()))?;
        gate.mark_ui_ready().await;
        ui_surface = Some((token, handle));
    }
    boot.mark("start_ui");
    boot.check_hard_budget()?;

    info!(
        agent_app_id = %config.agent_app_id,
        elapsed_ms = boot.elapsed_ms(),
        "all declared surfaces ready"
    );

    wait_for_termination().await;

    shutdown::graceful_shutdown(
        &gate,
        shutdown::Surfaces {
            rpc: rpc_surface,
            rest: rest_surface,
            ui: ui_surface,
        },
        config.graceful_shutdown_timeout,
        downloaded_package,
    )
    .await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
