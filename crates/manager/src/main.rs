use agentrt_manager::api::{self, ApiState};
use agentrt_manager::{DeploymentManager, ManagerConfig, Metrics};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let config = ManagerConfig::parse();
    if let Err(problems) = config.validate() {
        eprintln!("invalid configuration: {problems}");
        std::process::exit(1);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match config.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tokio::fs::create_dir_all(&config.data_dir).await?;

    let bind_addr = config.bind_addr;
    let manager = Arc::new(DeploymentManager::new(Arc::new(config)));
    let metrics = Arc::new(Metrics::new());

    let app = api::router(ApiState {
        manager: manager.clone(),
        metrics,
    });

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("control API stopped accepting new connections");
    Ok(())
}

/// Resolves once either `SIGINT` or (on unix) `SIGTERM` is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
