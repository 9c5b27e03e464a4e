//! Reference Three-Surface Runtime binary: a minimal agent that mounts a
//! trivial REST router and the echo RPC service, used by integration
//! tests and as a starting point for a native-Rust agent package. A real
//! agent package provides its own [`agentrt_surface::AgentHandlers`] and
//! calls [`agentrt_surface::run`] from its own `main`.

use agentrt_surface::handlers::AgentHandlers;
use agentrt_surface::rpc::{AgentRpc, EchoRpc, FrameStream};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

struct ReferenceHandlers;

impl AgentHandlers for ReferenceHandlers {
    fn rest_router(&self) -> Option<Router> {
        Some(Router::new().route("/", get(|| async { "reference agent online" })))
    }

    fn rpc_service(&self) -> Option<Arc<dyn AgentRpc<InvokeStream = FrameStream>>> {
        Some(Arc::new(EchoRpc))
    }
}

#[tokio::main]
async fn main() {
    color_eyre::install().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match agentrt_surface::RuntimeConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let code = agentrt_surface::run(config, Arc::new(ReferenceHandlers)).await;
    std::process::exit(code);
}
