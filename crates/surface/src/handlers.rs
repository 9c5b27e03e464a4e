//! The application-specific part of a hosted agent: the REST router and
//! the RPC service it wants multiplexed alongside the runtime's own
//! `/health` endpoint and UI static assets.
//!
//! Packages in this ecosystem are themselves Rust crates that depend on
//! `agentrt-surface` and implement this trait; the Supervisor spawns the
//! resulting binary through the environment's interpreter (for non-Rust
//! ecosystems that plug in their own [`agentrt_environment::DependencyInstaller`])
//! or directly (for native Rust agents built by `cargo`).

use crate::rpc::AgentRpc;
use axum::Router;
use std::sync::Arc;

pub trait AgentHandlers: Send + Sync + 'static {
    /// The REST router to mount under the manifest's `rest.entry`. `None`
    /// if the package does not declare a REST surface.
    fn rest_router(&self) -> Option<Router>;

    /// The RPC service implementation to mount, if the package declares
    /// one.
    fn rpc_service(&self) -> Option<Arc<dyn AgentRpc<InvokeStream = crate::rpc::FrameStream>>>;
}

/// Declares no REST or RPC surface; used when a package is UI-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHandlers;

impl AgentHandlers for NoHandlers {
    fn rest_router(&self) -> Option<Router> {
        None
    }

    fn rpc_service(&self) -> Option<Arc<dyn AgentRpc<InvokeStream = crate::rpc::FrameStream>>> {
        None
    }
}
