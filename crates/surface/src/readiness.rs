//! The readiness gate — a critical invariant: `/health` must not return
//! success until every declared surface has begun accepting connections
//! and every manifest-declared handler is mounted.

use agentrt_core::model::DeclaredSurfaces;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone, Copy)]
struct ReadyBits {
    rest: bool,
    rpc: bool,
    ui: bool,
}

impl ReadyBits {
    fn satisfies(&self, declared: DeclaredSurfaces) -> bool {
        (!declared.rest || self.rest) && (!declared.rpc || self.rpc) && (!declared.ui || self.ui)
    }
}

/// Shared across the REST, RPC, and UI server tasks. Each surface flips
/// its own bit once bound; the fast-path `AtomicBool` lets the hot
/// `/health` request avoid the `RwLock` once the gate is fully open and
/// will stay that way (the gate never reverts to not-ready except during
/// an explicit shutdown).
pub struct ReadinessGate {
    declared: DeclaredSurfaces,
    bits: RwLock<ReadyBits>,
    fast_path: AtomicBool,
}

pub type SharedReadinessGate = Arc<ReadinessGate>;

impl ReadinessGate {
    #[must_use]
    pub fn new(declared: DeclaredSurfaces) -> SharedReadinessGate {
        Arc::new(Self {
            declared,
            bits: RwLock::new(ReadyBits::default()),
            fast_path: AtomicBool::new(false),
        })
    }

    pub async fn mark_rest_ready(&self) {
        self.flip(|b| b.rest = true).await;
    }

    pub async fn mark_rpc_ready(&self) {
        self.flip(|b| b.rpc = true).await;
    }

    pub async fn mark_ui_ready(&self) {
        self.flip(|b| b.ui = true).await;
    }

    async fn flip(&self, set: impl FnOnce(&mut ReadyBits)) {
        let mut bits = self.bits.write().await;
        set(&mut bits);
        if bits.satisfies(self.declared) {
            self.fast_path.store(true, Ordering::Release);
        }
    }

    /// Flips the gate back to not-ready, the first step of graceful
    /// shutdown.
    pub fn mark_not_ready(&self) {
        self.fast_path.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.fast_path.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_ready_until_all_declared_surfaces_report() {
        let declared = DeclaredSurfaces { rest: true, rpc: true, ui: false };
        let gate = ReadinessGate::new(declared);
        assert!(!gate.is_ready());
        gate.mark_rest_ready().await;
        assert!(!gate.is_ready());
        gate.mark_rpc_ready().await;
        assert!(gate.is_ready());
    }

    #[tokio::test]
    async fn undeclared_surfaces_do_not_block_readiness() {
        let declared = DeclaredSurfaces { rest: true, rpc: false, ui: false };
        let gate = ReadinessGate::new(declared);
        gate.mark_rest_ready().await;
        assert!(gate.is_ready());
    }

    #[tokio::test]
    async fn mark_not_ready_reverts_the_fast_path() {
        let declared = DeclaredSurfaces { rest: true, rpc: false, ui: false };
        let gate = ReadinessGate::new(declared);
        gate.mark_rest_ready().await;
        assert!(gate.is_ready());
        gate.mark_not_ready();
        assert!(!gate.is_ready());
    }
}
