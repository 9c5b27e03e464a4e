//! Three disjoint port ranges (REST, RPC, UI), one lowest-free-port
//! allocation per range per deployment.

pub mod error;
mod lock;

pub use error::{Error, Result};
use lock::PortLock;

use agentrt_core::model::PortAllocation;
use dashmap::DashMap;
use std::ops::RangeInclusive;
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PortRanges {
    pub rest: RangeInclusive<u16>,
    pub rpc: RangeInclusive<u16>,
    pub ui: RangeInclusive<u16>,
}

impl Default for PortRanges {
    fn default() -> Self {
        Self {
            rest: 8080..=8180,
            rpc: 50051..=50151,
            ui: 3000..=3100,
        }
    }
}

/// Tracks which ports in each range are currently reserved, keyed by
/// `deploymentId` so release is idempotent and independent of call order.
///
/// The three `TcpListener`s behind each allocation's `PortLock`s are held
/// in `locks` from the moment `allocate` returns until the caller explicitly
/// hands the ports off via `release_for_spawn` (or tears the deployment
/// down via `release`). This keeps the OS-level bind alive across the gap
/// between allocation and the child process's own bind, so a second,
/// concurrent `allocate` can never be handed the same port: `scan_mutex`
/// additionally serialises the whole three-range scan so two allocations
/// racing for the same lowest-free port never interleave their probes.
pub struct PortAllocator {
    ranges: PortRanges,
    allocations: DashMap<String, PortAllocation>,
    locks: DashMap<String, Vec<PortLock>>,
    scan_mutex: Mutex<()>,
}

impl PortAllocator {
    #[must_use]
    pub fn new(ranges: PortRanges) -> Self {
        Self {
            ranges,
            allocations: DashMap::new(),
            locks: DashMap::new(),
            scan_mutex: Mutex::new(()),
        }
    }

    /// Allocates the lowest free port in each of the three ranges and
    /// records the triple under `deployment_id`. Returns the same
    /// allocation on a repeat call for a `deployment_id` already held.
    ///
    /// The whole scan-and-record runs under `scan_mutex`, and each chosen
    /// port's `TcpListener` stays bound (held in `locks`) when the guard is
    /// released, so no port this call picks can be handed to another
    /// `deployment_id` until `release_for_spawn` or `release` drops it.
    pub fn allocate(&self, deployment_id: &str) -> Result<PortAllocation> {
        if let Some(existing) = self.allocations.get(deployment_id) {
            return Ok(*existing);
        }

        let _guard = self.scan_mutex.lock().expect("port allocator mutex poisoned");

        // Re-check under the lock: another thread may have allocated for
        // this same `deployment_id` while we waited for the guard.
        if let Some(existing) = self.allocations.get(deployment_id) {
            return Ok(*existing);
        }

        let rest = Self::lowest_free(self.ranges.rest.clone(), "rest", &self.allocations, |a| a.rest_port)?;
        let rpc = Self::lowest_free(self.ranges.rpc.clone(), "rpc", &self.allocations, |a| a.rpc_port)?;
        let ui = Self::lowest_free(self.ranges.ui.clone(), "ui", &self.allocations, |a| a.ui_port)?;

        let allocation = PortAllocation {
            rest_port: rest.port(),
            rpc_port: rpc.port(),
            ui_port: ui.port(),
        };
        self.allocations.insert(deployment_id.to_string(), allocation);
        self.locks.insert(deployment_id.to_string(), vec![rest, rpc, ui]);
        debug!(
            deployment_id,
            rest_port = allocation.rest_port,
            rpc_port = allocation.rpc_port,
            ui_port = allocation.ui_port,
            "allocated ports"
        );
        Ok(allocation)
    }

    /// Drops the held `TcpListener`s for `deployment_id` so its ports can
    /// be bound by the spawned child, while leaving the numeric allocation
    /// (and its exclusivity bookkeeping) in place until `release`. Call
    /// this immediately before spawning the child, not earlier: dropping
    /// sooner re-opens the race this type exists to close.
    pub fn release_for_spawn(&self, deployment_id: &str) {
        self.locks.remove(deployment_id);
    }

    /// Idempotent: releasing a `deployment_id` with no current allocation
    /// is a no-op.
    pub fn release(&self, deployment_id: &str) {
        self.locks.remove(deployment_id);
        if self.allocations.remove(deployment_id).is_some() {
            debug!(deployment_id, "released ports");
        }
    }

    #[must_use]
    pub fn current(&self, deployment_id: &str) -> Option<PortAllocation> {
        self.allocations.get(deployment_id).map(|e| *e)
    }

    /// Scans `range` for the lowest port that both binds successfully and
    /// is not already recorded in `allocations` under `field` (belt-and-
    /// suspenders: a bound listener already makes a live port's bind fail,
    /// but an explicit check keeps the invariant independent of platform
    /// `SO_REUSEADDR`/`SO_REUSEPORT` quirks).
    fn lowest_free(
        range: RangeInclusive<u16>,
        label: &'static str,
        allocations: &DashMap<String, PortAllocation>,
        field: impl Fn(&PortAllocation) -> u16,
    ) -> Result<PortLock> {
        'ports: for port in range {
            for entry in allocations.iter() {
                if field(entry.value()) == port {
                    continue 'ports;
                }
            }
            match PortLock::lock(port) {
                Ok(lock) => return Ok(lock),
                Err(_) => continue,
            }
        }
        warn!(range = label, "port range exhausted");
        Err(Error::NoPortsAvailable(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_port_in_each_range() {
        let allocator = PortAllocator::new(PortRanges::default());
        let alloc = allocator.allocate("dep-1").unwrap();
        assert!(allocator.ranges.rest.contains(&alloc.rest_port));
        assert!(allocator.ranges.rpc.contains(&alloc.rpc_port));
        assert!(allocator.ranges.ui.contains(&alloc.ui_port));
    }

    #[test]
    fn repeat_allocation_is_idempotent() {
        let allocator = PortAllocator::new(PortRanges::default());
        let first = allocator.allocate("dep-1").unwrap();
        let second = allocator.allocate("dep-1").unwrap();
        assert_eq!(first.rest_port, second.rest_port);
        assert_eq!(first.rpc_port, second.rpc_port);
        assert_eq!(first.ui_port, second.ui_port);
    }

    #[test]
    fn release_then_current_returns_none() {
        let allocator = PortAllocator::new(PortRanges::default());
        allocator.allocate("dep-1").unwrap();
        allocator.release("dep-1");
        assert!(allocator.current("dep-1").is_none());
    }

    #[test]
    fn release_of_unknown_deployment_is_a_no_op() {
        let allocator = PortAllocator::new(PortRanges::default());
        allocator.release("never-allocated");
    }

    #[test]
    fn exhausted_range_yields_no_ports_available() {
        // A range pinned to an already-bound port can never succeed.
        let _holder = std::net::TcpListener::bind("127.0.0.1:18080").unwrap();
        let allocator = PortAllocator::new(PortRanges {
            rest: 18080..=18080,
            rpc: 50051..=50151,
            ui: 3000..=3100,
        });
        let err = allocator.allocate("dep-1").unwrap_err();
        assert_eq!(err.kind(), agentrt_core::ErrorKind::NoPortsAvailable);
    }

    #[test]
    fn concurrent_allocations_never_collide_before_spawn_release() {
        // Regression test for the race where two deployments' scans could
        // both land on the same lowest-free port while neither had yet
        // called `release_for_spawn`: the held `TcpListener`s must make
        // the second scan skip past the first's ports entirely.
        let allocator = std::sync::Arc::new(PortAllocator::new(PortRanges::default()));
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let allocator = allocator.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    allocator.allocate(&format!("dep-{i}")).unwrap()
                })
            })
            .collect();

        let allocations: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_ne!(allocations[0].rest_port, allocations[1].rest_port);
        assert_ne!(allocations[0].rpc_port, allocations[1].rpc_port);
        assert_ne!(allocations[0].ui_port, allocations[1].ui_port);
    }

    #[test]
    fn release_for_spawn_frees_os_bind_but_keeps_allocation() {
        let allocator = PortAllocator::new(PortRanges::default());
        let allocation = allocator.allocate("dep-1").unwrap();
        allocator.release_for_spawn("dep-1");

        // The numeric allocation is still held (exclusivity bookkeeping
        // survives), but the OS-level bind is gone, so the port can now be
        // bound by a client standing in for the spawned child.
        assert_eq!(allocator.current("dep-1"), Some(allocation));
        let rebound = std::net::TcpListener::bind(("127.0.0.1", allocation.rest_port));
        assert!(rebound.is_ok());
    }

    proptest::proptest! {
        /// Testable property 4: across any interleaving of allocate/release
        /// calls, no two simultaneously-held allocations ever share a port
        /// in any range.
        #[test]
        fn no_two_live_allocations_share_a_port(
            ops in proptest::collection::vec(
                (proptest::bool::ANY, 0_usize..12),
                1..200,
            ),
        ) {
            let allocator = PortAllocator::new(PortRanges::default());
            let mut live: std::collections::HashSet<String> = std::collections::HashSet::new();

            for (allocate, slot) in ops {
                let deployment_id = format!("dep-{slot}");
                if allocate {
                    if allocator.allocate(&deployment_id).is_ok() {
                        live.insert(deployment_id.clone());
                    }
                } else {
                    allocator.release(&deployment_id);
                    live.remove(&deployment_id);
                }

                // Check the invariant after every single operation, not
                // just at the end: flatten every currently-live
                // allocation's ports and confirm none repeats.
                let mut all_ports = Vec::new();
                for id in &live {
                    let alloc = allocator.current(id).unwrap();
                    all_ports.push(alloc.rest_port);
                    all_ports.push(alloc.rpc_port);
                    all_ports.push(alloc.ui_port);
                }
                let unique: std::collections::HashSet<_> = all_ports.iter().copied().collect();
                proptest::prop_assert_eq!(all_ports.len(), unique.len());
            }
        }
    }
}
