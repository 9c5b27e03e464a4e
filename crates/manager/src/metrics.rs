//! Prometheus metrics for the host daemon: a registry of gauges/counters,
//! text-exposed at `/metrics`. This is ambient observability, not a
//! tenant-facing feature: it exists regardless of what the deployment
//! workload does.

use crate::records::RecordStore;
use agentrt_core::model::DeploymentStatus;
use prometheus::{Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    deployments_pending: Gauge,
    deployments_downloading: Gauge,
    deployments_building_env: Gauge,
    deployments_waiting_ready: Gauge,
    deployments_healthy: Gauge,
    deployments_draining: Gauge,
    deployments_failed: Gauge,
    deploy_requests_total: IntCounter,
    deploy_failures_total: IntCounter,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        let registry = Registry::new();

        let deployments_pending = gauge(&registry, "agentrt_deployments_pending", "Deployments in the pending phase");
        let deployments_downloading = gauge(
            &registry,
            "agentrt_deployments_downloading",
            "Deployments currently fetching their package",
        );
        let deployments_building_env = gauge(
            &registry,
            "agentrt_deployments_building_env",
            "Deployments currently building a dependency environment",
        );
        let deployments_waiting_ready = gauge(
            &registry,
            "agentrt_deployments_waiting_ready",
            "Deployments whose child has spawned but not yet reported healthy",
        );
        let deployments_healthy = gauge(&registry, "agentrt_deployments_healthy", "Deployments currently healthy");
        let deployments_draining = gauge(&registry, "agentrt_deployments_draining", "Deployments currently draining");
        let deployments_failed = gauge(&registry, "agentrt_deployments_failed", "Deployments in a failed state");

        let deploy_requests_total = int_counter(
            &registry,
            "agentrt_deploy_requests_total",
            "Total deployment requests accepted",
        );
        let deploy_failures_total = int_counter(
            &registry,
            "agentrt_deploy_failures_total",
            "Total deployments that ended in the failed state",
        );

        Self {
            registry,
            deployments_pending,
            deployments_downloading,
            deployments_building_env,
            deployments_waiting_ready,
            deployments_healthy,
            deployments_draining,
            deployments_failed,
            deploy_requests_total,
            deploy_failures_total,
        }
    }

    pub fn record_request_accepted(&self) {
        self.deploy_requests_total.inc();
    }

    pub fn record_deployment_failed(&self) {
        self.deploy_failures_total.inc();
    }

    /// Recomputes the per-status gauges from the live record store. Called
    /// lazily on every `/metrics` scrape rather than on every transition,
    /// since a scrape interval of seconds dwarfs the cost of one pass over
    /// the deployment table.
    pub fn refresh(&self, records: &RecordStore) {
        self.deployments_pending.set(records.count_by_status(DeploymentStatus::Pending) as f64);
        self.deployments_downloading
            .set(records.count_by_status(DeploymentStatus::Downloading) as f64);
        self.deployments_building_env
            .set(records.count_by_status(DeploymentStatus::BuildingEnv) as f64);
        self.deployments_waiting_ready
            .set(records.count_by_status(DeploymentStatus::WaitingReady) as f64);
        self.deployments_healthy.set(records.count_by_status(DeploymentStatus::Healthy) as f64);
        self.deployments_draining.set(records.count_by_status(DeploymentStatus::Draining) as f64);
        self.deployments_failed.set(records.count_by_status(DeploymentStatus::Failed) as f64);
    }

    /// Renders the registry in Prometheus text exposition format.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer).expect("prometheus text encoding is infallible for well-formed metrics");
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn gauge(registry: &Registry, name: &'static str, help: &'static str) -> Gauge {
    let g = Gauge::with_opts(Opts::new(name, help)).expect("static metric options are always valid");
    registry.register(Box::new(g.clone())).expect("metric name is unique within this registry");
    g
}

fn int_counter(registry: &Registry, name: &'static str, help: &'static str) -> IntCounter {
    let c = IntCounter::with_opts(Opts::new(name, help)).expect("static metric options are always valid");
    registry.register(Box::new(c.clone())).expect("metric name is unique within this registry");
    c
}
