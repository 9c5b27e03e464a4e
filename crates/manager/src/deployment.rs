//! The Deployment Manager: the state machine that sequences fetch → load →
//! env build → port allocate → spawn → readiness → healthy, idempotent by
//! `requestId`, and exposes query/teardown. One `tokio::spawn`ed task per
//! `deploymentId` progresses the whole pipeline; cross-deployment there is
//! no ordering.

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::records::RecordStore;
use agentrt_core::events::{self, Phase};
use agentrt_core::model::{DeploymentRecord, DeploymentRequest, DeploymentStatus};
use agentrt_core::ErrorKind;
use agentrt_environment::EnvironmentBuilder;
use agentrt_fetcher::object_store::LocalDiskObjectStore;
use agentrt_fetcher::Fetcher;
use agentrt_package::PackageCache;
use agentrt_ports::PortAllocator;
use agentrt_supervisor::env::{build_child_env, ContractVars};
use agentrt_supervisor::process::SupervisedChild;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct DeploymentManager {
    config: Arc<ManagerConfig>,
    records: Arc<RecordStore>,
    fetcher: Arc<Fetcher>,
    package_cache: Arc<PackageCache>,
    env_builder: Arc<EnvironmentBuilder>,
    ports: Arc<PortAllocator>,
    installer: Arc<dyn agentrt_environment::DependencyInstaller>,
    http: reqwest::Client,
    /// One cancellation token per in-flight deployment, used to propagate a
    /// teardown request into whichever phase is currently suspended (spec
    /// §5 "Cancellation & timeouts").
    cancel_tokens: DashMap<String, CancellationToken>,
}

impl DeploymentManager {
    #[must_use]
    pub fn new(config: Arc<ManagerConfig>) -> Self {
        let object_store = Arc::new(LocalDiskObjectStore::new(config.data_dir.join("object-store")));
        let fetcher = Arc::new(Fetcher::new(object_store));
        let package_cache = Arc::new(
            PackageCache::new(config.packages_dir(), fetcher.clone())
                .with_limits(config.max_package_bytes(), config.fetch_timeout()),
        );
        let installer: Arc<dyn agentrt_environment::DependencyInstaller> =
            Arc::new(agentrt_environment::PythonVenvInstaller::default());
        let env_builder = Arc::new(
            EnvironmentBuilder::new(config.envs_dir(), installer.clone())
                .with_install_timeout(config.env_build_timeout())
                .with_eviction_policy(config.eviction_policy()),
        );
        let ports = Arc::new(PortAllocator::new(config.port_ranges()));

        Self {
            config,
            records: Arc::new(RecordStore::new()),
            fetcher,
            package_cache,
            env_builder,
            ports,
            installer,
            http: reqwest::Client::new(),
            cancel_tokens: DashMap::new(),
        }
    }

    #[must_use]
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Accepts a deployment request, idempotent by `requestId`: a repeat
    /// call for a `requestId` already known returns its current record
    /// rather than starting a second pipeline.
    pub async fn submit(self: &Arc<Self>, request: DeploymentRequest) -> Result<DeploymentRecord> {
        request
            .validate()
            .map_err(Error::InvalidRequest)?;

        if let Some(existing) = self.records.existing_for_request(&request.request_id) {
            return Ok(existing.lock().await.clone());
        }

        if let Some(clashing) = self.records.get(&request.deployment_id) {
            let clashing = clashing.lock().await;
            if clashing.request_id != request.request_id {
                return Err(Error::AlreadyInFlight(request.deployment_id.clone()));
            }
            return Ok(clashing.clone());
        }

        let record = DeploymentRecord::new(&request);
        let snapshot = record.clone();
        let handle = self.records.insert(record);
        let token = CancellationToken::new();
        self.cancel_tokens.insert(request.deployment_id.clone(), token.clone());

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_pipeline(request, handle, token).await;
        });

        Ok(snapshot)
    }

    #[must_use]
    pub async fn status(&self, deployment_id: &str) -> Option<DeploymentRecord> {
        let handle = self.records.get(deployment_id)?;
        Some(handle.lock().await.clone())
    }

    #[must_use]
    pub async fn list(&self) -> Vec<DeploymentRecord> {
        let mut out = Vec::new();
        for handle in self.records.all() {
            out.push(handle.lock().await.clone());
        }
        out
    }

    /// Initiates draining. Returns immediately (the actual drain happens in
    /// the deployment's own task); idempotent for a deployment already
    /// draining or stopped.
    pub async fn teardown(&self, deployment_id: &str) -> Result<DeploymentRecord> {
        let handle = self
            .records
            .get(deployment_id)
            .ok_or_else(|| Error::NotFound(deployment_id.to_string()))?;

        {
            let mut record = handle.lock().await;
            if !matches!(record.status, DeploymentStatus::Draining | DeploymentStatus::Stopped) {
                record.transition(DeploymentStatus::Draining);
            }
        }

        if let Some(token) = self.cancel_tokens.get(deployment_id) {
            token.cancel();
        }

        Ok(handle.lock().await.clone())
    }

    async fn run_pipeline(
        self: Arc<Self>,
        request: DeploymentRequest,
        handle: Arc<Mutex<DeploymentRecord>>,
        token: CancellationToken,
    ) {
        let deployment_id = request.deployment_id.clone();
        let result = self.run_pipeline_inner(&request, &handle, &token).await;

        if let Err((kind, message)) = result {
            warn!(deployment_id = %deployment_id, %kind, %message, "deployment failed");
            events::emit_error(&deployment_id, Phase::Failed, kind, message.clone());
            let mut record = handle.lock().await;
            record.fail(kind, message);
            self.release_resources(&deployment_id).await;
        }

        self.cancel_tokens.remove(&deployment_id);
    }

    /// Runs fetch → load → env build → port allocate → spawn → readiness →
    /// healthy → (serve until crash or teardown) → drain. Returns the
    /// `(ErrorKind, message)` of whichever phase failed, if any.
    async fn run_pipeline_inner(
        &self,
        request: &DeploymentRequest,
        handle: &Arc<Mutex<DeploymentRecord>>,
        token: &CancellationToken,
    ) -> std::result::Result<(), (ErrorKind, String)> {
        let deployment_id = request.deployment_id.clone();

        transition(handle, DeploymentStatus::Downloading, &deployment_id, Phase::Downloading).await;
        if token.is_cancelled() {
            return self.stop_before_spawn(handle, &deployment_id).await;
        }

        let cached = self
            .package_cache
            .get_or_fetch(
                &request.agent_app_id,
                &request.version,
                &request.package_source,
                request.package_fingerprint.as_deref(),
                request.force_refresh,
            )
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;

        transition(handle, DeploymentStatus::Loading, &deployment_id, Phase::Loading).await;
        if token.is_cancelled() {
            return self.stop_before_spawn(handle, &deployment_id).await;
        }

        let extracted_root = self.config.extracted_dir().join(&deployment_id);
        tokio::fs::create_dir_all(&self.config.extracted_dir())
            .await
            .map_err(|e| (ErrorKind::Other, format!("could not create extraction root: {e}")))?;
        agentrt_package::extract_apkg(&cached.path, &extracted_root)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;

        let manifest = agentrt_package::read_manifest(&extracted_root)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;

        {
            let mut record = handle.lock().await;
            record.package_path = Some(cached.path.clone());
            record.declared_surfaces = manifest.declared_surfaces();
        }

        transition(handle, DeploymentStatus::BuildingEnv, &deployment_id, Phase::BuildingEnv).await;
        if token.is_cancelled() {
            return self.stop_before_spawn(handle, &deployment_id).await;
        }

        let dependency_manifest = extracted_root.join(&manifest.dependency_manifest);
        let dependency_manifest = if tokio::fs::try_exists(&dependency_manifest).await.unwrap_or(false) {
            Some(dependency_manifest)
        } else {
            None
        };

        let env = self
            .env_builder
            .ensure_environment(&request.agent_app_id, &extracted_root, dependency_manifest.as_deref())
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;

        {
            let mut record = handle.lock().await;
            record.env_path = Some(env.path.clone());
        }

        transition(handle, DeploymentStatus::Starting, &deployment_id, Phase::Starting).await;
        if token.is_cancelled() {
            return self.stop_before_spawn(handle, &deployment_id).await;
        }

        let allocation = self
            .ports
            .allocate(&deployment_id)
            .map_err(|e| (e.kind(), e.to_string()))?;

        {
            let mut record = handle.lock().await;
            record.rest_port = Some(allocation.rest_port);
            record.rpc_port = Some(allocation.rpc_port);
            record.ui_port = Some(allocation.ui_port);
        }

        let entrypoint = manifest.entrypoint.clone().ok_or_else(|| {
            (
                ErrorKind::ManifestInvalid,
                "manifest declares no `entrypoint` to launch the three-surface runtime".to_string(),
            )
        })?;

        let contract = ContractVars {
            agent_package_path: extracted_root.display().to_string(),
            agent_app_id: request.agent_app_id.clone(),
            rest_port: Some(allocation.rest_port),
            rpc_port: Some(allocation.rpc_port),
            ui_port: Some(allocation.ui_port),
            multiplexed: true,
            base_path: request.base_path.clone(),
        };
        let env_vars = build_child_env(&extracted_root, &request.environment, &contract).await;

        let interpreter = self.installer.interpreter_path(&env.path);
        let args = vec![extracted_root.join(&entrypoint).display().to_string()];

        // The allocator has held these ports bound since `allocate` above,
        // closing the race where a second deployment's scan could pick the
        // same lowest-free port while this one was still loading its
        // manifest and building its environment. Drop that hold now, right
        // before the child gets a chance to bind them itself.
        self.ports.release_for_spawn(&deployment_id);

        let child = SupervisedChild::spawn(&interpreter, &args, &extracted_root, env_vars, deployment_id.clone())
            .map_err(|e| (e.kind(), e.to_string()))?;

        {
            let mut record = handle.lock().await;
            record.child_pid = Some(child.pid());
        }

        transition(handle, DeploymentStatus::WaitingReady, &deployment_id, Phase::WaitingReady).await;

        let mut child = child;
        let readiness = self.wait_for_readiness(allocation.rest_port, token, &mut child).await;

        match readiness {
            ReadinessOutcome::Healthy => {}
            ReadinessOutcome::Cancelled => {
                transition(handle, DeploymentStatus::Draining, &deployment_id, Phase::Draining).await;
                self.drain_child(child, &deployment_id).await;
                self.release_resources(&deployment_id).await;
                transition(handle, DeploymentStatus::Stopped, &deployment_id, Phase::Stopped).await;
                return Ok(());
            }
            ReadinessOutcome::Crashed(status) => {
                self.release_resources(&deployment_id).await;
                return Err((
                    ErrorKind::ChildCrashed,
                    format!("child exited before becoming healthy: {status:?}"),
                ));
            }
            ReadinessOutcome::TimedOut => {
                let _ = child.stop(Duration::from_secs(1)).await;
                self.release_resources(&deployment_id).await;
                return Err((
                    ErrorKind::NotReadyInTime,
                    "child did not report healthy within the readiness window".to_string(),
                ));
            }
        }

        transition(handle, DeploymentStatus::Healthy, &deployment_id, Phase::Healthy).await;
        info!(deployment_id = %deployment_id, "deployment healthy");

        // Serve until the child crashes on its own or a teardown request
        // cancels the token.
        tokio::select! {
            _ = token.cancelled() => {
                transition(handle, DeploymentStatus::Draining, &deployment_id, Phase::Draining).await;
                self.drain_child(child, &deployment_id).await;
                self.release_resources(&deployment_id).await;
                transition(handle, DeploymentStatus::Stopped, &deployment_id, Phase::Stopped).await;
                Ok(())
            }
            status = child.wait_for_exit() => {
                self.release_resources(&deployment_id).await;
                Err((ErrorKind::ChildCrashed, format!("child exited unexpectedly: {status:?}")))
            }
        }
    }

    async fn stop_before_spawn(
        &self,
        handle: &Arc<Mutex<DeploymentRecord>>,
        deployment_id: &str,
    ) -> std::result::Result<(), (ErrorKind, String)> {
        let mut record = handle.lock().await;
        record.transition(DeploymentStatus::Stopped);
        events::emit(deployment_id, Phase::Stopped);
        Ok(())
    }

    async fn drain_child(&self, child: SupervisedChild, deployment_id: &str) {
        if let Err(e) = child.stop(self.config.graceful_shutdown_timeout()).await {
            warn!(deployment_id, "graceful drain exceeded budget: {e}");
        }
    }

    async fn release_resources(&self, deployment_id: &str) {
        self.ports.release(deployment_id);
    }

    /// Polls `http://127.0.0.1:{rest_port}/health` at a 1s interval until it
    /// returns 200, the readiness timeout elapses, the child exits, or a
    /// teardown cancels the token (the `waiting_ready → healthy` edge).
    async fn wait_for_readiness(
        &self,
        rest_port: u16,
        token: &CancellationToken,
        child: &mut SupervisedChild,
    ) -> ReadinessOutcome {
        let url = format!("http://127.0.0.1:{rest_port}/health");
        let deadline = tokio::time::Instant::now() + self.config.readiness_timeout();

        loop {
            if !child.status().is_running() {
                return ReadinessOutcome::Crashed(child.status());
            }
            if token.is_cancelled() {
                return ReadinessOutcome::Cancelled;
            }
            if tokio::time::Instant::now() >= deadline {
                return ReadinessOutcome::TimedOut;
            }

            if let Ok(resp) = self.http.get(url.as_str()).timeout(Duration::from_secs(2)).send().await {
                if resp.status().is_success() {
                    return ReadinessOutcome::Healthy;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = token.cancelled() => return ReadinessOutcome::Cancelled,
            }
        }
    }
}

enum ReadinessOutcome {
    Healthy,
    Cancelled,
    Crashed(agentrt_supervisor::ChildStatus),
    TimedOut,
}

async fn transition(handle: &Arc<Mutex<DeploymentRecord>>, status: DeploymentStatus, deployment_id: &str, phase: Phase) {
    {
        let mut record = handle.lock().await;
        record.transition(status);
    }
    events::emit(deployment_id, phase);
}
