//! The records map: a `dashmap`-backed table of
//! `deploymentId -> Arc<Mutex<DeploymentRecord>>`, plus a second index
//! keyed by `requestId` for idempotent intake. Only primitive reads/writes
//! happen under the per-record lock; all I/O runs outside it.

use agentrt_core::model::{DeploymentRecord, DeploymentStatus};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct RecordStore {
    by_deployment_id: DashMap<String, Arc<Mutex<DeploymentRecord>>>,
    by_request_id: DashMap<String, String>,
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the deployment already associated with `request_id`: a
    /// repeat `requestId` must never create a second record.
    #[must_use]
    pub fn existing_for_request(&self, request_id: &str) -> Option<Arc<Mutex<DeploymentRecord>>> {
        let deployment_id = self.by_request_id.get(request_id)?.clone();
        self.by_deployment_id.get(&deployment_id).map(|e| e.clone())
    }

    /// Registers a freshly created record under both indices. Returns the
    /// shared handle the caller's deployment task will mutate.
    pub fn insert(&self, record: DeploymentRecord) -> Arc<Mutex<DeploymentRecord>> {
        let deployment_id = record.deployment_id.clone();
        let request_id = record.request_id.clone();
        let handle = Arc::new(Mutex::new(record));
        self.by_deployment_id.insert(deployment_id.clone(), handle.clone());
        self.by_request_id.insert(request_id, deployment_id);
        handle
    }

    #[must_use]
    pub fn get(&self, deployment_id: &str) -> Option<Arc<Mutex<DeploymentRecord>>> {
        self.by_deployment_id.get(deployment_id).map(|e| e.clone())
    }

    #[must_use]
    pub fn all(&self) -> Vec<Arc<Mutex<DeploymentRecord>>> {
        self.by_deployment_id.iter().map(|e| e.value().clone()).collect()
    }

    #[must_use]
    pub fn count_by_status(&self, status: DeploymentStatus) -> usize {
        self.by_deployment_id
            .iter()
            .filter(|e| e.try_lock().map(|r| r.status == status).unwrap_or(false))
            .count()
    }

    pub fn remove(&self, deployment_id: &str) {
        self.by_deployment_id.remove(deployment_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_core::model::DeploymentRequest;
    use std::collections::HashMap;

    fn sample_request(request_id: &str, deployment_id: &str) -> DeploymentRequest {
        DeploymentRequest {
            request_id: request_id.to_string(),
            deployment_id: deployment_id.to_string(),
            agent_app_id: "a1".to_string(),
            org_id: None,
            version: "1.0.0".to_string(),
            package_source: "https://example.com/pkg.apkg".parse().unwrap(),
            package_fingerprint: None,
            force_refresh: false,
            environment: HashMap::new(),
            base_path: None,
        }
    }

    #[tokio::test]
    async fn repeat_request_id_resolves_to_the_same_record() {
        let store = RecordStore::new();
        let request = sample_request("req-1", "dep-1");
        let record = DeploymentRecord::new(&request);
        store.insert(record);

        let found = store.existing_for_request("req-1").unwrap();
        assert_eq!(found.lock().await.deployment_id, "dep-1");
        assert!(store.existing_for_request("req-unknown").is_none());
    }

    #[tokio::test]
    async fn all_lists_every_inserted_record() {
        let store = RecordStore::new();
        store.insert(DeploymentRecord::new(&sample_request("r1", "d1")));
        store.insert(DeploymentRecord::new(&sample_request("r2", "d2")));
        assert_eq!(store.all().len(), 2);
    }
}
