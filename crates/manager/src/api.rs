//! Control API: the host-facing HTTP surface for submitting, querying, and
//! tearing down deployments, plus the supplemented introspection and
//! metrics endpoints.

use crate::deployment::DeploymentManager;
use crate::metrics::Metrics;
use agentrt_core::model::{DeploymentRecord, DeploymentRequest, DeploymentStatus};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<DeploymentManager>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/deploy", post(deploy))
        .route("/deployments", get(list_deployments))
        .route("/deployments/{id}/health", get(deployment_health))
        .route("/deployments/{id}", delete(teardown_deployment))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (status, Json(ErrorBody { error: message.into() }))
}

impl IntoResponse for crate::error::Error {
    fn into_response(self) -> axum::response::Response {
        use crate::error::Error;
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyInFlight(_) => StatusCode::CONFLICT,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string()).into_response()
    }
}

/// `POST /deploy`: accepts a [`DeploymentRequest`] and starts (or, if the
/// `requestId` is a repeat, returns) the corresponding pipeline. The
/// `Idempotency-Key` header carries `requestId` and is required; it is
/// authoritative over any `requestId` present in the body.
async fn deploy(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(mut request): Json<DeploymentRequest>,
) -> impl IntoResponse {
    let request_id = match headers.get(IDEMPOTENCY_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(key) if !key.trim().is_empty() => key.to_string(),
        _ => {
            return crate::error::Error::InvalidRequest("missing or empty Idempotency-Key header".to_string())
                .into_response()
        }
    };
    request.request_id = request_id;

    match state.manager.submit(request).await {
        Ok(record) => {
            state.metrics.record_request_accepted();
            (StatusCode::ACCEPTED, Json(record)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// `GET /deployments`: lists every known deployment record (supplemented
/// introspection endpoint, not in the distilled spec).
async fn list_deployments(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.manager.list().await)
}

#[derive(Debug, Serialize)]
struct SurfacesBody {
    rest: bool,
    rpc: bool,
    ui: bool,
}

#[derive(Debug, Serialize)]
struct PortsBody {
    rest: Option<u16>,
    rpc: Option<u16>,
    ui: Option<u16>,
}

/// The `GET /deployments/{id}/health` body shape from §6: `{status,
/// healthy, message?, surfaces:{rest,rpc,ui}, ports:{rest,rpc,ui}}`, with
/// unallocated ports serialised as `null` rather than omitted (see S1).
#[derive(Debug, Serialize)]
struct HealthBody {
    status: DeploymentStatus,
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    surfaces: SurfacesBody,
    ports: PortsBody,
}

impl From<DeploymentRecord> for HealthBody {
    fn from(record: DeploymentRecord) -> Self {
        Self {
            healthy: record.status == DeploymentStatus::Healthy,
            status: record.status,
            message: record.last_error.map(|e| e.message),
            surfaces: SurfacesBody {
                rest: record.declared_surfaces.rest,
                rpc: record.declared_surfaces.rpc,
                ui: record.declared_surfaces.ui,
            },
            ports: PortsBody {
                rest: record.rest_port,
                rpc: record.rpc_port,
                ui: record.ui_port,
            },
        }
    }
}

/// `GET /deployments/{id}/health`: the caller-facing readiness summary for
/// one deployment.
async fn deployment_health(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.manager.status(&id).await {
        Some(record) => (StatusCode::OK, Json(HealthBody::from(record))).into_response(),
        None => crate::error::Error::NotFound(id).into_response(),
    }
}

/// `DELETE /deployments/{id}`: initiates draining; returns 202 once the
/// drain has been requested, not once it has completed.
async fn teardown_deployment(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.manager.teardown(&id).await {
        Ok(record) => (StatusCode::ACCEPTED, Json(record)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `GET /metrics`: Prometheus text exposition, a supplemented ambient
/// observability endpoint.
async fn metrics(State(state): State<ApiState>) -> impl IntoResponse {
    state.metrics.refresh(state.manager.records());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;

    fn test_state() -> ApiState {
        let config = Arc::new(ManagerConfig::default());
        ApiState {
            manager: Arc::new(DeploymentManager::new(config)),
            metrics: Arc::new(Metrics::new()),
        }
    }

    #[tokio::test]
    async fn unknown_deployment_health_is_not_found() {
        let state = test_state();
        let response = deployment_health(State(state), Path("nope".to_string())).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_deployment_teardown_is_not_found() {
        let state = test_state();
        let response = teardown_deployment(State(state), Path("nope".to_string())).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deploy_without_idempotency_key_is_rejected() {
        let state = test_state();
        let body = DeploymentRequest {
            request_id: String::new(),
            deployment_id: "d1".to_string(),
            agent_app_id: "a1".to_string(),
            org_id: None,
            version: "1.0.0".to_string(),
            package_source: "https://example.com/a1-1.0.0.pkg".parse().unwrap(),
            package_fingerprint: None,
            force_refresh: false,
            environment: Default::default(),
            base_path: None,
        };
        let response = deploy(State(state), HeaderMap::new(), Json(body)).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text_exposition() {
        let state = test_state();
        let response = metrics(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Matches S1's documented shape: a REST-only deployment reports
    /// `surfaces:{rest:true,rpc:false,ui:false}` and `ports:{rest:8080,
    /// rpc:null,ui:null}`, not a flattened `DeploymentRecord`.
    #[test]
    fn health_body_reports_surfaces_and_nullable_ports() {
        let request = DeploymentRequest {
            request_id: "r1".to_string(),
            deployment_id: "d1".to_string(),
            agent_app_id: "a1".to_string(),
            org_id: None,
            version: "1.0.0".to_string(),
            package_source: "https://example.com/a1-1.0.0.pkg".parse().unwrap(),
            package_fingerprint: None,
            force_refresh: false,
            environment: Default::default(),
            base_path: None,
        };
        let mut record = DeploymentRecord::new(&request);
        record.status = DeploymentStatus::Healthy;
        record.declared_surfaces = agentrt_core::model::DeclaredSurfaces {
            rest: true,
            rpc: false,
            ui: false,
        };
        record.rest_port = Some(8080);

        let body = HealthBody::from(record);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["healthy"], true);
        assert_eq!(json["surfaces"], serde_json::json!({"rest": true, "rpc": false, "ui": false}));
        assert_eq!(json["ports"], serde_json::json!({"rest": 8080, "rpc": null, "ui": null}));
    }
}
