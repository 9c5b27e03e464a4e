//! Structured event emission.
//!
//! Every phase of a deployment emits one [`Event`], carrying the
//! `deploymentId` as correlation id through fetch, load, env-build, spawn,
//! readiness and teardown. Events are logged as JSON through `tracing` (one
//! `tracing::info!` call with a single `event` field holding the serialized
//! payload) so that whatever log shipper the operator attaches only has to
//! collect lines, never parse prose.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Intake,
    Downloading,
    Loading,
    BuildingEnv,
    Starting,
    WaitingReady,
    Healthy,
    Draining,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub deployment_id: String,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Event {
    #[must_use]
    pub fn new(deployment_id: impl Into<String>, phase: Phase) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            phase,
            timestamp: Utc::now(),
            error_kind: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_error(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.error_kind = Some(kind);
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Emit this event as one structured `tracing` log line. Secrets are
    /// never passed through `Event` (only key names ever reach `details`
    /// upstream), so this is safe to log unconditionally.
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => tracing::info!(target: "agentrt::events", event = %json),
            Err(err) => {
                tracing::warn!(deployment_id = %self.deployment_id, "failed to serialize event: {err}");
            }
        }
    }
}

/// Convenience for the common "emit and return" pattern used at every
/// phase transition in the deployment manager.
pub fn emit(deployment_id: &str, phase: Phase) {
    Event::new(deployment_id, phase).emit();
}

pub fn emit_error(deployment_id: &str, phase: Phase, kind: ErrorKind, message: impl Into<String>) {
    Event::new(deployment_id, phase).with_error(kind, message).emit();
}
