//! Strict self-configuration: every field the runtime needs is read from
//! its own environment and validated before anything else happens. Any
//! problem here is fatal — the process exits non-zero rather than serve a
//! surface half-configured.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub agent_app_id: String,
    pub package_path: PathBuf,
    pub package_url: Option<url::Url>,
    pub package_fingerprint: Option<String>,
    pub rest_port: Option<u16>,
    pub rpc_port: Option<u16>,
    pub ui_port: Option<u16>,
    pub multiplexed: bool,
    pub base_path: String,
    pub boot_budget_ms: u64,
    pub boot_hard_multiplier: f64,
    pub graceful_shutdown_timeout: Duration,
    pub boot_failure_count: u32,
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::ConfigInvalid(format!("{name} is required")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn optional_port(name: &str) -> Result<Option<u16>> {
    match optional(name) {
        None => Ok(None),
        Some(v) => v
            .parse::<u16>()
            .map(Some)
            .map_err(|_| Error::ConfigInvalid(format!("{name} must be a valid port number, got `{v}`"))),
    }
}

fn optional_u64(name: &str, default: u64) -> Result<u64> {
    match optional(name) {
        None => Ok(default),
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| Error::ConfigInvalid(format!("{name} must be an integer, got `{v}`"))),
    }
}

fn optional_f64(name: &str, default: f64) -> Result<f64> {
    match optional(name) {
        None => Ok(default),
        Some(v) => v
            .parse::<f64>()
            .map_err(|_| Error::ConfigInvalid(format!("{name} must be a number, got `{v}`"))),
    }
}

/// Normalises a base path: root stays `/`; anything else is given a
/// leading slash and stripped of a trailing one, and repeated slashes are
/// collapsed so the prefix can never be "applied twice" by a caller who
/// passes it through once more.
fn normalize_base_path(raw: &str) -> String {
    let collapsed: String = raw.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("/");
    if collapsed.is_empty() {
        "/".to_string()
    } else {
        format!("/{collapsed}")
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        let agent_app_id = require("AGENT_APP_ID")?;
        if agent_app_id.trim().is_empty() {
            return Err(Error::ConfigInvalid("AGENT_APP_ID must be non-empty".into()));
        }

        let package_path = PathBuf::from(require("AGENT_PACKAGE_PATH")?);

        let package_url = match optional("PACKAGE_URL") {
            None => None,
            Some(raw) => Some(
                url::Url::parse(&raw)
                    .map_err(|e| Error::ConfigInvalid(format!("PACKAGE_URL is not a valid URL: {e}")))?,
            ),
        };
        let package_fingerprint = optional("PACKAGE_FINGERPRINT");

        let rest_port = optional_port("REST_PORT")?;
        let rpc_port = optional_port("RPC_PORT")?;
        let ui_port = optional_port("UI_PORT")?;

        if rest_port.is_none() && rpc_port.is_none() && ui_port.is_none() {
            return Err(Error::ConfigInvalid(
                "at least one of REST_PORT, RPC_PORT, UI_PORT must be set".into(),
            ));
        }
        for (name, port) in [("REST_PORT", rest_port), ("RPC_PORT", rpc_port), ("UI_PORT", ui_port)] {
            if port == Some(0) {
                return Err(Error::ConfigInvalid(format!("{name} must not be 0")));
            }
        }
        let set_ports: Vec<(&str, u16)> = [("REST_PORT", rest_port), ("RPC_PORT", rpc_port), ("UI_PORT", ui_port)]
            .into_iter()
            .filter_map(|(name, p)| p.map(|p| (name, p)))
            .collect();
        for i in 0..set_ports.len() {
            for j in (i + 1)..set_ports.len() {
                if set_ports[i].1 == set_ports[j].1 {
                    return Err(Error::ConfigInvalid(format!(
                        "{} and {} must not share the same port ({})",
                        set_ports[i].0, set_ports[j].0, set_ports[i].1
                    )));
                }
            }
        }

        let multiplexed = optional("MULTIPLEXED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        let base_path = normalize_base_path(
            optional("BASE_PATH")
                .unwrap_or_else(|| format!("/agents/{agent_app_id}"))
                .as_str(),
        );

        let boot_budget_ms = optional_u64("BOOT_BUDGET_MS", 5000)?;
        let boot_hard_multiplier = optional_f64("BOOT_HARD_LIMIT_MULTIPLIER", 2.0)?;
        let graceful_shutdown_timeout =
            Duration::from_secs(optional_u64("GRACEFUL_SHUTDOWN_TIMEOUT_SEC", 30)?);
        let boot_failure_count = optional_u64("BOOT_FAILURE_COUNT", 0)? as u32;

        Ok(Self {
            agent_app_id,
            package_path,
            package_url,
            package_fingerprint,
            rest_port,
            rpc_port,
            ui_port,
            multiplexed,
            base_path,
            boot_budget_ms,
            boot_hard_multiplier,
            graceful_shutdown_timeout,
            boot_failure_count,
        })
    }

    #[must_use]
    pub fn hard_boot_budget_ms(&self) -> u64 {
        (self.boot_budget_ms as f64 * self.boot_hard_multiplier) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "AGENT_APP_ID",
            "AGENT_PACKAGE_PATH",
            "PACKAGE_URL",
            "PACKAGE_FINGERPRINT",
            "REST_PORT",
            "RPC_PORT",
            "UI_PORT",
            "MULTIPLEXED",
            "BASE_PATH",
            "BOOT_BUDGET_MS",
            "BOOT_HARD_LIMIT_MULTIPLIER",
            "GRACEFUL_SHUTDOWN_TIMEOUT_SEC",
            "BOOT_FAILURE_COUNT",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn missing_agent_app_id_is_rejected() {
        clear_env();
        std::env::set_var("AGENT_PACKAGE_PATH", "/tmp/pkg");
        std::env::set_var("REST_PORT", "8080");
        let err = RuntimeConfig::from_env().unwrap_err();
        assert_eq!(err.kind(), agentrt_core::ErrorKind::ConfigInvalid);
        clear_env();
    }

    #[test]
    #[serial]
    fn no_surfaces_declared_is_rejected() {
        clear_env();
        std::env::set_var("AGENT_APP_ID", "app-1");
        std::env::set_var("AGENT_PACKAGE_PATH", "/tmp/pkg");
        let err = RuntimeConfig::from_env().unwrap_err();
        assert_eq!(err.kind(), agentrt_core::ErrorKind::ConfigInvalid);
        clear_env();
    }

    #[test]
    #[serial]
    fn valid_minimal_config_parses() {
        clear_env();
        std::env::set_var("AGENT_APP_ID", "app-1");
        std::env::set_var("AGENT_PACKAGE_PATH", "/tmp/pkg");
        std::env::set_var("REST_PORT", "8080");
        let cfg = RuntimeConfig::from_env().unwrap();
        assert_eq!(cfg.agent_app_id, "app-1");
        assert_eq!(cfg.rest_port, Some(8080));
        assert_eq!(cfg.base_path, "/agents/app-1");
        assert_eq!(cfg.hard_boot_budget_ms(), 10_000);
        clear_env();
    }

    #[test]
    #[serial]
    fn multiplexed_defaults_to_true() {
        clear_env();
        std::env::set_var("AGENT_APP_ID", "app-1");
        std::env::set_var("AGENT_PACKAGE_PATH", "/tmp/pkg");
        std::env::set_var("REST_PORT", "8080");
        let cfg = RuntimeConfig::from_env().unwrap();
        assert!(cfg.multiplexed);
        clear_env();
    }

    #[test]
    #[serial]
    fn spec_named_boot_and_shutdown_env_vars_are_honored() {
        clear_env();
        std::env::set_var("AGENT_APP_ID", "app-1");
        std::env::set_var("AGENT_PACKAGE_PATH", "/tmp/pkg");
        std::env::set_var("REST_PORT", "8080");
        std::env::set_var("BOOT_BUDGET_MS", "1000");
        std::env::set_var("BOOT_HARD_LIMIT_MULTIPLIER", "3.0");
        std::env::set_var("GRACEFUL_SHUTDOWN_TIMEOUT_SEC", "45");
        let cfg = RuntimeConfig::from_env().unwrap();
        assert_eq!(cfg.hard_boot_budget_ms(), 3000);
        assert_eq!(cfg.graceful_shutdown_timeout, Duration::from_secs(45));
        clear_env();
    }

    #[test]
    fn normalize_base_path_collapses_and_strips_trailing_slash() {
        assert_eq!(normalize_base_path("/"), "/");
        assert_eq!(normalize_base_path(""), "/");
        assert_eq!(normalize_base_path("/agents/app-1/"), "/agents/app-1");
        assert_eq!(normalize_base_path("agents/app-1"), "/agents/app-1");
        assert_eq!(normalize_base_path("//agents//app-1//"), "/agents/app-1");
    }

    #[test]
    #[serial]
    fn explicit_base_path_is_normalised() {
        clear_env();
        std::env::set_var("AGENT_APP_ID", "app-1");
        std::env::set_var("AGENT_PACKAGE_PATH", "/tmp/pkg");
        std::env::set_var("REST_PORT", "8080");
        std::env::set_var("BASE_PATH", "/custom/");
        let cfg = RuntimeConfig::from_env().unwrap();
        assert_eq!(cfg.base_path, "/custom");
        clear_env();
    }

    #[test]
    #[serial]
    fn clashing_ports_are_rejected() {
        clear_env();
        std::env::set_var("AGENT_APP_ID", "app-1");
        std::env::set_var("AGENT_PACKAGE_PATH", "/tmp/pkg");
        std::env::set_var("REST_PORT", "8080");
        std::env::set_var("RPC_PORT", "8080");
        let err = RuntimeConfig::from_env().unwrap_err();
        assert_eq!(err.kind(), agentrt_core::ErrorKind::ConfigInvalid);
        clear_env();
    }

    #[test]
    #[serial]
    fn zero_port_is_rejected() {
        clear_env();
        std::env::set_var("AGENT_APP_ID", "app-1");
        std::env::set_var("AGENT_PACKAGE_PATH", "/tmp/pkg");
        std::env::set_var("REST_PORT", "0");
        let err = RuntimeConfig::from_env().unwrap_err();
        assert_eq!(err.kind(), agentrt_core::ErrorKind::ConfigInvalid);
        clear_env();
    }
}
