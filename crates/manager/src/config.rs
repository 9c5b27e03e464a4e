//! Process-wide configuration for the host daemon, parsed with `clap`:
//! every field validated eagerly, with every invalid field enumerated in
//! one error rather than failing on the first.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

fn default_cache_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(dir) => dir.join("agentrt"),
        None => PathBuf::from("./agentrt-cache"),
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "agentrt-manager", about = "Multi-tenant agent hosting runtime: deployment manager and control API")]
pub struct ManagerConfig {
    /// Address the Control API binds to.
    #[arg(long, env = "AGENTRT_BIND_ADDR", default_value = "0.0.0.0:9000")]
    pub bind_addr: SocketAddr,

    /// Root directory for fetched packages, environments, and metadata.
    #[arg(long, env = "AGENTRT_DATA_DIR", default_value_os_t = default_cache_dir())]
    pub data_dir: PathBuf,

    #[arg(long, env = "AGENTRT_REST_PORT_MIN", default_value_t = 8080)]
    pub rest_port_min: u16,
    #[arg(long, env = "AGENTRT_REST_PORT_MAX", default_value_t = 8180)]
    pub rest_port_max: u16,
    #[arg(long, env = "AGENTRT_RPC_PORT_MIN", default_value_t = 50051)]
    pub rpc_port_min: u16,
    #[arg(long, env = "AGENTRT_RPC_PORT_MAX", default_value_t = 50151)]
    pub rpc_port_max: u16,
    #[arg(long, env = "AGENTRT_UI_PORT_MIN", default_value_t = 3000)]
    pub ui_port_min: u16,
    #[arg(long, env = "AGENTRT_UI_PORT_MAX", default_value_t = 3100)]
    pub ui_port_max: u16,

    #[arg(long, env = "AGENTRT_MAX_PACKAGE_SIZE_MB", default_value_t = 100)]
    pub max_package_size_mb: u64,
    #[arg(long, env = "AGENTRT_FETCH_TIMEOUT_SECS", default_value_t = 60)]
    pub fetch_timeout_secs: u64,
    #[arg(long, env = "AGENTRT_ENV_BUILD_TIMEOUT_SECS", default_value_t = 300)]
    pub env_build_timeout_secs: u64,
    #[arg(long, env = "AGENTRT_READINESS_TIMEOUT_SECS", default_value_t = 60)]
    pub readiness_timeout_secs: u64,
    #[arg(long, env = "AGENTRT_GRACEFUL_SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    pub graceful_shutdown_timeout_secs: u64,

    #[arg(long, env = "AGENTRT_MAX_ENVS", default_value_t = 50)]
    pub max_envs: usize,
    #[arg(long, env = "AGENTRT_MAX_ENV_TOTAL_GIB", default_value_t = 10)]
    pub max_env_total_gib: u64,

    /// Expected object-store bucket; a mismatching bucket in a request's
    /// `packageUrl` is warned about, not rejected.
    #[arg(long, env = "AGENTRT_PACKAGE_SOURCE_BUCKET")]
    pub package_source_bucket: Option<String>,

    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9000),
            data_dir: default_cache_dir(),
            rest_port_min: 8080,
            rest_port_max: 8180,
            rpc_port_min: 50051,
            rpc_port_max: 50151,
            ui_port_min: 3000,
            ui_port_max: 3100,
            max_package_size_mb: 100,
            fetch_timeout_secs: 60,
            env_build_timeout_secs: 300,
            readiness_timeout_secs: 60,
            graceful_shutdown_timeout_secs: 30,
            max_envs: 50,
            max_env_total_gib: 10,
            package_source_bucket: None,
            verbose: 0,
        }
    }
}

impl ManagerConfig {
    /// Validates every field, collecting all problems instead of
    /// short-circuiting on the first one.
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();

        if self.rest_port_min > self.rest_port_max {
            problems.push("rest-port-min must be <= rest-port-max".to_string());
        }
        if self.rpc_port_min > self.rpc_port_max {
            problems.push("rpc-port-min must be <= rpc-port-max".to_string());
        }
        if self.ui_port_min > self.ui_port_max {
            problems.push("ui-port-min must be <= ui-port-max".to_string());
        }
        if ranges_overlap(self.rest_port_min, self.rest_port_max, self.rpc_port_min, self.rpc_port_max) {
            problems.push("rest and rpc port ranges must be disjoint".to_string());
        }
        if ranges_overlap(self.rest_port_min, self.rest_port_max, self.ui_port_min, self.ui_port_max) {
            problems.push("rest and ui port ranges must be disjoint".to_string());
        }
        if ranges_overlap(self.rpc_port_min, self.rpc_port_max, self.ui_port_min, self.ui_port_max) {
            problems.push("rpc and ui port ranges must be disjoint".to_string());
        }
        if self.max_package_size_mb == 0 {
            problems.push("max-package-size-mb must be non-zero".to_string());
        }
        if self.max_envs == 0 {
            problems.push("max-envs must be non-zero".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }

    #[must_use]
    pub fn port_ranges(&self) -> agentrt_ports::PortRanges {
        agentrt_ports::PortRanges {
            rest: self.rest_port_min..=self.rest_port_max,
            rpc: self.rpc_port_min..=self.rpc_port_max,
            ui: self.ui_port_min..=self.ui_port_max,
        }
    }

    #[must_use]
    pub fn max_package_bytes(&self) -> u64 {
        self.max_package_size_mb * 1024 * 1024
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[must_use]
    pub fn env_build_timeout(&self) -> Duration {
        Duration::from_secs(self.env_build_timeout_secs)
    }

    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    #[must_use]
    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_secs)
    }

    #[must_use]
    pub fn eviction_policy(&self) -> agentrt_environment::EvictionPolicy {
        agentrt_environment::EvictionPolicy {
            max_envs: self.max_envs,
            max_total_bytes: self.max_env_total_gib * 1024 * 1024 * 1024,
        }
    }

    #[must_use]
    pub fn packages_dir(&self) -> PathBuf {
        self.data_dir.join("packages")
    }

    #[must_use]
    pub fn extracted_dir(&self) -> PathBuf {
        self.data_dir.join("extracted")
    }

    #[must_use]
    pub fn envs_dir(&self) -> PathBuf {
        self.data_dir.join("envs")
    }
}

fn ranges_overlap(a_min: u16, a_max: u16, b_min: u16, b_max: u16) -> bool {
    a_min <= b_max && b_min <= a_max
}
