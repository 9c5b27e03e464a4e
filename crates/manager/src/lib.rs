//! Deployment manager, control API, and process-wide configuration for the
//! multi-tenant agent hosting runtime.

pub mod api;
pub mod config;
pub mod deployment;
pub mod error;
pub mod metrics;
pub mod records;

pub use config::ManagerConfig;
pub use deployment::DeploymentManager;
pub use error::{Error, Result};
pub use metrics::Metrics;
