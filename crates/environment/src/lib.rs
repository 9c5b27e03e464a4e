pub mod builder;
pub mod error;
pub mod eviction;
pub mod installer;
pub mod metadata;

pub use builder::{dependency_fingerprint, env_name, EnvironmentBuilder};
pub use error::{Error, Result};
pub use eviction::EvictionPolicy;
pub use installer::{DependencyInstaller, PythonVenvInstaller};
pub use metadata::EnvMetadata;
