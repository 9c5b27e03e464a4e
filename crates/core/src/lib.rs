//! Shared types for the agent hosting runtime: the deployment data model,
//! the error-kind taxonomy, structured event emission, and fingerprinting
//! helpers used across the fetcher, package cache, environment builder,
//! and deployment manager.

pub mod error;
pub mod events;
pub mod fingerprint;
pub mod model;

pub use error::{ErrorKind, KindedError, Result};
pub use model::{
    CachedPackage, DeclaredSurfaces, DeploymentRecord, DeploymentRequest, DeploymentStatus,
    Environment, LastError, PackageManifest, PortAllocation, RestSurface, RpcSurface, UiSurface,
    ALLOWED_SOURCE_SCHEMES,
};
