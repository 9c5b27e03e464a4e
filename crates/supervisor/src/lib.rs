//! Agent Supervisor: spawns the child that runs the Three-Surface Runtime
//! for one package, captures its stdout/stderr line-by-line tagged with
//! the `deploymentId`, and supervises its termination. Restart policy is
//! explicitly out of scope here — the Deployment Manager owns that
//! decision.

pub mod env;
pub mod error;
pub mod process;

pub use env::{build_child_env, parse_dotenv, ContractVars};
pub use error::{Error, Result};
pub use process::{ChildStatus, SupervisedChild};

use std::time::Duration;

/// Default grace period before a polite termination signal escalates to a
/// forceful one.
pub const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
