//! The dependency installer is a pluggable primitive: the host only needs
//! "install into directory X given manifest Y" and "launch this
//! directory's interpreter" to support any ecosystem whose artifact model
//! is a tree of files under a root. The shipped implementation drives a
//! Python-style virtual environment, since that is the reference ecosystem
//! the package format targets; other ecosystems plug in by implementing
//! the same trait.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Creates a fresh environment at `env_path`, installs dependencies
    /// from `dependency_manifest` (if present) using `wheelhouse` as a
    /// secondary offline index when supplied, then installs
    /// `package_root` itself in development mode so its own modules
    /// become importable.
    async fn install(
        &self,
        package_root: &Path,
        dependency_manifest: Option<&Path>,
        env_path: &Path,
        wheelhouse: Option<&Path>,
        timeout: Duration,
    ) -> Result<()>;

    /// The interpreter executable this installer's environments expose.
    fn interpreter_path(&self, env_path: &Path) -> PathBuf;

    /// Runs a one-liner in `env_path`'s interpreter to confirm it self-
    /// identifies as belonging to that directory.
    async fn self_identifies_as(&self, env_path: &Path) -> bool;
}

async fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<()> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    let child = cmd.spawn().map_err(|e| Error::InstallFailed(e.to_string()))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| Error::InstallTimeout(timeout))?
        .map_err(|e| Error::InstallFailed(e.to_string()))?;

    if !output.status.success() {
        return Err(Error::InstallFailed(format!(
            "exit status {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// Installer backed by a Python-compatible `venv` + `pip` toolchain.
pub struct PythonVenvInstaller {
    pub python_bin: String,
}

impl Default for PythonVenvInstaller {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
        }
    }
}

impl PythonVenvInstaller {
    fn bin_dir(&self, env_path: &Path) -> PathBuf {
        if cfg!(target_family = "windows") {
            env_path.join("Scripts")
        } else {
            env_path.join("bin")
        }
    }

    fn pip_path(&self, env_path: &Path) -> PathBuf {
        let name = if cfg!(target_family = "windows") { "pip.exe" } else { "pip" };
        self.bin_dir(env_path).join(name)
    }
}

#[async_trait]
impl DependencyInstaller for PythonVenvInstaller {
    async fn install(
        &self,
        package_root: &Path,
        dependency_manifest: Option<&Path>,
        env_path: &Path,
        wheelhouse: Option<&Path>,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        let mut create = Command::new(&self.python_bin);
        create.arg("-m").arg("venv").arg(env_path);
        run_with_timeout(create, timeout).await?;

        let pip = self.pip_path(env_path);

        if let Some(manifest) = dependency_manifest {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let mut install = Command::new(&pip);
            install.arg("install").arg("-r").arg(manifest);
            if let Some(wh) = wheelhouse {
                install.arg("--find-links").arg(wh);
            }
            run_with_timeout(install, remaining).await?;
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let mut install_self = Command::new(&pip);
        install_self.arg("install").arg("-e").arg(package_root);
        run_with_timeout(install_self, remaining).await?;

        Ok(())
    }

    fn interpreter_path(&self, env_path: &Path) -> PathBuf {
        let name = if cfg!(target_family = "windows") { "python.exe" } else { "python" };
        self.bin_dir(env_path).join(name)
    }

    async fn self_identifies_as(&self, env_path: &Path) -> bool {
        let interpreter = self.interpreter_path(env_path);
        if !interpreter.exists() {
            return false;
        }

        let output = Command::new(&interpreter)
            .arg("-c")
            .arg("import sys; print(sys.prefix)")
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let prefix = String::from_utf8_lossy(&out.stdout);
                let prefix = prefix.trim();
                std::path::Path::new(prefix) == env_path
            }
            _ => false,
        }
    }
}
