//! Spawns and supervises one child process running the Three-Surface
//! Runtime for a single package: a status channel fed by a reaper task
//! that always runs the child to completion, so the process table never
//! accumulates zombies even when the supervisor itself is dropped early.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildStatus {
    Running,
    Exited { code: Option<i32>, signal: Option<i32> },
}

impl ChildStatus {
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, ChildStatus::Running)
    }
}

pub struct SupervisedChild {
    pid: u32,
    deployment_id: String,
    status: watch::Receiver<ChildStatus>,
    reaper: tokio::task::JoinHandle<()>,
}

/// Tags each line of a child's stdout/stderr with its `deploymentId` before
/// forwarding it to the host's own structured log, per the spawn contract.
fn spawn_log_pump(
    deployment_id: String,
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    target: &'static str,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => info!(target: target, deployment_id = %deployment_id, "{line}"),
                Ok(None) => break,
                Err(e) => {
                    warn!(target: target, deployment_id = %deployment_id, "log pump error: {e}");
                    break;
                }
            }
        }
    });
}

impl SupervisedChild {
    /// Spawns `interpreter` with `args` in `package_root`, piping stdout
    /// and stderr through line-tagged log pumps.
    pub fn spawn(
        interpreter: &Path,
        args: &[String],
        package_root: &Path,
        env: HashMap<String, String>,
        deployment_id: String,
    ) -> Result<Self> {
        let mut cmd = Command::new(interpreter);
        cmd.args(args)
            .current_dir(package_root)
            .env_clear()
            .envs(env)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| Error::SpawnFailed(e.to_string()))?;
        let pid = child.id().ok_or_else(|| Error::SpawnFailed("child exited before pid was observed".into()))?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        spawn_log_pump(deployment_id.clone(), stdout, "agentrt::child::stdout");
        spawn_log_pump(deployment_id.clone(), stderr, "agentrt::child::stderr");

        let (status_tx, status_rx) = watch::channel(ChildStatus::Running);
        let reap_deployment_id = deployment_id.clone();
        let reaper = tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(exit) => ChildStatus::Exited {
                    code: exit.code(),
                    signal: exit.signal(),
                },
                Err(_) => ChildStatus::Exited { code: None, signal: None },
            };
            info!(deployment_id = %reap_deployment_id, status = ?status, "child process reaped");
            let _ = status_tx.send(status);
        });

        Ok(Self {
            pid,
            deployment_id,
            status: status_rx,
            reaper,
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn status(&self) -> ChildStatus {
        self.status.borrow().clone()
    }

    pub async fn wait_for_exit(&mut self) -> ChildStatus {
        loop {
            if !self.status.borrow().is_running() {
                return self.status.borrow().clone();
            }
            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }

    /// Sends a polite termination signal, escalating to a forceful one if
    /// the child has not exited within `graceful_timeout`. Always awaits
    /// the reaper so the kernel never holds a zombie on our behalf.
    pub async fn stop(mut self, graceful_timeout: Duration) -> Result<ChildStatus> {
        if !self.status.borrow().is_running() {
            let status = self.status.borrow().clone();
            let _ = self.reaper.await;
            return Ok(status);
        }

        send_signal(self.pid, nix::sys::signal::Signal::SIGTERM);

        let graceful = tokio::time::timeout(graceful_timeout, self.wait_for_exit()).await;

        let escalated = graceful.is_err();
        if escalated {
            warn!(
                deployment_id = %self.deployment_id,
                pid = self.pid,
                "graceful shutdown timed out, escalating to SIGKILL"
            );
            send_signal(self.pid, nix::sys::signal::Signal::SIGKILL);
            self.wait_for_exit().await;
        }

        let _ = (&mut self.reaper).await;
        let status = self.status.borrow().clone();

        if escalated {
            return Err(Error::ShutdownTimeout);
        }
        Ok(status)
    }
}

fn send_signal(pid: u32, signal: nix::sys::signal::Signal) {
    let pid = nix::unistd::Pid::from_raw(pid as i32);
    if let Err(e) = nix::sys::signal::kill(pid, signal) {
        warn!(pid = pid.as_raw(), signal = ?signal, "failed to signal child: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_path() -> std::path::PathBuf {
        std::path::PathBuf::from("/bin/sh")
    }

    #[tokio::test]
    async fn reports_clean_exit_status() {
        let child = SupervisedChild::spawn(
            &sh_path(),
            &["-c".to_string(), "exit 0".to_string()],
            std::path::Path::new("/tmp"),
            HashMap::new(),
            "dep-exit".to_string(),
        )
        .unwrap();

        let mut child = child;
        let status = child.wait_for_exit().await;
        assert_eq!(status, ChildStatus::Exited { code: Some(0), signal: None });
    }

    #[tokio::test]
    async fn graceful_stop_succeeds_for_a_well_behaved_child() {
        let child = SupervisedChild::spawn(
            &sh_path(),
            &["-c".to_string(), "sleep 5".to_string()],
            std::path::Path::new("/tmp"),
            HashMap::new(),
            "dep-graceful".to_string(),
        )
        .unwrap();

        let status = child.stop(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(status, ChildStatus::Exited { .. }));
    }

    #[tokio::test]
    async fn stop_escalates_to_sigkill_when_child_ignores_sigterm() {
        let child = SupervisedChild::spawn(
            &sh_path(),
            &["-c".to_string(), "trap '' TERM; sleep 30".to_string()],
            std::path::Path::new("/tmp"),
            HashMap::new(),
            "dep-stubborn".to_string(),
        )
        .unwrap();

        let result = child.stop(Duration::from_millis(200)).await;
        assert!(matches!(result, Err(Error::ShutdownTimeout)));
    }
}
