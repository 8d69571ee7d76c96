//! Tunnel subprocess supervision.
//!
//! The tunnel binary runs as a child process whose stdout/stderr go
//! straight to the terminal. After a fixed settle interval the tunnel is
//! assumed up (the binary emits no readiness signal), then two waiters race:
//! external shutdown and the child exiting on its own. Whichever finishes
//! first decides the [`TunnelOutcome`]; the other is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::ConnectionConfig;
use crate::error::{Error, Result};
use crate::ports::PortMapping;

/// How a supervised tunnel ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelOutcome {
    /// Shutdown was requested and the subprocess was killed.
    Interrupted,
    /// The subprocess exited cleanly on its own.
    Disconnected,
    /// The subprocess failed or could not be waited on.
    Lost(String),
}

/// Starts and supervises the tunnel binary.
#[derive(Debug, Clone)]
pub struct TunnelSupervisor {
    binary: PathBuf,
    settle_interval: Duration,
    working_dir: Option<PathBuf>,
}

impl TunnelSupervisor {
    pub fn new(binary: impl Into<PathBuf>, settle_interval: Duration) -> Self {
        Self {
            binary: binary.into(),
            settle_interval,
            working_dir: None,
        }
    }

    /// Run the subprocess from `dir` instead of the current directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// `client --auth <user>:<password> <server> <mapping>...`
    pub fn command_args(config: &ConnectionConfig, mappings: &[PortMapping]) -> Vec<String> {
        let mut args = vec![
            "client".to_string(),
            "--auth".to_string(),
            config.auth_token(),
            config.server_url.clone(),
        ];
        args.extend(mappings.iter().map(ToString::to_string));
        args
    }

    /// Spawn the tunnel and wait out the settle interval.
    pub async fn start(
        &self,
        config: &ConnectionConfig,
        mappings: &[PortMapping],
    ) -> Result<RunningTunnel> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(Self::command_args(config, mappings))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        info!(
            binary = %self.binary.display(),
            server = %config.server_url,
            user = %config.username,
            forwards = mappings.len(),
            "spawning tunnel"
        );
        let child = cmd.spawn().map_err(|source| Error::SubprocessStart {
            program: self.binary.display().to_string(),
            source,
        })?;
        debug!(pid = ?child.id(), "tunnel spawned");

        // An early crash is picked up by `supervise` after this sleep, so it
        // is reported as a lost tunnel rather than racing the ready banner.
        tokio::time::sleep(self.settle_interval).await;

        Ok(RunningTunnel { child })
    }

    /// Start, call `on_up` once settled, then supervise until the outcome.
    pub async fn run(
        &self,
        config: &ConnectionConfig,
        mappings: &[PortMapping],
        shutdown: &CancellationToken,
        on_up: impl FnOnce(&RunningTunnel),
    ) -> Result<TunnelOutcome> {
        let tunnel = self.start(config, mappings).await?;
        on_up(&tunnel);
        Ok(tunnel.supervise(shutdown).await)
    }
}

/// A started tunnel subprocess. Owned by the supervisor until it ends.
#[derive(Debug)]
pub struct RunningTunnel {
    child: Child,
}

impl RunningTunnel {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Block until shutdown is requested or the subprocess exits.
    ///
    /// On shutdown the subprocess is killed outright and reaped; no
    /// graceful stop is attempted.
    pub async fn supervise(mut self, shutdown: &CancellationToken) -> TunnelOutcome {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                info!("shutdown requested, stopping tunnel");
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "failed to kill tunnel subprocess");
                }
                TunnelOutcome::Interrupted
            }
            status = self.child.wait() => match status {
                Ok(status) if status.success() => {
                    info!("tunnel exited");
                    TunnelOutcome::Disconnected
                }
                Ok(status) => {
                    warn!(%status, "tunnel exited with failure");
                    TunnelOutcome::Lost(status.to_string())
                }
                Err(e) => {
                    warn!(error = %e, "failed to wait on tunnel subprocess");
                    TunnelOutcome::Lost(e.to_string())
                }
            },
        }
    }
}
