//! Broker process launch.

use std::io;
use std::process::{Child, Command, Stdio};

use thiserror::Error;

use crate::BrokerSpec;

/// Why a broker could not be launched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("executable '{executable}' not found in PATH")]
    NotFound { executable: String },

    #[error("permission denied launching '{executable}'")]
    PermissionDenied { executable: String },

    #[error("failed to spawn '{executable}': {message}")]
    Spawn { executable: String, message: String },
}

impl LaunchError {
    fn from_io(executable: &str, err: io::Error) -> Self {
        let executable = executable.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => LaunchError::NotFound { executable },
            io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied { executable },
            _ => LaunchError::Spawn {
                executable,
                message: err.to_string(),
            },
        }
    }
}

/// Starts a broker process.
pub trait BrokerLauncher: Send + Sync {
    /// Launch the broker and return its pid. Must not wait for it to exit.
    fn launch(&self, spec: &BrokerSpec) -> Result<u32, LaunchError>;
}

/// Launches `<executable> -c <config-path>` in its own process group with
/// all standard streams detached, so the broker survives the caller's exit
/// and terminal signals sent to the caller's group.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedLauncher;

impl DetachedLauncher {
    fn command(spec: &BrokerSpec) -> Command {
        let mut cmd = Command::new(&spec.executable);
        cmd.arg("-c").arg(&spec.config_path);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd
    }
}

impl BrokerLauncher for DetachedLauncher {
    fn launch(&self, spec: &BrokerSpec) -> Result<u32, LaunchError> {
        tracing::info!(
            executable = %spec.executable,
            config_path = %spec.config_path.display(),
            "Starting broker"
        );

        let child = Self::command(spec)
            .spawn()
            .map_err(|e| LaunchError::from_io(&spec.executable, e))?;
        let pid = child.id();

        tracing::info!(pid, "Broker start command issued");
        spawn_reaper(child);

        Ok(pid)
    }
}

/// Collect the broker's exit status if it dies while this process lives, so
/// it never lingers as a zombie. The thread is detached: the broker is meant
/// to outlive this process.
fn spawn_reaper(mut child: Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reap:{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => tracing::warn!(pid, %status, "Broker exited"),
            Err(e) => tracing::debug!(pid, error = %e, "Failed to wait for broker"),
        });

    if let Err(e) = spawned {
        tracing::warn!(pid, error = %e, "Failed to start broker reaper thread");
    }
}
