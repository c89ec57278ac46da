//! Broker supervision state machine.
//!
//! ```text
//!   Absent ───────────────┐
//!                         ├──▶ Starting ──▶ Verified | Failed
//!   RunningMismatched ────┘  (terminate first)
//!   RunningMatched ──▶ (no-op)
//! ```
//!
//! Every failure is logged and recorded in the [`SupervisorReport`]. Nothing
//! here returns an error or panics: a broker that cannot be recovered leaves
//! the host in a degraded mode where channels never connect.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use shmbridge_common::BrokerConfig;

use crate::inspector::{BrokerProcessHandle, ProcessInspector, ProcessTable, SignalError};
use crate::launcher::{BrokerLauncher, LaunchError};

/// What broker to supervise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSpec {
    /// Executable name, also the process-name substring searched for.
    pub executable: String,
    /// Config path that must appear in the broker's launch arguments.
    pub config_path: PathBuf,
}

impl BrokerSpec {
    pub fn new(executable: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            config_path: config_path.into(),
        }
    }
}

impl From<&BrokerConfig> for BrokerSpec {
    fn from(config: &BrokerConfig) -> Self {
        Self::new(config.executable.clone(), config.config_path.clone())
    }
}

/// Broker state as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerState {
    Absent,
    RunningMatched,
    RunningMismatched,
    Starting,
    Verified,
    Failed,
}

impl BrokerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerState::Absent => "absent",
            BrokerState::RunningMatched => "running_matched",
            BrokerState::RunningMismatched => "running_mismatched",
            BrokerState::Starting => "starting",
            BrokerState::Verified => "verified",
            BrokerState::Failed => "failed",
        }
    }

    /// Whether a broker is expected to be usable in this state.
    pub fn is_healthy(&self) -> bool {
        matches!(self, BrokerState::RunningMatched | BrokerState::Verified)
    }
}

impl std::fmt::Display for BrokerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a mismatched broker was stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Exited within the grace period after SIGTERM.
    Graceful,
    /// Still alive after the grace period and was killed.
    Forced,
    /// Gone before it could be signalled.
    AlreadyExited,
    /// Could not be stopped. Starting proceeds regardless.
    Failed(SignalError),
}

/// Timing of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Grace period between SIGTERM and SIGKILL.
    pub terminate_timeout: Duration,
    /// Pause after a launch before checking the broker is present.
    pub settle_delay: Duration,
    /// Poll interval while waiting for a terminated broker to exit.
    pub exit_poll: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            terminate_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_secs(1),
            exit_poll: Duration::from_millis(50),
        }
    }
}

impl From<&BrokerConfig> for SupervisorOptions {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            terminate_timeout: config.terminate_timeout(),
            settle_delay: config.settle_delay(),
            exit_poll: config.exit_poll(),
        }
    }
}

/// Outcome of one supervisor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    /// State computed from the first process-table lookup.
    pub initial: BrokerState,
    /// Terminal state: `RunningMatched`, `Verified` or `Failed`.
    pub outcome: BrokerState,
    /// Broker found on the first lookup.
    pub found_pid: Option<u32>,
    /// Set when a mismatched broker had to be stopped.
    pub termination: Option<Termination>,
    /// Pid returned by the launcher.
    pub launched_pid: Option<u32>,
    /// Set when the launcher failed.
    pub launch_error: Option<LaunchError>,
    /// Broker found after the settle delay.
    pub verified_pid: Option<u32>,
}

impl SupervisorReport {
    fn new(initial: BrokerState, found_pid: Option<u32>) -> Self {
        Self {
            initial,
            outcome: initial,
            found_pid,
            termination: None,
            launched_pid: None,
            launch_error: None,
            verified_pid: None,
        }
    }

    /// Whether the broker is usable after this run.
    pub fn is_healthy(&self) -> bool {
        self.outcome.is_healthy()
    }
}

/// Guarantees the broker is running with the expected configuration.
pub struct BrokerSupervisor<T: ProcessTable, L: BrokerLauncher> {
    inspector: ProcessInspector<T>,
    launcher: L,
    options: SupervisorOptions,
}

impl<T: ProcessTable, L: BrokerLauncher> BrokerSupervisor<T, L> {
    pub fn new(table: T, launcher: L) -> Self {
        Self::with_options(table, launcher, SupervisorOptions::default())
    }

    pub fn with_options(table: T, launcher: L, options: SupervisorOptions) -> Self {
        Self {
            inspector: ProcessInspector::new(table),
            launcher,
            options,
        }
    }

    pub fn inspector(&self) -> &ProcessInspector<T> {
        &self.inspector
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Classify the broker from a single process-table lookup.
    pub fn inspect(&self, spec: &BrokerSpec) -> (BrokerState, Option<BrokerProcessHandle>) {
        match self.inspector.find_broker_process(&spec.executable) {
            None => (BrokerState::Absent, None),
            Some(handle) => {
                if self
                    .inspector
                    .arguments_contain_path(&handle, &spec.config_path)
                {
                    (BrokerState::RunningMatched, Some(handle))
                } else {
                    (BrokerState::RunningMismatched, Some(handle))
                }
            }
        }
    }

    /// Make sure the broker is running with `spec.config_path`.
    ///
    /// Running it again while the broker is healthy is a no-op.
    pub fn ensure_broker_running(&self, spec: &BrokerSpec) -> SupervisorReport {
        let span = tracing::info_span!("broker_supervisor", executable = %spec.executable);
        let _enter = span.enter();

        tracing::info!("Checking broker status");

        let (initial, handle) = self.inspect(spec);
        let mut report = SupervisorReport::new(initial, handle.as_ref().map(|h| h.pid));

        match handle {
            Some(handle) if initial == BrokerState::RunningMatched => {
                tracing::info!(
                    pid = handle.pid,
                    config_path = %spec.config_path.display(),
                    "Broker configuration matches"
                );
                return report;
            }
            Some(handle) => {
                tracing::warn!(
                    pid = handle.pid,
                    expected = %spec.config_path.display(),
                    cmdline = ?handle.launch_arguments,
                    "Broker config mismatch, stopping it"
                );
                report.termination = Some(self.terminate(&handle));
            }
            None => {
                tracing::warn!("Broker is not running");
            }
        }

        report.outcome = self.start_and_verify(spec, &mut report);
        report
    }

    /// SIGTERM, wait up to the grace period, then SIGKILL.
    fn terminate(&self, handle: &BrokerProcessHandle) -> Termination {
        let table = self.inspector.table();
        let pid = handle.pid;

        match table.terminate(pid) {
            Ok(()) => {}
            Err(SignalError::NoSuchProcess(_)) => {
                tracing::info!(pid, "Broker exited before it was signalled");
                return Termination::AlreadyExited;
            }
            Err(e) => {
                tracing::warn!(pid, error = %e, "Failed to send SIGTERM to broker");
            }
        }

        if self.wait_for_exit(pid) {
            tracing::info!(pid, "Broker stopped");
            return Termination::Graceful;
        }

        tracing::warn!(
            pid,
            timeout_ms = self.options.terminate_timeout.as_millis() as u64,
            "Broker did not exit, forcing kill"
        );

        match table.kill(pid) {
            Ok(()) => Termination::Forced,
            Err(SignalError::NoSuchProcess(_)) => Termination::Graceful,
            Err(e) => {
                tracing::error!(pid, error = %e, "Failed to kill broker");
                Termination::Failed(e)
            }
        }
    }

    fn wait_for_exit(&self, pid: u32) -> bool {
        let table = self.inspector.table();
        let deadline = Instant::now() + self.options.terminate_timeout;

        loop {
            if !table.is_alive(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.options.exit_poll.min(deadline - now));
        }
    }

    fn start_and_verify(&self, spec: &BrokerSpec, report: &mut SupervisorReport) -> BrokerState {
        tracing::debug!(state = %BrokerState::Starting, "Broker transition");

        if !spec.config_path.exists() {
            warn_missing_config(&spec.config_path);
        }

        match self.launcher.launch(spec) {
            Ok(pid) => report.launched_pid = Some(pid),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start broker");
                report.launch_error = Some(e);
            }
        }

        std::thread::sleep(self.options.settle_delay);

        let brokers = self.inspector.find_broker_processes(&spec.executable);
        let matched = brokers
            .iter()
            .find(|handle| self.inspector.arguments_contain_path(handle, &spec.config_path));

        match matched.or(brokers.first()) {
            Some(handle) => {
                if matched.is_none() {
                    tracing::warn!(
                        pid = handle.pid,
                        expected = %spec.config_path.display(),
                        cmdline = ?handle.launch_arguments,
                        "Broker is up but not with the expected config"
                    );
                }
                if let Some(Termination::Failed(e)) = &report.termination
                    && Some(handle.pid) == report.found_pid
                {
                    tracing::warn!(
                        pid = handle.pid,
                        error = %e,
                        "Mismatched broker could not be stopped and is still running"
                    );
                }
                tracing::info!(pid = handle.pid, "Recovery successful, broker is up");
                report.verified_pid = Some(handle.pid);
                BrokerState::Verified
            }
            None => {
                tracing::error!("Recovery failed, broker is not running");
                BrokerState::Failed
            }
        }
    }
}

fn warn_missing_config(path: &Path) {
    tracing::warn!(config_path = %path.display(), "Broker config file not found");
}
