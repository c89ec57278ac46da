//! Shared-memory broker supervision.
//!
//! The shared-memory transport needs a broker daemon running with a known
//! configuration file. [`BrokerSupervisor::ensure_broker_running`] is called
//! once by the host's startup sequence and:
//!
//! - finds the broker in the process table ([`ProcessInspector`])
//! - leaves it alone when its launch arguments carry the expected config path
//! - stops it (SIGTERM, then SIGKILL after a grace period) when they do not
//! - launches a new detached instance and checks it is present after a
//!   settle delay
//!
//! # Example
//!
//! ```ignore
//! use shmbridge_supervisor::{BrokerSpec, supervise};
//!
//! let report = supervise(&BrokerSpec::new("iox-roudi", "/etc/iceoryx/roudi.toml"));
//! if !report.is_healthy() {
//!     tracing::warn!("Continuing without a broker");
//! }
//! ```

mod inspector;
mod launcher;
mod supervisor;

pub use inspector::{
    BrokerProcessHandle, ProcessEntry, ProcessInspector, ProcessTable, SignalError,
    SysinfoProcessTable,
};
pub use launcher::{BrokerLauncher, DetachedLauncher, LaunchError};
pub use supervisor::{
    BrokerSpec, BrokerState, BrokerSupervisor, SupervisorOptions, SupervisorReport, Termination,
};

/// Supervisor wired to the real process table and launcher.
pub type SystemSupervisor = BrokerSupervisor<SysinfoProcessTable, DetachedLauncher>;

impl SystemSupervisor {
    /// Supervisor for the running system with the given timing.
    pub fn system(options: SupervisorOptions) -> Self {
        BrokerSupervisor::with_options(SysinfoProcessTable::new(), DetachedLauncher, options)
    }
}

/// Run the system supervisor once with default timing.
pub fn supervise(spec: &BrokerSpec) -> SupervisorReport {
    SystemSupervisor::system(SupervisorOptions::default()).ensure_broker_running(spec)
}
