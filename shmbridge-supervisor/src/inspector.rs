//! Process table access for broker discovery.
//!
//! The operating system's process table is reached through the
//! [`ProcessTable`] trait. [`SysinfoProcessTable`] implements it with the
//! `sysinfo` crate; tests provide their own in-memory tables.

use std::ffi::OsStr;
use std::path::Path;

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind};
use thiserror::Error;

/// Longest process name the Linux kernel keeps (`TASK_COMM_LEN` minus the nul).
const COMM_MAX_LEN: usize = 15;

/// Snapshot of one OS process.
///
/// This is a transient view: it is not updated and becomes stale the moment
/// the process exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerProcessHandle {
    pub pid: u32,
    pub name: String,
    /// Launch arguments including `argv[0]`. Empty when they could not be read.
    pub launch_arguments: Vec<String>,
}

/// One entry of a process table enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// `None` when the name could not be read (access denied, process gone).
    pub name: Option<String>,
    pub arguments: Vec<String>,
    pub zombie: bool,
}

/// Failure to deliver a signal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("process {0} does not exist")]
    NoSuchProcess(u32),

    #[error("signal not supported on this platform")]
    Unsupported,

    #[error("signal to process {0} was refused")]
    Refused(u32),
}

/// Process table operations needed by the supervisor.
pub trait ProcessTable: Send + Sync {
    /// Enumerate every process currently known to the OS, ordered by pid.
    fn processes(&self) -> Vec<ProcessEntry>;

    /// Whether the process exists and has not become a zombie.
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the process to exit (SIGTERM).
    fn terminate(&self, pid: u32) -> Result<(), SignalError>;

    /// Force the process to exit (SIGKILL).
    fn kill(&self, pid: u32) -> Result<(), SignalError>;
}

/// [`ProcessTable`] backed by `sysinfo`.
pub struct SysinfoProcessTable {
    system: Mutex<System>,
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn refresh_one(system: &mut System, pid: Pid) {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
    }
}

impl std::fmt::Debug for SysinfoProcessTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoProcessTable").finish_non_exhaustive()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn processes(&self) -> Vec<ProcessEntry> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let mut entries: Vec<ProcessEntry> = system
            .processes()
            .values()
            .map(|process| {
                let arguments: Vec<String> = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect();
                ProcessEntry {
                    pid: process.pid().as_u32(),
                    name: full_process_name(
                        &process.name().to_string_lossy(),
                        arguments.first().map(String::as_str),
                    ),
                    arguments,
                    zombie: matches!(process.status(), ProcessStatus::Zombie),
                }
            })
            .collect();

        entries.sort_by_key(|entry| entry.pid);
        entries
    }

    fn is_alive(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        Self::refresh_one(&mut system, pid);
        system
            .process(pid)
            .is_some_and(|process| !matches!(process.status(), ProcessStatus::Zombie))
    }

    fn terminate(&self, pid: u32) -> Result<(), SignalError> {
        let mut system = self.system.lock();
        Self::refresh_one(&mut system, Pid::from_u32(pid));
        let process = system
            .process(Pid::from_u32(pid))
            .ok_or(SignalError::NoSuchProcess(pid))?;

        match process.kill_with(Signal::Term) {
            Some(true) => Ok(()),
            Some(false) => Err(SignalError::Refused(pid)),
            None => Err(SignalError::Unsupported),
        }
    }

    fn kill(&self, pid: u32) -> Result<(), SignalError> {
        let mut system = self.system.lock();
        Self::refresh_one(&mut system, Pid::from_u32(pid));
        let process = system
            .process(Pid::from_u32(pid))
            .ok_or(SignalError::NoSuchProcess(pid))?;

        if process.kill() {
            Ok(())
        } else {
            Err(SignalError::Refused(pid))
        }
    }
}

/// Recover the full process name from `argv[0]` when the kernel name may
/// have been truncated.
///
/// The basename of `argv[0]` is used only when it extends the truncated
/// name, so processes that rewrite their command line keep the kernel name.
fn full_process_name(comm: &str, argv0: Option<&str>) -> Option<String> {
    if comm.is_empty() {
        return None;
    }
    if comm.len() >= COMM_MAX_LEN
        && let Some(base) = argv0.map(executable_name)
        && base.len() > comm.len()
        && base.starts_with(comm)
    {
        return Some(base.to_string());
    }
    Some(comm.to_string())
}

/// File name part of an executable path, or the input when it has none.
fn executable_name(executable: &str) -> &str {
    Path::new(executable)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or(executable)
}

/// Finds the broker process and inspects its launch arguments.
#[derive(Debug)]
pub struct ProcessInspector<T: ProcessTable> {
    table: T,
}

impl<T: ProcessTable> ProcessInspector<T> {
    pub fn new(table: T) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Return the first live process whose name contains `name_substring`.
    ///
    /// A path is reduced to its file name first, since process names never
    /// carry directories. Processes whose name cannot be read and zombies are
    /// skipped: they are races with the process table, not failures.
    pub fn find_broker_process(&self, name_substring: &str) -> Option<BrokerProcessHandle> {
        self.find_broker_processes(name_substring).into_iter().next()
    }

    /// Every live process matching like [`find_broker_process`], in pid order.
    ///
    /// [`find_broker_process`]: Self::find_broker_process
    pub fn find_broker_processes(&self, name_substring: &str) -> Vec<BrokerProcessHandle> {
        let name_substring = executable_name(name_substring);
        self.table
            .processes()
            .into_iter()
            .filter(|entry| !entry.zombie)
            .filter_map(|entry| {
                let name = entry.name?;
                name.contains(name_substring).then(|| BrokerProcessHandle {
                    pid: entry.pid,
                    name,
                    launch_arguments: entry.arguments,
                })
            })
            .collect()
    }

    /// Whether `path` appears verbatim among the handle's launch arguments.
    ///
    /// Unreadable arguments leave the list empty, which never matches.
    pub fn arguments_contain_path(&self, handle: &BrokerProcessHandle, path: &Path) -> bool {
        handle
            .launch_arguments
            .iter()
            .any(|arg| OsStr::new(arg) == path.as_os_str())
    }
}
