//! shmbridge host.
//!
//! Runs the broker supervisor once at startup and offers an end-to-end
//! verification of every message type over the configured transport.

pub mod args;
pub mod config;
pub mod error;
pub mod verify;

pub use args::{Command, HostArgs, VerifyArgs};
pub use config::{AppConfig, HostConfig};
pub use error::{HostError, Result};
pub use verify::{VerifyOptions, VerifyReport, Verifier};
