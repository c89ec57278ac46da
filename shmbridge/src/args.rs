//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "shmbridge.json5";

#[derive(Parser, Debug, Clone)]
#[command(about = "Shared-memory pub/sub bridge host", version)]
pub struct HostArgs {
    /// Path to configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl HostArgs {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Subcommand to run, `supervise` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Supervise)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Make sure the broker runs with the configured file, then exit.
    Supervise,

    /// Publish and receive every message type, reporting rate and latency.
    Verify(VerifyArgs),
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct VerifyArgs {
    /// Domain to run the verification in.
    #[arg(long, default_value_t = 0)]
    pub domain: u32,

    /// Publish rate per message type, in Hz.
    #[arg(long, default_value_t = 60.0)]
    pub rate_hz: f64,

    /// How long to publish each message type, in seconds.
    #[arg(long, default_value_t = 2.0)]
    pub duration_secs: f64,

    /// Only verify these message types (repeatable).
    #[arg(long = "type")]
    pub types: Vec<String>,

    /// Print the reports as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_supervise() {
        let args = HostArgs::try_parse_from(["shmbridge"]).unwrap();
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG));
        assert_eq!(args.log_level, None);
        assert_eq!(args.command(), Command::Supervise);
    }

    #[test]
    fn test_verify_arguments() {
        let args = HostArgs::try_parse_from([
            "shmbridge",
            "--config",
            "host.json5",
            "--log-level",
            "debug",
            "verify",
            "--rate-hz",
            "30",
            "--type",
            "float_7d",
            "--type",
            "camera_224",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("host.json5"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        let Command::Verify(verify) = args.command() else {
            panic!("expected verify");
        };
        assert_eq!(verify.rate_hz, 30.0);
        assert_eq!(verify.duration_secs, 2.0);
        assert_eq!(verify.types, ["float_7d", "camera_224"]);
        assert!(!verify.json);
    }
}
