//! shmbridge host process.
//!
//! Makes sure the shared-memory broker runs with the configured file, then
//! either exits (`supervise`) or verifies every message type end to end
//! (`verify`).

use anyhow::Result;
use tokio::signal;

use shmbridge::verify::LATENCY_WARNING_MS;
use shmbridge::{AppConfig, Command, HostArgs, HostConfig, VerifyArgs, VerifyOptions, Verifier};
use shmbridge_channel::{ChannelFactory, open_transport};
use shmbridge_common::{BrokerConfig, init_tracing};
use shmbridge_supervisor::{BrokerSpec, SupervisorOptions, SupervisorReport, SystemSupervisor};

#[tokio::main]
async fn main() -> Result<()> {
    let args = HostArgs::parse();

    let config = AppConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    // Initialize logging with optional CLI override
    let mut logging = config.logging().clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    init_tracing(&logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "Starting shmbridge"
    );

    if config.broker().enabled {
        let report = supervise(config.broker().clone()).await?;
        if !report.is_healthy() {
            tracing::warn!(
                outcome = %report.outcome,
                "Broker unavailable, channels will not connect"
            );
        }
    } else {
        tracing::info!("Broker supervision disabled");
    }

    match args.command() {
        Command::Supervise => Ok(()),
        Command::Verify(verify_args) => verify(&config, &verify_args).await,
    }
}

/// Run the supervisor off the async runtime; it sleeps and polls.
async fn supervise(broker: BrokerConfig) -> Result<SupervisorReport> {
    let report = tokio::task::spawn_blocking(move || {
        SystemSupervisor::system(SupervisorOptions::from(&broker))
            .ensure_broker_running(&BrokerSpec::from(&broker))
    })
    .await?;

    tracing::info!(
        initial = %report.initial,
        outcome = %report.outcome,
        pid = ?report.verified_pid.or(report.found_pid),
        "Broker supervision finished"
    );

    Ok(report)
}

async fn verify(config: &AppConfig, args: &VerifyArgs) -> Result<()> {
    let transport = open_transport(config.transport())?;
    tracing::info!(transport = transport.name(), "Transport ready");

    let factory =
        ChannelFactory::with_defaults(transport, config.channel().clone(), config.serialization());
    let verifier = Verifier::new(factory, VerifyOptions::from_args(args)?);
    let stop = verifier.stop_handle();
    let only = args.types.clone();

    let mut task = tokio::task::spawn_blocking(move || verifier.run(&only));

    let reports = tokio::select! {
        result = &mut task => result??,
        _ = signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, stopping verification");
            stop.store(true, std::sync::atomic::Ordering::Release);
            task.await??
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("--- Result: {} ({}) ---", report.label, report.type_name);
            println!("Messages Published: {}", report.published);
            println!("Messages Received:  {}", report.received);
            println!("Valid Payloads:     {}", report.valid);
            println!("Avg Latency:        {:.4} ms", report.avg_latency_ms);
            if report.high_latency() {
                println!("WARNING: latency above {LATENCY_WARNING_MS} ms");
            }
            println!("{}", "-".repeat(40));
        }
    }

    let failed: Vec<_> = reports
        .iter()
        .filter(|r| !r.passed())
        .map(|r| r.label)
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("verification failed for: {}", failed.join(", "));
    }

    tracing::info!(types = reports.len(), "All verifications passed");
    Ok(())
}
