use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use migfra_bench::{render_table, BenchConfig, Migrator};
use migfra_broker::{BrokerAddress, MqttChannel};
use migfra_remote::{SshOptions, SshShell};

/// Live-migration benchmark driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Number of rounds (overrides config)
    #[arg(short, long)]
    rounds: Option<u32>,

    /// Seconds between round starts (overrides config)
    #[arg(short, long)]
    period: Option<u64>,

    /// Directory for task runner artifacts and the evaluation (overrides config)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    info!("Config file: {}", args.config.display());
    let config = load_config(&args)?;
    info!(
        "Loaded configuration for {} VMs, {} rounds every {}s",
        config.bench_config.len(),
        config.effective_rounds(),
        config.period
    );

    let address: BrokerAddress = config
        .mqtt_broker
        .parse()
        .with_context(|| format!("Invalid mqtt_broker: {}", config.mqtt_broker))?;
    let channel = Arc::new(
        MqttChannel::connect(&address, "migfrabench")
            .await
            .context("Failed to connect to the MQTT broker")?,
    );
    let shell = SshShell::new(SshOptions::default());

    let migrator = Migrator::new(config, channel.clone(), Arc::new(shell))?;

    // Abort the campaign on SIGINT/SIGTERM
    let abort = migrator.abort_token();
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => {
                warn!("Aborting campaign");
                abort.cancel();
            }
            Err(e) => error!("Failed to install signal handlers: {}", e),
        }
    });

    let result = migrator.run().await;
    // Stop requests of an aborted campaign may still be queued
    channel.disconnect().await;
    let report = result?;

    println!("{}", report.render_summary());
    if let Some(evaluation) = &report.evaluation {
        println!("{}", render_table(evaluation));
    }
    if let Some(path) = &report.evaluation_file {
        info!("Evaluation written to {}", path.display());
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<BenchConfig> {
    let mut config = BenchConfig::load_from_file(&args.config)?;

    if let Some(rounds) = args.rounds {
        config.rounds = rounds;
    }
    if let Some(period) = args.period {
        config.period = period;
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = Some(log_dir.clone());
    }

    // Overrides go through the same checks as the file
    config.validate()?;
    Ok(config)
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}
