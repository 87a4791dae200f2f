//! Modbus register logger.
//!
//! Polls the configured registers and appends one CSV row per cycle,
//! either once or on a fixed interval.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use fieldlog_common::LogArgs;
use fieldlog_modbus::config::LoggerConfig;
use fieldlog_modbus::cycle::{format_values, log_once, read_cycle, run_interval};
use fieldlog_modbus::mock::MockTransport;
use fieldlog_modbus::modbus::ModbusTransport;
use fieldlog_modbus::poller::PollEngine;
use fieldlog_modbus::sink::{CsvSink, Sink};
use fieldlog_modbus::transport::Transport;

/// Modbus register logger (TCP/RTU to CSV).
#[derive(Parser, Debug)]
#[command(name = "fieldlog")]
#[command(about = "Polls Modbus registers and appends the readings to a CSV file")]
#[command(version)]
struct Args {
    /// Path to register configuration file (JSON or JSON5)
    #[arg(short, long, default_value = "registers.json")]
    config: PathBuf,

    /// Seconds between cycles (0 = read once)
    #[arg(short, long, default_value_t = 0)]
    interval: u64,

    /// Poll and print values without writing to the sink
    #[arg(long)]
    dry_run: bool,

    /// Write the header row before logging
    #[arg(long)]
    setup_header: bool,

    /// Use an in-memory device with plausible values (implies --dry-run)
    #[arg(long)]
    mock: bool,

    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = if args.config.exists() {
        LoggerConfig::load_from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else if args.mock {
        LoggerConfig::default()
    } else {
        eprintln!("Config file not found: {}", args.config.display());
        eprintln!("Run fieldlog-scan first to discover registers, then save its suggested");
        eprintln!("configuration to {}", args.config.display());
        return Ok(ExitCode::FAILURE);
    };

    fieldlog_common::init_tracing(&args.log.resolve(&config.logging))
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting fieldlog");
    let registers = config
        .register_set()
        .context("Invalid register configuration")?;
    info!("Loaded {} register(s)", registers.len());
    let engine = PollEngine::new(registers);

    if args.mock {
        info!("Using mock device");
        let mut transport = MockTransport::seeded(engine.registers());
        return dry_run(&mut transport, &engine).await;
    }

    let mut transport = ModbusTransport::new(config.device.clone());
    info!("Device: {}", config.device.connection);

    if args.dry_run {
        return dry_run(&mut transport, &engine).await;
    }

    let mut sink = CsvSink::new(&config.sink.path);
    info!("Writing to {}", sink.path().display());

    if args.setup_header {
        sink.setup_header(&engine.registers().columns())
            .context("Failed to write header")?;
        info!("Header written");
    }

    if args.interval == 0 {
        return match log_once(&mut transport, &engine, &mut sink).await {
            Ok(report) => {
                info!(
                    "Logged {}/{} values to row {}",
                    report.successful, report.total, report.row
                );
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                error!("Logging failed: {}", e);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    run_interval(
        &mut transport,
        &engine,
        &mut sink,
        Duration::from_secs(args.interval),
        shutdown_rx,
    )
    .await;

    Ok(ExitCode::SUCCESS)
}

/// Poll once and print the values to stdout.
async fn dry_run<T: Transport>(transport: &mut T, engine: &PollEngine) -> Result<ExitCode> {
    match read_cycle(transport, engine).await {
        Ok(result) => {
            println!(
                "Read {}/{} registers:",
                result.successful(),
                result.len()
            );
            for line in format_values(engine.registers(), &result) {
                println!("{}", line);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Read failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn wait_for_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
