//! Modbus register scanner.
//!
//! Probes an address range and prints each address that answers, with
//! candidate interpretations and a register configuration to start from.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use fieldlog_common::{LogArgs, LoggingConfig};
use fieldlog_modbus::config::{ConnectionConfig, DeviceConfig};
use fieldlog_modbus::modbus::ModbusTransport;
use fieldlog_modbus::register::BankKind;
use fieldlog_modbus::scanner::{
    BankScan, ScanRange, ScanReport, format_result, scan_banks, suggested_config,
};

/// Modbus register scanner.
#[derive(Parser, Debug)]
#[command(name = "fieldlog-scan")]
#[command(about = "Scans a Modbus device for responding registers")]
#[command(version)]
struct Args {
    /// Device host name or IP address
    host: String,

    /// Modbus TCP port
    #[arg(short, long, default_value_t = 502)]
    port: u16,

    /// Modbus unit/slave ID
    #[arg(short, long, default_value_t = 1)]
    unit: u8,

    /// First address to probe
    #[arg(long, default_value_t = 0)]
    start: u32,

    /// Address to stop before
    #[arg(long, default_value_t = 100)]
    end: u32,

    /// Bank to scan (holding, input, coil, discrete)
    #[arg(long = "type", default_value = "holding")]
    bank: BankKind,

    /// Scan all four banks
    #[arg(long)]
    all_types: bool,

    /// Connect and request timeout in seconds
    #[arg(short, long, default_value_t = 5.0)]
    timeout: f64,

    /// Write the results as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    fieldlog_common::init_tracing(&args.log.resolve(&LoggingConfig::default()))
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    let range = ScanRange::new(args.start, args.end)?;
    if !(args.timeout.is_finite() && args.timeout > 0.0) {
        bail!("--timeout must be a positive number of seconds");
    }

    let banks: Vec<BankKind> = if args.all_types {
        BankKind::ALL.to_vec()
    } else {
        vec![args.bank]
    };

    let device = DeviceConfig {
        connection: ConnectionConfig::Tcp {
            host: args.host.clone(),
            port: args.port,
        },
        unit_id: args.unit,
        timeout_ms: ((args.timeout * 1000.0) as u64).max(1),
    };
    info!(
        "Scanning {} (unit {}), addresses {}-{}",
        device.connection,
        device.unit_id,
        range.start(),
        range.end()
    );

    let mut transport = ModbusTransport::new(device);
    let scans = match scan_banks(&mut transport, &banks, range).await {
        Ok(scans) => scans,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    for scan in &scans {
        print_bank(scan);
    }

    if let Some(path) = &args.output {
        let report = ScanReport::new(&args.host, args.port, args.unit, range, &scans);
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write {:?}", path))?;
        println!("\nResults saved to {}", path.display());
    }

    if scans.iter().any(|scan| !scan.results.is_empty()) {
        println!("\n{}", "=".repeat(60));
        println!("SUGGESTED CONFIGURATION (save as registers.json):");
        println!("{}", "=".repeat(60));
        println!("{}", suggested_config(&scans)?);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_bank(scan: &BankScan) {
    if scan.results.is_empty() {
        println!("\nNo {} registers found in range", scan.bank);
        return;
    }

    println!("\nFound {} {} registers:", scan.results.len(), scan.bank);
    for result in &scan.results {
        println!("{}", format_result(result));
    }
}
