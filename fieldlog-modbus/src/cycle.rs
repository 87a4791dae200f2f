//! Logging cycles: poll a device and append the readings to a sink.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::poller::{PollEngine, PollError, PollResult};
use crate::register::RegisterSet;
use crate::sink::{Sink, SinkError};
use crate::transport::{Session, Transport, TransportError};

/// Error type for a logging cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Connection error: {0}")]
    Connection(#[source] TransportError),
    #[error("Poll error: {0}")]
    Poll(#[from] PollError),
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Registers that produced a value.
    pub successful: usize,
    pub total: usize,
    /// Row index returned by the sink.
    pub row: usize,
}

/// Open a session, poll every register, and release the session.
///
/// The session is released before this returns, whatever the outcome.
pub async fn read_cycle<T: Transport>(
    transport: &mut T,
    engine: &PollEngine,
) -> Result<PollResult, CycleError> {
    let mut session = Session::open(transport)
        .await
        .map_err(CycleError::Connection)?;
    let result = engine.poll_all(&mut *session).await?;
    Ok(result)
}

/// Console lines for a poll result: `name: value unit` or `<read failed>`.
pub fn format_values(registers: &RegisterSet, result: &PollResult) -> Vec<String> {
    result
        .values()
        .map(|(name, value)| {
            let unit = registers.get(name).map(|spec| spec.unit()).unwrap_or("");
            match value {
                Some(value) => format!("  {}: {:.2} {}", name, value, unit)
                    .trim_end()
                    .to_string(),
                None => format!("  {}: <read failed>", name),
            }
        })
        .collect()
}

/// Poll once and write one row.
///
/// A connection failure aborts the cycle before any read, and nothing is
/// written.
pub async fn log_once<T: Transport, S: Sink>(
    transport: &mut T,
    engine: &PollEngine,
    sink: &mut S,
) -> Result<CycleReport, CycleError> {
    debug!("Reading registers...");
    let result = read_cycle(transport, engine).await?;

    let successful = result.successful();
    let total = result.len();
    info!("Got {}/{} values", successful, total);
    for line in format_values(engine.registers(), &result) {
        info!("{}", line.trim_start());
    }

    let columns = engine.registers().columns();
    let row = sink.write_row(&result, &columns)?;
    info!("Wrote row {}", row);

    Ok(CycleReport {
        successful,
        total,
        row,
    })
}

/// Run [`log_once`] every `interval` until `shutdown` turns true.
///
/// Cycle errors are logged and the loop keeps going. A shutdown request
/// interrupts the wait between cycles. A channel whose senders are all
/// dropped never stops the loop. Returns the number of cycles run.
pub async fn run_interval<T: Transport, S: Sink>(
    transport: &mut T,
    engine: &PollEngine,
    sink: &mut S,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    info!("Starting continuous logging (interval: {:?})", interval);
    let mut cycles = 0;

    while !*shutdown.borrow() {
        if let Err(e) = log_once(transport, engine, sink).await {
            error!("Logging cycle failed: {}", e);
        }
        cycles += 1;

        let sleep = tokio::time::sleep(interval);
        tokio::pin!(sleep);

        tokio::select! {
            _ = &mut sleep => {}
            stopped = shutdown.wait_for(|stop| *stop) => match stopped {
                Ok(_) => break,
                // no sender left, so no stop request can arrive
                Err(_) => sleep.await,
            },
        }
    }

    info!("Logger stopped after {} cycle(s)", cycles);
    cycles
}
