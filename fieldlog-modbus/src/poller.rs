//! Register polling.
//!
//! A poll reads every register of a [`RegisterSet`] in declaration order,
//! one request at a time. A failing register is recorded and skipped; only
//! a missing connection stops the poll before it starts.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::decode::{DecodeError, decode};
use crate::register::{BankKind, RegisterSet, RegisterSpec};
use crate::transport::{BankData, Transport, TransportError};

/// Error type for polling operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("Transport is not connected")]
    NotConnected,
}

/// Why a single register has no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterFault {
    #[error("read failed: {0}")]
    Read(#[from] TransportError),
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Outcome for one register of a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollEntry {
    pub name: String,
    pub outcome: Result<f64, RegisterFault>,
}

impl PollEntry {
    pub fn value(&self) -> Option<f64> {
        self.outcome.as_ref().ok().copied()
    }
}

/// Values of one poll cycle, in register declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollResult {
    entries: Vec<PollEntry>,
}

impl PollResult {
    pub fn push(&mut self, name: impl Into<String>, outcome: Result<f64, RegisterFault>) {
        self.entries.push(PollEntry {
            name: name.into(),
            outcome,
        });
    }

    /// Value for `name`, or `None` if it failed or was not polled.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entry(name).and_then(PollEntry::value)
    }

    /// Fault recorded for `name`, if any.
    pub fn fault(&self, name: &str) -> Option<&RegisterFault> {
        self.entry(name).and_then(|entry| entry.outcome.as_ref().err())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn entries(&self) -> &[PollEntry] {
        &self.entries
    }

    /// `(name, value)` pairs in declaration order.
    pub fn values(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.value()))
    }

    /// Number of registers that produced a value.
    pub fn successful(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_map(&self) -> HashMap<String, Option<f64>> {
        self.entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.value()))
            .collect()
    }

    fn entry(&self, name: &str) -> Option<&PollEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

/// Reads and decodes the registers of one device.
#[derive(Debug, Clone)]
pub struct PollEngine {
    registers: RegisterSet,
}

impl PollEngine {
    pub fn new(registers: RegisterSet) -> Self {
        Self { registers }
    }

    pub fn registers(&self) -> &RegisterSet {
        &self.registers
    }

    /// Poll every register in declaration order.
    ///
    /// Per-register faults end up in the result. The transport must be open.
    pub async fn poll_all<T: Transport>(&self, transport: &mut T) -> Result<PollResult, PollError> {
        if !transport.is_open() {
            return Err(PollError::NotConnected);
        }

        let mut result = PollResult::default();
        for spec in &self.registers {
            let outcome = read_register(transport, spec).await;
            result.push(spec.name(), outcome);
        }

        debug!(
            "Polled {}/{} registers",
            result.successful(),
            result.len()
        );
        Ok(result)
    }

    /// Poll a single register by name.
    ///
    /// Returns `Ok(None)` for unknown names and failed reads alike.
    pub async fn poll_one<T: Transport>(
        &self,
        transport: &mut T,
        name: &str,
    ) -> Result<Option<f64>, PollError> {
        if !transport.is_open() {
            return Err(PollError::NotConnected);
        }

        let Some(spec) = self.registers.get(name) else {
            debug!("No register named '{}'", name);
            return Ok(None);
        };

        Ok(read_register(transport, spec).await.ok())
    }
}

/// Read one register and apply its scale.
async fn read_register<T: Transport>(
    transport: &mut T,
    spec: &RegisterSpec,
) -> Result<f64, RegisterFault> {
    let outcome = read_and_decode(transport, spec).await;

    match &outcome {
        Ok(value) => debug!("{} = {}", spec.name(), value),
        Err(RegisterFault::Read(e)) => warn!(
            register = %spec.name(),
            bank = %spec.bank(),
            address = spec.address(),
            "Failed to read register: {}",
            e
        ),
        Err(RegisterFault::Decode(e)) => warn!(
            register = %spec.name(),
            bank = %spec.bank(),
            address = spec.address(),
            "Failed to decode register: {}",
            e
        ),
    }

    outcome
}

async fn read_and_decode<T: Transport>(
    transport: &mut T,
    spec: &RegisterSpec,
) -> Result<f64, RegisterFault> {
    let data = transport
        .read_bank(spec.bank(), spec.address(), spec.word_count())
        .await?;

    match spec.bank() {
        BankKind::Coil | BankKind::Discrete => match data {
            BankData::Bits(bits) => match bits.first() {
                Some(true) => Ok(1.0),
                Some(false) => Ok(0.0),
                None => Err(unexpected("empty bit response").into()),
            },
            BankData::Words(_) => Err(unexpected("words returned for a bit bank").into()),
        },
        BankKind::Holding | BankKind::Input => match data {
            BankData::Words(words) => Ok(decode(&words, spec.encoding())? * spec.scale()),
            BankData::Bits(_) => Err(unexpected("bits returned for a word bank").into()),
        },
    }
}

fn unexpected(message: &str) -> TransportError {
    TransportError::UnexpectedResponse(message.to_string())
}
