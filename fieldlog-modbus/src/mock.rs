//! In-memory transport for tests and offline runs.
//!
//! Serves reads from bank tables without touching the network, and lets
//! callers inject failures at specific addresses.

use std::collections::{HashMap, HashSet};

use crate::decode::encode;
use crate::register::{BankKind, Encoding, RegisterSet};
use crate::transport::{BankData, Transport, TransportError};

/// A transport backed by in-memory bank tables.
///
/// Reads of unpopulated addresses fail with an `IllegalDataAddress`
/// exception, the way a real device answers for registers it lacks.
#[derive(Debug, Default)]
pub struct MockTransport {
    words: HashMap<(BankKind, u16), u16>,
    bits: HashMap<(BankKind, u16), bool>,
    failing: HashSet<(BankKind, u16)>,
    refuse_open: bool,
    open: bool,
    open_calls: usize,
    close_calls: usize,
    reads: Vec<(BankKind, u16, u16)>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed plausible values for every register in `registers`.
    ///
    /// Word registers read back as 20.0, 21.5, 23.0, ... after scaling,
    /// bit registers read as set.
    pub fn seeded(registers: &RegisterSet) -> Self {
        let mut mock = Self::new();
        for (i, spec) in registers.iter().enumerate() {
            if spec.bank().is_bit() {
                mock = mock.with_bit(spec.bank(), spec.address(), true);
                continue;
            }
            let physical = 20.0 + i as f64 * 1.5;
            let raw = if spec.scale() == 0.0 {
                physical
            } else {
                physical / spec.scale()
            };
            let raw = match spec.encoding() {
                Encoding::Float32 => raw,
                _ => raw.round(),
            };
            mock = mock.with_words(spec.bank(), spec.address(), &encode(raw, spec.encoding()));
        }
        mock
    }

    /// Store one word.
    pub fn with_word(self, bank: BankKind, address: u16, value: u16) -> Self {
        self.with_words(bank, address, &[value])
    }

    /// Store consecutive words starting at `address`.
    pub fn with_words(mut self, bank: BankKind, address: u16, values: &[u16]) -> Self {
        for (offset, value) in values.iter().enumerate() {
            self.words
                .insert((bank, address.wrapping_add(offset as u16)), *value);
        }
        self
    }

    /// Store a big-endian float across two words.
    pub fn with_f32(self, bank: BankKind, address: u16, value: f32) -> Self {
        self.with_words(bank, address, &encode(value as f64, Encoding::Float32))
    }

    pub fn with_bit(mut self, bank: BankKind, address: u16, value: bool) -> Self {
        self.bits.insert((bank, address), value);
        self
    }

    /// Make every read touching `address` fail with a device exception.
    pub fn failing_at(mut self, bank: BankKind, address: u16) -> Self {
        self.failing.insert((bank, address));
        self
    }

    /// Make `open` fail.
    pub fn refusing_connections(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    /// Number of successful and failed `open` calls.
    pub fn open_count(&self) -> usize {
        self.open_calls
    }

    pub fn close_count(&self) -> usize {
        self.close_calls
    }

    /// Every read request received, in order.
    pub fn reads(&self) -> &[(BankKind, u16, u16)] {
        &self.reads
    }

    fn check_failure(&self, bank: BankKind, address: u16) -> Result<(), TransportError> {
        if self.failing.contains(&(bank, address)) {
            return Err(TransportError::Exception("ServerDeviceFailure".to_string()));
        }
        Ok(())
    }
}

fn illegal_address() -> TransportError {
    TransportError::Exception("IllegalDataAddress".to_string())
}

impl Transport for MockTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.open_calls += 1;
        if self.refuse_open {
            return Err(TransportError::Connection("connection refused".to_string()));
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.close_calls += 1;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn read_bank(
        &mut self,
        bank: BankKind,
        address: u16,
        count: u16,
    ) -> Result<BankData, TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        self.reads.push((bank, address, count));

        let addresses = (0..count).map(|offset| address.wrapping_add(offset));

        match bank {
            BankKind::Holding | BankKind::Input => {
                let mut words = Vec::with_capacity(count as usize);
                for addr in addresses {
                    self.check_failure(bank, addr)?;
                    let word = self.words.get(&(bank, addr)).ok_or_else(illegal_address)?;
                    words.push(*word);
                }
                Ok(BankData::Words(words))
            }
            BankKind::Coil | BankKind::Discrete => {
                let mut bits = Vec::with_capacity(count as usize);
                for addr in addresses {
                    self.check_failure(bank, addr)?;
                    let bit = self.bits.get(&(bank, addr)).ok_or_else(illegal_address)?;
                    bits.push(*bit);
                }
                Ok(BankData::Bits(bits))
            }
        }
    }
}
