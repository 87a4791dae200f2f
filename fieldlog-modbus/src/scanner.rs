//! Register discovery.
//!
//! Probes every address of a bank with single-word (or single-bit) reads
//! and keeps the ones that answer. Most addresses of an unknown map are
//! absent, so failed reads are expected and skipped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::register::BankKind;
use crate::transport::{BankData, Session, Transport, TransportError};

/// Highest exclusive end address of a bank.
pub const ADDRESS_SPACE_END: u32 = 1 << 16;

/// Error type for scan operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("Connection failed: {0}")]
    Connection(#[source] TransportError),
    #[error("Invalid scan range {start}-{end}: start must not exceed end, end at most 65536")]
    InvalidRange { start: u32, end: u32 },
}

/// Half-open address range `[start, end)`, possibly empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanRange {
    start: u32,
    end: u32,
}

impl ScanRange {
    pub fn new(start: u32, end: u32) -> Result<Self, ScanError> {
        if start > end || end > ADDRESS_SPACE_END {
            return Err(ScanError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn addresses(&self) -> impl Iterator<Item = u16> {
        // bounded by ADDRESS_SPACE_END in new()
        (self.start..self.end).map(|address| address as u16)
    }
}

/// Raw answer from one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Word(u16),
    Bit(bool),
}

/// One address that answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub address: u16,
    pub value: RawValue,
}

/// Results of scanning one bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankScan {
    pub bank: BankKind,
    pub results: Vec<ScanResult>,
}

/// Scan `range` of `bank` in a single session.
///
/// Opens the transport first and closes it on every exit path. Addresses
/// that fail to read are omitted.
pub async fn scan<T: Transport>(
    transport: &mut T,
    bank: BankKind,
    range: ScanRange,
) -> Result<Vec<ScanResult>, ScanError> {
    let mut session = Session::open(transport)
        .await
        .map_err(ScanError::Connection)?;

    info!(
        "Scanning {} registers {}-{}",
        bank,
        range.start(),
        range.end()
    );

    let mut found = Vec::new();
    for address in range.addresses() {
        match session.read_bank(bank, address, 1).await {
            Ok(data) => match first_value(data) {
                Some(value) => found.push(ScanResult { address, value }),
                None => debug!("{} @ {}: empty response", bank, address),
            },
            Err(e) => debug!("{} @ {}: {}", bank, address, e),
        }
    }

    info!("Found {} {} registers", found.len(), bank);
    Ok(found)
}

/// Scan several banks, one session each.
///
/// Stops at the first connection failure.
pub async fn scan_banks<T: Transport>(
    transport: &mut T,
    banks: &[BankKind],
    range: ScanRange,
) -> Result<Vec<BankScan>, ScanError> {
    let mut scans = Vec::with_capacity(banks.len());
    for &bank in banks {
        let results = scan(transport, bank, range).await?;
        scans.push(BankScan { bank, results });
    }
    Ok(scans)
}

fn first_value(data: BankData) -> Option<RawValue> {
    match data {
        BankData::Words(words) => words.first().copied().map(RawValue::Word),
        BankData::Bits(bits) => bits.first().copied().map(RawValue::Bit),
    }
}

/// A plausible reading of a raw word, for display only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpretation {
    Unsigned(u16),
    Signed(i16),
    /// Degrees Celsius at a ÷10 scale.
    Temperature(f64),
    /// Percent at a ÷10 scale.
    Percentage(f64),
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpretation::Unsigned(v) => write!(f, "uint16: {}", v),
            Interpretation::Signed(v) => write!(f, "int16: {}", v),
            Interpretation::Temperature(v) => write!(f, "temp(÷10): {:.1}°C", v),
            Interpretation::Percentage(v) => write!(f, "pct(÷10): {:.1}%", v),
        }
    }
}

/// Candidate readings of a raw word.
///
/// The temperature bounds are exclusive (-50..150 °C) while the percentage
/// bounds are inclusive (0..=1000 raw).
pub fn interpret(raw: u16) -> Vec<Interpretation> {
    let mut candidates = vec![Interpretation::Unsigned(raw)];

    let signed = raw as i16;
    if signed as i32 != raw as i32 {
        candidates.push(Interpretation::Signed(signed));
    }

    let temp = raw as f64 / 10.0;
    if -50.0 < temp && temp < 150.0 {
        candidates.push(Interpretation::Temperature(temp));
    }

    if raw <= 1000 {
        candidates.push(Interpretation::Percentage(raw as f64 / 10.0));
    }

    candidates
}

/// Candidates joined for a single console line.
pub fn describe(raw: u16) -> String {
    interpret(raw)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Console line for one found address.
pub fn format_result(result: &ScanResult) -> String {
    match result.value {
        RawValue::Word(raw) => format!(
            "  [{:5}] Raw: {:5} (0x{:04X}) | {}",
            result.address,
            raw,
            raw,
            describe(raw)
        ),
        RawValue::Bit(bit) => format!("  [{:5}] {}", result.address, bit),
    }
}

/// A register entry guessed from a scan.
///
/// Uses the same field names as the logger's register configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedRegister {
    pub address: u16,
    pub name: String,
    pub description: String,
    pub register_type: BankKind,
    pub data_type: String,
    pub scale: f64,
    pub unit: String,
}

impl SuggestedRegister {
    /// Default guess: a signed temperature-like value in tenths.
    pub fn guess(bank: BankKind, address: u16) -> Self {
        Self {
            address,
            name: format!("reg_{}", address),
            description: format!("Register {}", address),
            register_type: bank,
            data_type: "int16".to_string(),
            scale: 0.1,
            unit: String::new(),
        }
    }
}

/// One suggested entry per found address, banks in scan order.
pub fn suggest_registers(scans: &[BankScan]) -> Vec<SuggestedRegister> {
    scans
        .iter()
        .flat_map(|scan| {
            scan.results
                .iter()
                .map(move |result| SuggestedRegister::guess(scan.bank, result.address))
        })
        .collect()
}

#[derive(Serialize)]
struct SuggestedConfig<'a> {
    registers: &'a [SuggestedRegister],
}

/// A `{"registers": [...]}` document the logger can load directly.
pub fn suggested_config(scans: &[BankScan]) -> serde_json::Result<String> {
    let registers = suggest_registers(scans);
    serde_json::to_string_pretty(&SuggestedConfig {
        registers: &registers,
    })
}

/// Persisted scan output.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub scan_range: ScanRange,
    pub results: BTreeMap<BankKind, Vec<ScanResult>>,
}

impl ScanReport {
    pub fn new(host: &str, port: u16, unit_id: u8, range: ScanRange, scans: &[BankScan]) -> Self {
        Self {
            host: host.to_string(),
            port,
            unit_id,
            scan_range: range,
            results: scans
                .iter()
                .map(|scan| (scan.bank, scan.results.clone()))
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn range(start: u32, end: u32) -> ScanRange {
        ScanRange::new(start, end).unwrap()
    }

    #[tokio::test]
    async fn test_scan_keeps_responding_addresses() {
        let mut transport = MockTransport::new()
            .with_word(BankKind::Holding, 0, 100)
            .with_word(BankKind::Holding, 5, 105)
            .with_word(BankKind::Holding, 10, 110);

        let found = scan(&mut transport, BankKind::Holding, range(0, 15))
            .await
            .unwrap();

        assert_eq!(
            found,
            vec![
                ScanResult { address: 0, value: RawValue::Word(100) },
                ScanResult { address: 5, value: RawValue::Word(105) },
                ScanResult { address: 10, value: RawValue::Word(110) },
            ]
        );
        assert_eq!(transport.reads().len(), 15);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_all_reads_failing() {
        let mut transport = MockTransport::new();

        let found = scan(&mut transport, BankKind::Input, range(0, 10))
            .await
            .unwrap();

        assert!(found.is_empty());
        assert_eq!(transport.reads().len(), 10);
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.close_count(), 1);
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_scan_coils() {
        let mut transport = MockTransport::new()
            .with_bit(BankKind::Coil, 0, true)
            .with_bit(BankKind::Coil, 1, false);

        let found = scan(&mut transport, BankKind::Coil, range(0, 2))
            .await
            .unwrap();

        assert_eq!(found[0].value, RawValue::Bit(true));
        assert_eq!(found[1].value, RawValue::Bit(false));
    }

    #[tokio::test]
    async fn test_scan_connection_failure() {
        let mut transport = MockTransport::new().refusing_connections();

        let result = scan(&mut transport, BankKind::Holding, range(0, 10)).await;

        assert!(matches!(result, Err(ScanError::Connection(_))));
        assert!(transport.reads().is_empty());
        assert_eq!(transport.close_count(), 0);
    }

    #[tokio::test]
    async fn test_scan_empty_range() {
        let mut transport = MockTransport::new().with_word(BankKind::Holding, 10, 1);

        let found = scan(&mut transport, BankKind::Holding, range(10, 10))
            .await
            .unwrap();

        assert!(found.is_empty());
        assert!(transport.reads().is_empty());
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_banks_uses_one_session_per_bank() {
        let mut transport = MockTransport::new()
            .with_word(BankKind::Input, 2, 250)
            .with_bit(BankKind::Discrete, 1, true);

        let scans = scan_banks(&mut transport, &BankKind::ALL, range(0, 4))
            .await
            .unwrap();

        assert_eq!(scans.len(), 4);
        assert!(scans[0].results.is_empty());
        assert_eq!(scans[1].results.len(), 1);
        assert_eq!(scans[3].bank, BankKind::Discrete);
        assert_eq!(transport.open_count(), 4);
        assert_eq!(transport.close_count(), 4);
    }

    #[test]
    fn test_scan_range_validation() {
        assert!(ScanRange::new(0, 100).is_ok());
        assert!(ScanRange::new(0, 65536).is_ok());
        assert!(ScanRange::new(65536, 65536).is_ok());
        assert!(ScanRange::new(20, 10).is_err());
        assert_eq!(
            ScanRange::new(0, 65537),
            Err(ScanError::InvalidRange { start: 0, end: 65537 })
        );
        assert_eq!(range(65530, 65536).addresses().last(), Some(65535));
    }

    #[test]
    fn test_interpret_temperature_and_percentage() {
        let candidates = interpret(250);
        assert_eq!(
            candidates,
            vec![
                Interpretation::Unsigned(250),
                Interpretation::Temperature(25.0),
                Interpretation::Percentage(25.0),
            ]
        );
    }

    #[test]
    fn test_interpret_temperature_bound_is_exclusive() {
        assert!(!interpret(2000)
            .iter()
            .any(|c| matches!(c, Interpretation::Temperature(_))));
        assert!(!interpret(1500)
            .iter()
            .any(|c| matches!(c, Interpretation::Temperature(_))));
        assert!(interpret(1499).contains(&Interpretation::Temperature(149.9)));
    }

    #[test]
    fn test_interpret_percentage_bound_is_inclusive() {
        assert!(!interpret(1001)
            .iter()
            .any(|c| matches!(c, Interpretation::Percentage(_))));

        let at_limit: Vec<_> = interpret(1000)
            .into_iter()
            .filter(|c| matches!(c, Interpretation::Percentage(_)))
            .collect();
        assert_eq!(at_limit, vec![Interpretation::Percentage(100.0)]);
    }

    #[test]
    fn test_interpret_signed() {
        let candidates = interpret(65526);
        assert_eq!(
            candidates,
            vec![Interpretation::Unsigned(65526), Interpretation::Signed(-10)]
        );

        assert!(!interpret(100)
            .iter()
            .any(|c| matches!(c, Interpretation::Signed(_))));
    }

    #[test]
    fn test_interpret_zero() {
        assert_eq!(
            interpret(0),
            vec![
                Interpretation::Unsigned(0),
                Interpretation::Temperature(0.0),
                Interpretation::Percentage(0.0),
            ]
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            describe(250),
            "uint16: 250 | temp(÷10): 25.0°C | pct(÷10): 25.0%"
        );
        assert_eq!(describe(65526), "uint16: 65526 | int16: -10");
    }

    #[test]
    fn test_format_result() {
        let word = ScanResult {
            address: 7,
            value: RawValue::Word(255),
        };
        assert_eq!(
            format_result(&word),
            "  [    7] Raw:   255 (0x00FF) | uint16: 255 | temp(÷10): 25.5°C | pct(÷10): 25.5%"
        );

        let bit = ScanResult {
            address: 12,
            value: RawValue::Bit(true),
        };
        assert_eq!(format_result(&bit), "  [   12] true");
    }

    #[test]
    fn test_suggested_config() {
        let scans = vec![
            BankScan {
                bank: BankKind::Holding,
                results: vec![ScanResult {
                    address: 3,
                    value: RawValue::Word(215),
                }],
            },
            BankScan {
                bank: BankKind::Coil,
                results: vec![ScanResult {
                    address: 8,
                    value: RawValue::Bit(true),
                }],
            },
        ];

        let suggested = suggest_registers(&scans);
        assert_eq!(suggested.len(), 2);
        assert_eq!(suggested[0].name, "reg_3");
        assert_eq!(suggested[0].description, "Register 3");
        assert_eq!(suggested[0].data_type, "int16");
        assert_eq!(suggested[0].scale, 0.1);
        assert_eq!(suggested[1].register_type, BankKind::Coil);

        let json = suggested_config(&scans).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["registers"][0]["register_type"], "holding");
        assert_eq!(value["registers"][1]["address"], 8);
        assert_eq!(value["registers"][1]["unit"], "");
    }

    #[test]
    fn test_scan_report_json() {
        let scans = vec![
            BankScan {
                bank: BankKind::Input,
                results: vec![ScanResult {
                    address: 1,
                    value: RawValue::Word(42),
                }],
            },
            BankScan {
                bank: BankKind::Discrete,
                results: vec![ScanResult {
                    address: 2,
                    value: RawValue::Bit(false),
                }],
            },
        ];
        let report = ScanReport::new("10.0.0.5", 502, 1, range(0, 100), &scans);

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["host"], "10.0.0.5");
        assert_eq!(value["scan_range"]["start"], 0);
        assert_eq!(value["scan_range"]["end"], 100);
        assert_eq!(value["results"]["input"][0]["value"], 42);
        assert_eq!(value["results"]["discrete"][0]["value"], false);
    }
}
