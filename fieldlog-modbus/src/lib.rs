//! Modbus register logger.
//!
//! Polls registers of one Modbus device (TCP or RTU/serial), decodes the
//! raw words into physical values, and appends them to a CSV file. A
//! scanner probes address ranges to discover an undocumented register map.
//!
//! # Data flow
//!
//! ```text
//! cycle::log_once -> PollEngine::poll_all -> decode() per register -> Sink::write_row
//! scanner::scan   -> ScanResult list -> interpret() / suggested_config()
//! ```

pub mod config;
pub mod cycle;
pub mod decode;
pub mod mock;
pub mod modbus;
pub mod poller;
pub mod register;
pub mod scanner;
pub mod sink;
pub mod transport;

pub use config::{ConfigError, ConnectionConfig, DeviceConfig, LoggerConfig, RegisterRecord};
pub use cycle::{CycleError, CycleReport, log_once, read_cycle, run_interval};
pub use decode::{DecodeError, decode};
pub use mock::MockTransport;
pub use modbus::ModbusTransport;
pub use poller::{PollEngine, PollError, PollResult, RegisterFault};
pub use register::{BankKind, Encoding, RegisterSet, RegisterSpec};
pub use scanner::{ScanError, ScanRange, ScanResult, interpret, scan};
pub use sink::{CsvSink, MemorySink, Sink, SinkError};
pub use transport::{BankData, Session, Transport, TransportError};
