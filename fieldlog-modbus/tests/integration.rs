//! End-to-end tests: configuration to CSV through the mock device.

use std::fs;

use fieldlog_modbus::config::LoggerConfig;
use fieldlog_modbus::cycle::{log_once, read_cycle};
use fieldlog_modbus::mock::MockTransport;
use fieldlog_modbus::poller::PollEngine;
use fieldlog_modbus::register::{BankKind, Encoding};
use fieldlog_modbus::scanner::{
    BankScan, RawValue, ScanRange, ScanResult, scan, suggested_config,
};
use fieldlog_modbus::sink::{CsvSink, Sink};

const CONFIG: &str = r#"{
    // boiler controller
    device: { connection: { type: "tcp", host: "10.0.0.5" }, unit_id: 3 },
    registers: [
        { address: 0, name: "flow_temp", register_type: "input", data_type: "int16", scale: 0.1, unit: "°C" },
        { address: 10, name: "energy", data_type: "uint32" },
        { address: 20, name: "pressure", data_type: "float32", unit: "bar" },
        { address: 5, name: "pump", register_type: "coil" },
    ],
}"#;

#[tokio::test]
async fn test_config_to_csv() {
    let config = LoggerConfig::parse(CONFIG).unwrap();
    let registers = config.register_set().unwrap();
    assert_eq!(
        registers.get("energy").map(|spec| spec.encoding()),
        Some(Encoding::Uint32)
    );

    let engine = PollEngine::new(registers);
    let mut transport = MockTransport::new()
        .with_word(BankKind::Input, 0, 0xFFE7)
        .with_words(BankKind::Holding, 10, &[0x0001, 0x0000])
        .with_f32(BankKind::Holding, 20, 1.5)
        .with_bit(BankKind::Coil, 5, true);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readings.csv");
    let mut sink = CsvSink::new(&path);
    sink.setup_header(&engine.registers().columns()).unwrap();

    let report = log_once(&mut transport, &engine, &mut sink).await.unwrap();
    assert_eq!(report.successful, 4);
    assert_eq!(report.row, 2);
    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.close_count(), 1);

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines[0], "timestamp,flow_temp,energy,pressure,pump");
    assert!(lines[1].ends_with(",-2.50,65536.00,1.50,1.00"), "{}", lines[1]);
}

#[tokio::test]
async fn test_failed_register_leaves_empty_cell() {
    let config = LoggerConfig::parse(CONFIG).unwrap();
    let engine = PollEngine::new(config.register_set().unwrap());
    let mut transport =
        MockTransport::seeded(engine.registers()).failing_at(BankKind::Holding, 10);

    let dir = tempfile::tempdir().unwrap();
    let mut sink = CsvSink::new(dir.path().join("readings.csv"));

    let report = log_once(&mut transport, &engine, &mut sink).await.unwrap();
    assert_eq!(report.successful, 3);
    assert_eq!(report.total, 4);
    assert_eq!(report.row, 1);

    let content = fs::read_to_string(sink.path()).unwrap();
    let cells: Vec<_> = content.trim_end().split(',').collect();
    assert_eq!(cells.len(), 5);
    assert_eq!(cells[2], "");
}

#[tokio::test]
async fn test_scan_suggestion_loads_as_config() {
    let mut transport = MockTransport::new()
        .with_word(BankKind::Holding, 3, 215)
        .with_word(BankKind::Holding, 7, 65526);

    let range = ScanRange::new(0, 10).unwrap();
    let results = scan(&mut transport, BankKind::Holding, range).await.unwrap();
    assert_eq!(
        results,
        vec![
            ScanResult {
                address: 3,
                value: RawValue::Word(215)
            },
            ScanResult {
                address: 7,
                value: RawValue::Word(65526)
            },
        ]
    );

    let json = suggested_config(&[BankScan {
        bank: BankKind::Holding,
        results,
    }])
    .unwrap();

    let config = LoggerConfig::parse(&json).unwrap();
    let registers = config.register_set().unwrap();
    assert_eq!(registers.columns(), vec!["reg_3", "reg_7"]);

    // the suggested registers decode the scanned words as tenths
    let engine = PollEngine::new(registers);
    let result = read_cycle(&mut transport, &engine).await.unwrap();
    assert!((result.get("reg_3").unwrap() - 21.5).abs() < 1e-9);
    assert!((result.get("reg_7").unwrap() + 1.0).abs() < 1e-9);
    assert_eq!(transport.close_count(), 2);
}
