//! Tabular output of poll results.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::poller::PollResult;

/// Timestamp layout of the first column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header of the first column.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Destination for one row per poll cycle.
pub trait Sink {
    /// Write (or replace) the header row.
    fn setup_header(&mut self, columns: &[String]) -> Result<(), SinkError>;

    /// Append a row and return its 1-based row index.
    fn write_row(&mut self, values: &PollResult, columns: &[String]) -> Result<usize, SinkError>;
}

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Header cells: the timestamp column followed by `columns`.
pub fn header_cells(columns: &[String]) -> Vec<String> {
    std::iter::once(TIMESTAMP_COLUMN.to_string())
        .chain(columns.iter().cloned())
        .collect()
}

/// Row cells: `timestamp`, then one cell per column.
///
/// Values use two decimals; failed or missing values are empty.
pub fn row_cells(timestamp: &str, values: &PollResult, columns: &[String]) -> Vec<String> {
    std::iter::once(timestamp.to_string())
        .chain(columns.iter().map(|name| match values.get(name) {
            Some(value) => format!("{:.2}", value),
            None => String::new(),
        }))
        .collect()
}

/// Escape a string for CSV (handle commas and quotes).
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn csv_line(cells: &[String]) -> String {
    cells
        .iter()
        .map(|cell| escape_csv(cell))
        .collect::<Vec<_>>()
        .join(",")
}

/// Appends rows to a CSV file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Existing file content, empty if the file does not exist yet.
    fn read_existing(&self) -> Result<String, SinkError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn append_line(&self, line: &str) -> Result<(), SinkError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{}", line).map_err(|e| self.io_error(e))
    }
}

impl Sink for CsvSink {
    fn setup_header(&mut self, columns: &[String]) -> Result<(), SinkError> {
        let header = csv_line(&header_cells(columns));
        let existing = self.read_existing()?;

        let mut content = format!("{}\n", header);
        if let Some((_, rest)) = existing.split_once('\n') {
            content.push_str(rest);
        }

        fs::write(&self.path, content).map_err(|e| self.io_error(e))?;
        debug!("Wrote header to {}", self.path.display());
        Ok(())
    }

    fn write_row(&mut self, values: &PollResult, columns: &[String]) -> Result<usize, SinkError> {
        let row = self.read_existing()?.lines().count() + 1;
        let line = csv_line(&row_cells(&timestamp_now(), values, columns));
        self.append_line(&line)?;

        debug!("Wrote row {} to {}", row, self.path.display());
        Ok(row)
    }
}

/// Keeps rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for MemorySink {
    fn setup_header(&mut self, columns: &[String]) -> Result<(), SinkError> {
        self.header = Some(header_cells(columns));
        Ok(())
    }

    fn write_row(&mut self, values: &PollResult, columns: &[String]) -> Result<usize, SinkError> {
        self.rows.push(row_cells(&timestamp_now(), values, columns));
        Ok(self.rows.len() + usize::from(self.header.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::RegisterFault;
    use crate::transport::TransportError;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn sample() -> PollResult {
        let mut result = PollResult::default();
        result.push("temp_1", Ok(21.456));
        result.push(
            "temp_2",
            Err(RegisterFault::Read(TransportError::Exception(
                "IllegalDataAddress".to_string(),
            ))),
        );
        result.push("pump", Ok(1.0));
        result
    }

    #[test]
    fn test_row_cells() {
        let cells = row_cells(
            "2024-01-01 12:00:00",
            &sample(),
            &columns(&["temp_1", "temp_2", "pump", "unknown"]),
        );
        assert_eq!(
            cells,
            vec!["2024-01-01 12:00:00", "21.46", "", "1.00", ""]
        );
    }

    #[test]
    fn test_row_follows_column_order() {
        let cells = row_cells("t", &sample(), &columns(&["pump", "temp_1"]));
        assert_eq!(cells, vec!["t", "1.00", "21.46"]);
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp_now();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_csv_rows_are_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path().join("readings.csv"));
        let cols = columns(&["temp_1", "temp_2"]);

        sink.setup_header(&cols).unwrap();
        assert_eq!(sink.write_row(&sample(), &cols).unwrap(), 2);
        assert_eq!(sink.write_row(&sample(), &cols).unwrap(), 3);

        let content = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,temp_1,temp_2");
        assert!(lines[1].ends_with(",21.46,"));
    }

    #[test]
    fn test_csv_without_header_starts_at_row_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path().join("readings.csv"));

        assert_eq!(sink.write_row(&sample(), &columns(&["pump"])).unwrap(), 1);
    }

    #[test]
    fn test_setup_header_replaces_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        fs::write(&path, "timestamp,old\n2024-01-01 00:00:00,1.00\n").unwrap();

        let mut sink = CsvSink::new(&path);
        sink.setup_header(&columns(&["new"])).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "timestamp,new\n2024-01-01 00:00:00,1.00\n");
    }

    #[test]
    fn test_memory_sink_counts_header() {
        let mut sink = MemorySink::new();
        let cols = columns(&["temp_1"]);

        assert_eq!(sink.write_row(&sample(), &cols).unwrap(), 1);
        sink.setup_header(&cols).unwrap();
        assert_eq!(sink.write_row(&sample(), &cols).unwrap(), 3);
        assert_eq!(
            sink.header,
            Some(vec!["timestamp".to_string(), "temp_1".to_string()])
        );
    }
}
