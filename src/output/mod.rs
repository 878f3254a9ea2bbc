//! Result aggregation, console echo and persistence

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::scanner::ScanRecord;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Default persistence target, relative to the working directory
pub const RESULT_FILE: &str = "Result.txt";

/// JSON report written alongside the text file
pub const REPORT_FILE: &str = "Result.json";

/// Append-only collection of open-port records.
///
/// Every record is echoed to stdout the moment it arrives; persistence
/// happens once, at engine termination. The internal list is the only
/// mutable state shared across the scan.
pub struct ResultSink {
    records: Mutex<Vec<ScanRecord>>,
    output_path: PathBuf,
    report_path: PathBuf,
}

impl ResultSink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            output_path: PathBuf::from(RESULT_FILE),
            report_path: PathBuf::from(REPORT_FILE),
        }
    }

    /// Redirect persistence, for embedding and tests.
    pub fn with_output_paths(
        mut self,
        output: impl Into<PathBuf>,
        report: impl Into<PathBuf>,
    ) -> Self {
        self.output_path = output.into();
        self.report_path = report.into();
        self
    }

    /// Append one open-port record and echo its line.
    pub fn record(&self, record: ScanRecord) {
        println!("{}", format_record(&record));
        self.records.lock().unwrap().push(record);
    }

    pub fn records(&self) -> Vec<ScanRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append every record to the text file, one line each, and rewrite
    /// the JSON report. In-memory state is untouched either way.
    pub fn persist(&self, config: &ScanConfig) -> crate::Result<()> {
        let records = self.records();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .map_err(ScanError::PersistError)?;
        for record in &records {
            writeln!(file, "{}", format_record(record)).map_err(ScanError::PersistError)?;
        }

        let report = ScanReport {
            config,
            results: &records,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| ScanError::PersistError(io::Error::new(io::ErrorKind::Other, e)))?;
        std::fs::write(&self.report_path, json).map_err(ScanError::PersistError)?;

        log::info!(
            "saved {} results to {}",
            records.len(),
            self.output_path.display()
        );
        Ok(())
    }
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ScanReport<'a> {
    config: &'a ScanConfig,
    results: &'a [ScanRecord],
}

/// Console and file form of one record
pub fn format_record(record: &ScanRecord) -> String {
    if record.banner.is_empty() {
        format!("{}:{}", record.ip, record.port)
    } else {
        format!("{}:{} -> {}", record.ip, record.port, record.banner)
    }
}

/// In-place progress counter, rewritten with `\r`.
///
/// Redraws sparsely so a full 65535-port sweep repaints a few hundred
/// times instead of once per task.
pub struct Progress {
    total: usize,
    completed: AtomicUsize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn tick(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if done == self.total || done % 256 == 0 {
            print!("\rScanned {}/{}", done, self.total);
            let _ = io::stdout().flush();
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        if self.total > 0 {
            println!("\rScanned {}/{}", self.completed(), self.total);
        }
    }
}
