//! Time-stamped record of lab scans with CSV export.

use crate::error::LabResult;
use crate::instrument::{Lab, Scan};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Column names in export order.
pub const COLUMNS: [&str; 5] = ["Time", "T1", "T2", "Q1", "Q2"];

/// One historian row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Record {
    /// Lab time in seconds
    #[serde(rename = "Time")]
    pub time: f64,
    /// Temperature of sensor 1
    #[serde(rename = "T1")]
    pub t1: f64,
    /// Temperature of sensor 2
    #[serde(rename = "T2")]
    pub t2: f64,
    /// Heater 1 output
    #[serde(rename = "Q1")]
    pub q1: f64,
    /// Heater 2 output
    #[serde(rename = "Q2")]
    pub q2: f64,
}

impl Record {
    /// Row for `scan` taken at lab time `time`.
    pub fn new(time: f64, scan: Scan) -> Self {
        Self {
            time,
            t1: scan.t1,
            t2: scan.t2,
            q1: scan.q1,
            q2: scan.q2,
        }
    }
}

/// In-memory log of scans
#[derive(Debug, Clone, Default)]
pub struct Historian {
    records: Vec<Record>,
}

impl Historian {
    /// Empty historian.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scan taken at `time`.
    pub fn record(&mut self, time: f64, scan: Scan) {
        self.records.push(Record::new(time, scan));
    }

    /// Scan `lab` and record the result at `time`.
    pub fn update<L: Lab + ?Sized>(&mut self, lab: &mut L, time: f64) -> LabResult<Scan> {
        let scan = lab.scan()?;
        self.record(time, scan);
        Ok(scan)
    }

    /// All rows, oldest first.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Most recent row.
    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write all rows as CSV (with header) to `writer`.
    #[cfg(feature = "storage_csv")]
    pub fn to_writer<W: std::io::Write>(&self, writer: W) -> LabResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        if self.records.is_empty() {
            csv.write_record(COLUMNS)?;
        }
        for record in &self.records {
            csv.serialize(record)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write all rows as CSV to the file at `path`.
    #[cfg(feature = "storage_csv")]
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> LabResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        self.to_writer(file)?;
        info!("Wrote {} records to '{}'", self.records.len(), path.display());
        Ok(())
    }

    /// Write all rows as CSV to the file at `path`.
    #[cfg(not(feature = "storage_csv"))]
    pub fn to_csv<P: AsRef<Path>>(&self, _path: P) -> LabResult<()> {
        Err(crate::error::LabError::FeatureNotEnabled(
            "storage_csv".to_string(),
        ))
    }
}
