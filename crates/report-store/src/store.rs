// In crates/report-store/src/store.rs

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use readiness::ReadinessReport;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::migrate;
use crate::types::{SCHEMA_VERSION, StoredReport};

/// Append-only storage of readiness reports, keyed by strategy and run.
///
/// Re-evaluating a run appends a new version; earlier versions are never
/// rewritten.
pub trait ReportStore: Send + Sync {
    fn append(&self, report: &ReadinessReport) -> Result<StoredReport>;

    /// Latest stored version of the given run.
    fn get(&self, strategy_id: &str, run_id: &str) -> Result<Option<StoredReport>> {
        Ok(self
            .history(strategy_id)?
            .into_iter()
            .rev()
            .find(|r| r.report.run_id() == run_id))
    }

    fn latest(&self, strategy_id: &str) -> Result<Option<StoredReport>> {
        Ok(self.history(strategy_id)?.pop())
    }

    /// Every stored report for the strategy, oldest first.
    fn history(&self, strategy_id: &str) -> Result<Vec<StoredReport>>;
}

// --- JSON Lines ---

/// One `<strategy_id>.jsonl` file per strategy in a directory.
#[derive(Debug)]
pub struct JsonlReportStore {
    directory: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlReportStore {
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        info!(path = ?directory, "Opened report store");
        Ok(Self {
            directory,
            write_lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, strategy_id: &str) -> Result<PathBuf> {
        let usable = !strategy_id.is_empty()
            && !strategy_id.starts_with('.')
            && strategy_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !usable {
            return Err(Error::InvalidStrategyId(strategy_id.to_string()));
        }
        Ok(self.directory.join(format!("{strategy_id}.jsonl")))
    }

    fn read_file(path: &Path) -> Result<Vec<StoredReport>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let corrupt = |reason: String| Error::Corrupt {
                path: path.to_path_buf(),
                line: i + 1,
                reason,
            };
            let value: Value = serde_json::from_str(&line).map_err(|e| corrupt(e.to_string()))?;
            let record = match migrate::upgrade(value) {
                Ok(record) => record,
                Err(Error::Serialization(e)) => return Err(corrupt(e.to_string())),
                Err(e) => return Err(e),
            };
            records.push(record);
        }
        Ok(records)
    }
}

impl ReportStore for JsonlReportStore {
    fn append(&self, report: &ReadinessReport) -> Result<StoredReport> {
        let path = self.path_for(report.strategy_id())?;
        let _guard = self.write_lock.lock();

        let sequence = Self::read_file(&path)?.last().map_or(1, |r| r.sequence + 1);
        let stored = StoredReport {
            schema_version: SCHEMA_VERSION,
            sequence,
            stored_at: Utc::now(),
            report: report.clone(),
        };

        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        debug!(
            strategy = %report.strategy_id(),
            run = %report.run_id(),
            sequence,
            "Report appended"
        );
        Ok(stored)
    }

    fn history(&self, strategy_id: &str) -> Result<Vec<StoredReport>> {
        let path = self.path_for(strategy_id)?;
        Self::read_file(&path)
    }
}

// --- In-Memory ---

#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: RwLock<BTreeMap<String, Vec<StoredReport>>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for MemoryReportStore {
    fn append(&self, report: &ReadinessReport) -> Result<StoredReport> {
        let mut reports = self.reports.write();
        let history = reports.entry(report.strategy_id().to_string()).or_default();
        let stored = StoredReport {
            schema_version: SCHEMA_VERSION,
            sequence: history.len() as u64 + 1,
            stored_at: Utc::now(),
            report: report.clone(),
        };
        history.push(stored.clone());
        Ok(stored)
    }

    fn history(&self, strategy_id: &str) -> Result<Vec<StoredReport>> {
        Ok(self.reports.read().get(strategy_id).cloned().unwrap_or_default())
    }
}
