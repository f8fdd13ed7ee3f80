// In crates/report-store/src/types.rs

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use readiness::ReadinessReport;
use serde::{Deserialize, Serialize};

/// Version written by this build. Older records are migrated on read.
pub const SCHEMA_VERSION: u64 = 2;

/// One persisted line: the report plus the bookkeeping the store adds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub schema_version: u64,
    /// Position in the strategy's history, starting at 1.
    pub sequence: u64,
    pub stored_at: DateTime<Utc>,
    pub report: ReadinessReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub directory: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("reports"),
        }
    }
}
