// In crates/report-store/src/lib.rs

pub mod error;
pub mod migrate;
pub mod store;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use store::{JsonlReportStore, MemoryReportStore, ReportStore};
pub use types::{SCHEMA_VERSION, StoreSettings, StoredReport};
