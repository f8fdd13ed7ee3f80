// In crates/report-store/src/migrate.rs

use scoring::Grade;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{SCHEMA_VERSION, StoredReport};

/// Brings a raw record up to `SCHEMA_VERSION` and decodes it.
///
/// Records without a `schema_version` field predate versioning and are
/// treated as version 1.
pub fn upgrade(mut record: Value) -> Result<StoredReport> {
    let version = record
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    if version > SCHEMA_VERSION {
        return Err(Error::UnsupportedVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    if version < 2 {
        if let Some(report) = record.get_mut("report").and_then(Value::as_object_mut) {
            v1_to_v2(report);
        }
        debug!(from = version, to = 2, "Migrated stored report");
    }

    if let Some(envelope) = record.as_object_mut() {
        envelope.insert("schema_version".to_string(), json!(SCHEMA_VERSION));
    }
    Ok(serde_json::from_value(record)?)
}

/// v1 kept the total score as a bare number and a single `position_size`.
fn v1_to_v2(report: &mut Map<String, Value>) {
    if let Some(total) = report.get("score").and_then(Value::as_f64) {
        report.insert(
            "score".to_string(),
            json!({
                "total": total,
                "grade": Grade::from_score(total),
                "components": null,
            }),
        );
    }

    let position = report.remove("position_size").and_then(|v| v.as_f64());
    if !report.contains_key("sizing") {
        report.insert(
            "sizing".to_string(),
            json!({ "position_size_fraction": position.unwrap_or(0.0) }),
        );
    }
}
