// In crates/ingestion/src/reader.rs

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::FileFormat;

/// A single input record with lower-cased column names and textual values.
///
/// CSV and JSON both flatten into this shape so the field parsing below is shared.
#[derive(Debug, Clone)]
pub(crate) struct Row<'p> {
    pub path: &'p Path,
    /// 1-based position of the record in its file, headers excluded.
    pub number: usize,
    fields: HashMap<String, String>,
}

impl<'p> Row<'p> {
    fn error(&self, reason: impl Into<String>) -> Error {
        Error::Parse {
            path: self.path.to_path_buf(),
            record: self.number,
            reason: reason.into(),
        }
    }

    /// The first non-empty value among `names`.
    pub fn optional(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|n| self.fields.get(*n))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    pub fn required(&self, names: &[&str]) -> Result<&str> {
        self.optional(names)
            .ok_or_else(|| self.error(format!("missing field `{}`", names[0])))
    }

    pub fn decimal(&self, names: &[&str]) -> Result<Decimal> {
        let raw = self.required(names)?;
        parse_decimal(raw).ok_or_else(|| self.error(format!("`{}` is not a number: {raw:?}", names[0])))
    }

    pub fn optional_decimal(&self, names: &[&str]) -> Result<Option<Decimal>> {
        match self.optional(names) {
            None => Ok(None),
            Some(raw) => parse_decimal(raw)
                .map(Some)
                .ok_or_else(|| self.error(format!("`{}` is not a number: {raw:?}", names[0]))),
        }
    }

    pub fn timestamp(&self, names: &[&str]) -> Result<DateTime<Utc>> {
        let raw = self.required(names)?;
        parse_timestamp(raw)
            .ok_or_else(|| self.error(format!("`{}` is not a timestamp: {raw:?}", names[0])))
    }

    pub fn optional_timestamp(&self, names: &[&str]) -> Result<Option<DateTime<Utc>>> {
        match self.optional(names) {
            None => Ok(None),
            Some(raw) => parse_timestamp(raw)
                .map(Some)
                .ok_or_else(|| self.error(format!("`{}` is not a timestamp: {raw:?}", names[0]))),
        }
    }

    pub fn invalid(&self, reason: impl Into<String>) -> Error {
        self.error(reason)
    }
}

pub(crate) fn detect_format(path: &Path) -> Result<FileFormat> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("csv") => Ok(FileFormat::Csv),
        Some("json") => Ok(FileFormat::Json),
        _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Reads every record of a CSV or JSON file into rows.
///
/// JSON input is either an array of objects or an object holding such an array
/// under `key` (e.g. `{"trades": [...]}`).
pub(crate) fn read_rows<'p>(path: &'p Path, key: &str) -> Result<Vec<Row<'p>>> {
    match detect_format(path)? {
        FileFormat::Csv => read_csv(path),
        FileFormat::Json => read_json(path, key),
    }
}

fn read_csv(path: &Path) -> Result<Vec<Row<'_>>> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(file);

    let csv_err = |source| Error::Csv {
        path: path.to_path_buf(),
        source,
    };
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let fields = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(Row {
            path,
            number: i + 1,
            fields,
        });
    }
    Ok(rows)
}

fn read_json<'p>(path: &'p Path, key: &str) -> Result<Vec<Row<'p>>> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| {
        Error::Json {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(Error::Parse {
                    path: path.to_path_buf(),
                    record: 0,
                    reason: format!("expected an array or an object with a `{key}` array"),
                });
            }
        },
        _ => {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                record: 0,
                reason: "expected a JSON array of records".to_string(),
            });
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let Value::Object(map) = item else {
                return Err(Error::Parse {
                    path: path.to_path_buf(),
                    record: i + 1,
                    reason: "record is not a JSON object".to_string(),
                });
            };
            let fields = map
                .into_iter()
                .filter_map(|(k, v)| {
                    let text = match v {
                        Value::Null => return None,
                        Value::String(s) => s,
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        other => other.to_string(),
                    };
                    Some((k.to_ascii_lowercase(), text))
                })
                .collect();
            Ok(Row {
                path,
                number: i + 1,
                fields,
            })
        })
        .collect()
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Accepts epoch milliseconds, RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` in UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Utc.timestamp_millis_opt(ms).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
