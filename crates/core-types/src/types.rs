// In crates/core-types/src/types.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

/// A trading pair or instrument identifier, e.g. "BTCUSDT".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol(value.to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for longs, -1 for shorts.
    pub fn direction(&self) -> Decimal {
        match self {
            Side::Long => dec!(1),
            Side::Short => dec!(-1),
        }
    }
}

/// A bar interval such as "5m", "1h" or "1d".
///
/// Markets are assumed to trade around the clock, so a year holds
/// `365.25 days / interval` periods.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    label: String,
    seconds: i64,
}

impl Timeframe {
    pub fn parse(label: &str) -> Result<Self> {
        let label = label.trim();
        let split = label
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| Error::InvalidTimeframe(label.to_string()))?;
        let (count, unit) = label.split_at(split);
        let count: i64 = count
            .parse()
            .map_err(|_| Error::InvalidTimeframe(label.to_string()))?;
        let unit_secs = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" | "D" => 86_400,
            "w" | "W" => 604_800,
            _ => return Err(Error::InvalidTimeframe(label.to_string())),
        };
        if count <= 0 {
            return Err(Error::InvalidTimeframe(label.to_string()));
        }
        Ok(Self {
            label: label.to_string(),
            seconds: count * unit_secs,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn periods_per_year(&self) -> f64 {
        SECONDS_PER_YEAR / self.seconds as f64
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Timeframe::parse(&value)
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.label
    }
}

/// A single closed trade, from entry to exit. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    /// Realized P&L, net of fees.
    pub pnl: Decimal,
    /// Price the strategy intended to trade at when the signal fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_time: Option<DateTime<Utc>>,
    /// Quantity the order asked for; `quantity` is what actually filled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_quantity: Option<Decimal>,
}

impl Trade {
    pub fn entry_notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < Decimal::ZERO
    }

    pub fn holding_secs(&self) -> i64 {
        (self.exit_time - self.entry_time).num_seconds()
    }
}

/// A point in the portfolio's equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
}

/// One OHLCV bar of a price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_parses_common_intervals() {
        assert_eq!(Timeframe::parse("5m").unwrap().seconds(), 300);
        assert_eq!(Timeframe::parse("4h").unwrap().seconds(), 14_400);
        assert_eq!(Timeframe::parse("1d").unwrap().seconds(), 86_400);
        let daily = Timeframe::parse("1d").unwrap();
        assert!((daily.periods_per_year() - 365.25).abs() < 1e-9);
    }

    #[test]
    fn timeframe_rejects_garbage() {
        assert!(Timeframe::parse("").is_err());
        assert!(Timeframe::parse("h").is_err());
        assert!(Timeframe::parse("0m").is_err());
        assert!(Timeframe::parse("15x").is_err());
    }

    #[test]
    fn timeframe_serializes_as_label() {
        let tf = Timeframe::parse("15m").unwrap();
        let json = serde_json::to_string(&tf).unwrap();
        assert_eq!(json, "\"15m\"");
        let back: Timeframe = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tf);
    }
}
