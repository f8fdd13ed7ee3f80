// In crates/ingestion/src/records.rs

use core_types::{EquityPoint, Kline, Side, Trade};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::Result;
use crate::reader::Row;

const BPS_DIVISOR: Decimal = dec!(10_000);

/// Builds a `Trade` from one input row, filling in `fee` and `pnl` when absent.
pub(crate) fn trade_from_row(row: &Row<'_>, fee_rate_bps: Decimal) -> Result<Trade> {
    let entry_time = row.timestamp(&["entry_time", "entry_timestamp", "open_time"])?;
    let exit_time = row.timestamp(&["exit_time", "exit_timestamp", "close_time"])?;
    if exit_time < entry_time {
        return Err(row.invalid(format!(
            "exit_time {exit_time} is before entry_time {entry_time}"
        )));
    }

    let side = match row.required(&["side", "direction"])?.to_ascii_lowercase().as_str() {
        "long" | "buy" => Side::Long,
        "short" | "sell" => Side::Short,
        other => return Err(row.invalid(format!("unknown side {other:?}"))),
    };

    let entry_price = row.decimal(&["entry_price"])?;
    let exit_price = row.decimal(&["exit_price"])?;
    if entry_price <= Decimal::ZERO || exit_price <= Decimal::ZERO {
        return Err(row.invalid("prices must be positive"));
    }
    let quantity = row.decimal(&["quantity", "qty", "size"])?;
    if quantity <= Decimal::ZERO {
        return Err(row.invalid("quantity must be positive"));
    }

    let fee = match row.optional_decimal(&["fee", "fees", "commission"])? {
        Some(fee) if fee < Decimal::ZERO => return Err(row.invalid("fee cannot be negative")),
        Some(fee) => fee,
        None => (entry_price + exit_price) * quantity * fee_rate_bps / BPS_DIVISOR,
    };
    let pnl = match row.optional_decimal(&["pnl", "realized_pnl", "profit"])? {
        Some(pnl) => pnl,
        None => (exit_price - entry_price) * quantity * side.direction() - fee,
    };

    let requested_quantity = row.optional_decimal(&["requested_quantity", "order_quantity"])?;
    if matches!(requested_quantity, Some(q) if q <= Decimal::ZERO) {
        return Err(row.invalid("requested_quantity must be positive"));
    }

    Ok(Trade {
        entry_time,
        exit_time,
        side,
        entry_price,
        exit_price,
        quantity,
        fee,
        pnl,
        signal_price: row.optional_decimal(&["signal_price", "intended_price"])?,
        signal_time: row.optional_timestamp(&["signal_time", "signal_timestamp"])?,
        requested_quantity,
    })
}

pub(crate) fn equity_from_row(row: &Row<'_>) -> Result<EquityPoint> {
    let timestamp = row.timestamp(&["timestamp", "time", "date"])?;
    let value = row.decimal(&["equity", "value", "balance"])?;
    if value < Decimal::ZERO {
        return Err(row.invalid("equity cannot be negative"));
    }
    Ok(EquityPoint { timestamp, value })
}

pub(crate) fn kline_from_row(row: &Row<'_>) -> Result<Kline> {
    let kline = Kline {
        open_time: row.timestamp(&["open_time", "timestamp", "time"])?,
        open: row.decimal(&["open"])?,
        high: row.decimal(&["high"])?,
        low: row.decimal(&["low"])?,
        close: row.decimal(&["close"])?,
        volume: row.optional_decimal(&["volume"])?.unwrap_or(Decimal::ZERO),
    };
    if kline.low > kline.high || kline.close <= Decimal::ZERO {
        return Err(row.invalid("bar has low above high or a non-positive close"));
    }
    Ok(kline)
}
