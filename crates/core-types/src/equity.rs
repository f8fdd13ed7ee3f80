// In crates/core-types/src/equity.rs

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::types::{EquityPoint, Trade};

/// Rebuilds an equity curve by replaying realized P&L against a starting balance.
///
/// Trades are applied in exit-time order. The curve opens with an anchor point
/// holding `initial_capital` at the earliest entry time (pulled back to one
/// millisecond before the first exit if they coincide), and trades that share
/// an exit timestamp collapse into a single point so timestamps stay strictly
/// increasing.
pub fn replay_trades(initial_capital: Decimal, trades: &[Trade]) -> Vec<EquityPoint> {
    if trades.is_empty() {
        return Vec::new();
    }

    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by_key(|t| t.exit_time);

    let first_exit = ordered[0].exit_time;
    let mut anchor = trades
        .iter()
        .map(|t| t.entry_time)
        .min()
        .unwrap_or(first_exit);
    if anchor >= first_exit {
        anchor = first_exit - Duration::milliseconds(1);
    }

    let mut curve = Vec::with_capacity(ordered.len() + 1);
    curve.push(EquityPoint {
        timestamp: anchor,
        value: initial_capital,
    });

    let mut equity = initial_capital;
    for trade in ordered {
        equity += trade.pnl;
        match curve.last_mut() {
            Some(last) if last.timestamp == trade.exit_time => last.value = equity,
            _ => curve.push(EquityPoint {
                timestamp: trade.exit_time,
                value: equity,
            }),
        }
    }

    curve
}

/// Simple period-over-period returns of an equity curve.
///
/// A non-positive starting value yields a return of 0 for that period.
pub fn simple_returns(curve: &[EquityPoint]) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| {
            if w[0].value <= Decimal::ZERO {
                0.0
            } else {
                ((w[1].value - w[0].value) / w[0].value).to_f64().unwrap_or(0.0)
            }
        })
        .collect()
}

/// Per-trade returns relative to the equity held before each trade closed.
///
/// Trades are expected in exit order. Once equity is gone every further trade
/// is recorded as a total loss.
pub fn trade_returns(initial_capital: Decimal, trades: &[Trade]) -> Vec<f64> {
    let mut equity = initial_capital;
    trades
        .iter()
        .map(|t| {
            let r = if equity <= Decimal::ZERO {
                -1.0
            } else {
                (t.pnl / equity).to_f64().unwrap_or(0.0)
            };
            equity += t.pnl;
            r
        })
        .collect()
}
