// In crates/core-types/src/backtest.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::equity;
use crate::error::{Error, Result};
use crate::types::{EquityPoint, Symbol, Timeframe, Trade};

/// Identifies which backtest run a result belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub strategy_id: String,
    pub run_id: String,
    pub symbol: Symbol,
    pub timeframe: Timeframe,
}

/// Whether a backtest holds enough trades for its statistics to mean anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DataSufficiency {
    Sufficient,
    Insufficient { trades: usize, required: usize },
}

impl DataSufficiency {
    pub fn assess(trades: usize, required: usize) -> Self {
        if trades < required {
            DataSufficiency::Insufficient { trades, required }
        } else {
            DataSufficiency::Sufficient
        }
    }

    pub fn is_sufficient(&self) -> bool {
        matches!(self, DataSufficiency::Sufficient)
    }
}

/// The validated, immutable outcome of one backtest run.
///
/// Every downstream artifact is a derived view; nothing mutates this value
/// after construction, which is why all fields are private.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    meta: RunMetadata,
    initial_capital: Decimal,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    returns: Vec<f64>,
    trade_returns: Vec<f64>,
    equity_derived: bool,
    sufficiency: DataSufficiency,
}

impl BacktestResult {
    /// Validates the records and builds the result.
    ///
    /// Trades are reordered by exit time. When `equity_curve` is `None` the
    /// curve is derived by replaying trade P&L from `initial_capital`.
    pub fn new(
        meta: RunMetadata,
        initial_capital: Decimal,
        mut trades: Vec<Trade>,
        equity_curve: Option<Vec<EquityPoint>>,
        min_trades: usize,
    ) -> Result<Self> {
        if initial_capital <= Decimal::ZERO {
            return Err(Error::InvalidCapital(initial_capital));
        }

        for (index, trade) in trades.iter().enumerate() {
            validate_trade(index, trade)?;
        }
        trades.sort_by_key(|t| t.exit_time);

        let (equity_curve, equity_derived) = match equity_curve {
            Some(curve) => (curve, false),
            None => (equity::replay_trades(initial_capital, &trades), true),
        };
        validate_equity(&equity_curve)?;

        let returns = equity::simple_returns(&equity_curve);
        let trade_returns = equity::trade_returns(initial_capital, &trades);
        let sufficiency = DataSufficiency::assess(trades.len(), min_trades);

        Ok(Self {
            meta,
            initial_capital,
            trades,
            equity_curve,
            returns,
            trade_returns,
            equity_derived,
            sufficiency,
        })
    }

    pub fn meta(&self) -> &RunMetadata {
        &self.meta
    }

    pub fn strategy_id(&self) -> &str {
        &self.meta.strategy_id
    }

    pub fn symbol(&self) -> &Symbol {
        &self.meta.symbol
    }

    pub fn timeframe(&self) -> &Timeframe {
        &self.meta.timeframe
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    /// Trades in exit-time order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Period returns of the equity curve.
    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    /// Each trade's P&L relative to the equity held before it closed.
    pub fn trade_returns(&self) -> &[f64] {
        &self.trade_returns
    }

    pub fn equity_derived(&self) -> bool {
        self.equity_derived
    }

    pub fn sufficiency(&self) -> DataSufficiency {
        self.sufficiency
    }
}

fn validate_trade(index: usize, trade: &Trade) -> Result<()> {
    if trade.exit_time < trade.entry_time {
        return Err(Error::ExitBeforeEntry {
            index,
            entry: trade.entry_time,
            exit: trade.exit_time,
        });
    }
    if trade.entry_price <= Decimal::ZERO || trade.exit_price <= Decimal::ZERO {
        return Err(Error::InvalidTrade {
            index,
            reason: "prices must be positive".to_string(),
        });
    }
    if trade.quantity <= Decimal::ZERO {
        return Err(Error::InvalidTrade {
            index,
            reason: "quantity must be positive".to_string(),
        });
    }
    if trade.fee < Decimal::ZERO {
        return Err(Error::InvalidTrade {
            index,
            reason: "fee cannot be negative".to_string(),
        });
    }
    Ok(())
}

fn validate_equity(curve: &[EquityPoint]) -> Result<()> {
    for (index, point) in curve.iter().enumerate() {
        if point.value < Decimal::ZERO {
            return Err(Error::NegativeEquity {
                index,
                value: point.value,
            });
        }
        if index > 0 && point.timestamp <= curve[index - 1].timestamp {
            return Err(Error::NonMonotonicEquity { index });
        }
    }
    Ok(())
}
