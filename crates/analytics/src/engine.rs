// In crates/analytics/src/engine.rs

use chrono::Datelike;
use core_types::{
    BacktestResult, EquityPoint, Stage, StageOutput, Trade, Warning, WarningKind, equity,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use tracing::debug;

use crate::drawdown;
use crate::stats::{self, normalize};
use crate::types::{ConfidenceInterval, ProfitFactor, ProfitMetrics, ProfitabilitySettings};

const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

/// Computes `ProfitMetrics` from a trade list and its equity curve.
#[derive(Debug, Clone, Default)]
pub struct ProfitabilityAnalyzer {
    settings: ProfitabilitySettings,
}

impl ProfitabilityAnalyzer {
    pub fn new(settings: ProfitabilitySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProfitabilitySettings {
        &self.settings
    }

    /// Analyzes a whole backtest run.
    pub fn analyze(&self, backtest: &BacktestResult) -> StageOutput<ProfitMetrics> {
        self.calculate(
            backtest.initial_capital(),
            backtest.trades(),
            backtest.equity_curve(),
            backtest.timeframe().periods_per_year(),
        )
    }

    /// Analyzes a bare trade list, replaying its equity curve first.
    ///
    /// Used for market cells and walk-forward windows, which only have trades.
    pub fn analyze_trades(
        &self,
        initial_capital: Decimal,
        trades: &[Trade],
        nominal_periods_per_year: f64,
    ) -> StageOutput<ProfitMetrics> {
        let mut ordered = trades.to_vec();
        ordered.sort_by_key(|t| t.exit_time);
        let curve = equity::replay_trades(initial_capital, &ordered);
        self.calculate(initial_capital, &ordered, &curve, nominal_periods_per_year)
    }

    /// Calculates the full metric set.
    ///
    /// `nominal_periods_per_year` is used only when the curve is too short to
    /// infer a sampling rate from its own timestamps.
    pub fn calculate(
        &self,
        initial_capital: Decimal,
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        nominal_periods_per_year: f64,
    ) -> StageOutput<ProfitMetrics> {
        let mut warnings = Vec::new();
        let degenerate = |message: &str| {
            Warning::new(Stage::Profitability, WarningKind::Degenerate, message)
        };

        // --- Trade Statistics ---

        // 1. Counts & win rate
        let total_trades = trades.len();
        let winners: Vec<&Trade> = trades.iter().filter(|t| t.is_win()).collect();
        let losers: Vec<&Trade> = trades.iter().filter(|t| t.is_loss()).collect();
        let win_rate = if total_trades > 0 {
            winners.len() as f64 / total_trades as f64
        } else {
            warnings.push(degenerate("no trades; trade statistics set to zero"));
            0.0
        };

        // 2. Profit factor & averages
        let gross_profit: Decimal = winners.iter().map(|t| t.pnl).sum();
        let gross_loss: Decimal = losers.iter().map(|t| t.pnl).sum::<Decimal>().abs();
        let profit_factor = if total_trades == 0 {
            ProfitFactor::NoTrades
        } else if gross_loss.is_zero() {
            if gross_profit.is_zero() {
                ProfitFactor::Ratio(0.0)
            } else {
                ProfitFactor::NoLosses
            }
        } else {
            ProfitFactor::Ratio((gross_profit / gross_loss).to_f64().unwrap_or(0.0))
        };
        let avg_win = average(gross_profit, winners.len());
        let avg_loss = average(gross_loss, losers.len());
        let net_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();
        let expectancy = average(net_pnl, total_trades);
        let avg_trade_duration_secs = if total_trades > 0 {
            trades.iter().map(|t| t.holding_secs() as f64).sum::<f64>() / total_trades as f64
        } else {
            0.0
        };

        // --- Curve Statistics ---

        // 3. Returns & sampling rate
        let returns = equity::simple_returns(equity_curve);
        let span_secs = match (equity_curve.first(), equity_curve.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_seconds() as f64,
            _ => 0.0,
        };
        let years = span_secs / SECONDS_PER_YEAR;
        let periods_per_year = if returns.len() >= 2 && years > 0.0 {
            returns.len() as f64 / years
        } else {
            nominal_periods_per_year
        };

        let start_value = equity_curve
            .first()
            .map(|p| p.value)
            .unwrap_or(initial_capital);
        let end_value = equity_curve.last().map(|p| p.value).unwrap_or(start_value);
        let total_return = if start_value > Decimal::ZERO {
            ((end_value - start_value) / start_value).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        let annualized_return = annualize(total_return, years);

        // 4. Sharpe & Sortino
        let rf_per_period = self.settings.risk_free_rate / periods_per_year.max(1.0);
        let excess: Vec<f64> = returns.iter().map(|r| r - rf_per_period).collect();
        let mean_return = stats::mean(&returns);
        let return_std = stats::sample_std(&returns);
        let scale = periods_per_year.sqrt();

        let sharpe = if returns.len() < 2 || return_std == 0.0 {
            warnings.push(degenerate("return variance is zero; Sharpe and Sortino set to 0"));
            0.0
        } else {
            stats::mean(&excess) / return_std * scale
        };

        let downside_dev = if excess.len() < 2 {
            0.0
        } else {
            let sum_sq: f64 = excess.iter().map(|r| r.min(0.0).powi(2)).sum();
            (sum_sq / (excess.len() - 1) as f64).sqrt()
        };
        let sortino = if sharpe == 0.0 {
            0.0
        } else if downside_dev == 0.0 {
            warnings.push(degenerate("no downside deviation; Sortino set to 0"));
            0.0
        } else {
            stats::mean(&excess) / downside_dev * scale
        };

        // 5. Drawdown family
        let dd = drawdown::analyze(equity_curve);
        let calmar = if dd.max_fraction > 0.0 {
            annualized_return / dd.max_fraction
        } else {
            0.0
        };
        let recovery_factor = if dd.max_absolute > Decimal::ZERO {
            (net_pnl / dd.max_absolute).to_f64()
        } else {
            None
        };

        // 6. Significance
        let test = stats::t_test_zero_mean(&returns, 0.95);
        let significant = returns.len() >= 2
            && test.t_statistic > 0.0
            && test.p_value < self.settings.significance_level;

        // 7. Kelly
        let kelly = kelly_fraction(
            win_rate,
            avg_win.to_f64().unwrap_or(0.0),
            avg_loss.to_f64().unwrap_or(0.0),
            self.settings.kelly_cap,
        );

        let mut metrics = ProfitMetrics {
            total_trades,
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            net_pnl,
            total_return,
            annualized_return,
            periods_per_year,
            sharpe: finite_or_zero(sharpe),
            sortino: finite_or_zero(sortino),
            calmar: finite_or_zero(calmar),
            max_drawdown: dd.max_fraction,
            max_drawdown_duration_secs: dd.longest.num_seconds(),
            recovery_factor,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            expectancy,
            avg_trade_duration_secs,
            monthly_win_ratio: monthly_win_ratio(equity_curve),
            mean_return,
            return_std,
            return_ci95: ConfidenceInterval {
                lower: test.lower,
                upper: test.upper,
            },
            t_statistic: test.t_statistic,
            p_value: test.p_value,
            significant,
            kelly_fraction: kelly,
            quality_score: 0.0,
        };
        metrics.quality_score = quality_score(&metrics, self.settings.significance_level);

        debug!(
            trades = total_trades,
            sharpe = metrics.sharpe,
            max_drawdown = metrics.max_drawdown,
            p_value = metrics.p_value,
            quality = metrics.quality_score,
            "Profitability calculated."
        );

        StageOutput::with_warnings(metrics, warnings)
    }
}

/// Full Kelly fraction `(p * W - (1 - p) * L) / W`, floored at 0 and capped.
pub fn kelly_fraction(win_rate: f64, avg_win: f64, avg_loss: f64, cap: f64) -> f64 {
    if avg_win <= 0.0 || !win_rate.is_finite() {
        return 0.0;
    }
    let raw = (win_rate * avg_win - (1.0 - win_rate) * avg_loss.abs()) / avg_win;
    raw.clamp(0.0, cap.max(0.0))
}

/// The 0-100 profitability summary: Sharpe 30, profit factor 20, win rate 20,
/// drawdown 20, significance 10.
pub fn quality_score(m: &ProfitMetrics, significance_level: f64) -> f64 {
    let sharpe = 30.0 * normalize(m.sharpe, 0.0, 2.0);
    let profit_factor = 20.0 * normalize(m.profit_factor.capped(3.0), 1.0, 2.5);
    let win_rate = 20.0 * normalize(m.win_rate, 0.3, 0.6);
    let drawdown = 20.0 * normalize(m.max_drawdown, 0.5, 0.0);
    let significance = if m.significant {
        10.0
    } else if m.t_statistic > 0.0 {
        10.0 * normalize(m.p_value, 0.5, significance_level)
    } else {
        0.0
    };
    (sharpe + profit_factor + win_rate + drawdown + significance).clamp(0.0, 100.0)
}

fn average(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        total / Decimal::from(count)
    }
}

fn annualize(total_return: f64, years: f64) -> f64 {
    if years <= 0.0 {
        return total_return;
    }
    let growth = 1.0 + total_return;
    if growth <= 0.0 {
        return -1.0;
    }
    let compounded = growth.powf(1.0 / years) - 1.0;
    if compounded.is_finite() {
        compounded
    } else {
        total_return / years
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn monthly_win_ratio(curve: &[EquityPoint]) -> Option<f64> {
    let first = curve.first()?;
    let mut month_closes: Vec<((i32, u32), Decimal)> = Vec::new();
    for point in curve {
        let key = (point.timestamp.year(), point.timestamp.month());
        match month_closes.last_mut() {
            Some((k, close)) if *k == key => *close = point.value,
            _ => month_closes.push((key, point.value)),
        }
    }

    let mut previous = first.value;
    let mut winning = 0usize;
    for (_, close) in &month_closes {
        if *close > previous {
            winning += 1;
        }
        previous = *close;
    }
    Some(winning as f64 / month_closes.len() as f64)
}
