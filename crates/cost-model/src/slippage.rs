// In crates/cost-model/src/slippage.rs

use std::sync::Arc;

use analytics::stats;
use chrono::Timelike;
use core_types::{BacktestResult, MarketData, Stage, StageOutput, Symbol, Warning, WarningKind};
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::liquidity::{LiquidityCache, LiquiditySource, StaticLiquidityTable};
use crate::types::{
    CostEstimate, CostModelSettings, PortfolioCostEstimate, SignalFrequency, SlippageBreakdown,
    TimeOfDay,
};

const BPS: f64 = 10_000.0;
const MS_PER_DAY: f64 = 86_400_000.0;
const Z_95: f64 = 1.96;

/// Estimates one-way slippage from spread, square-root market impact,
/// execution delay and volatility.
///
/// One estimator serves one evaluation: its liquidity cache lives as long as it does.
pub struct SlippageEstimator {
    settings: CostModelSettings,
    liquidity: LiquidityCache,
}

impl SlippageEstimator {
    pub fn new(settings: CostModelSettings, source: Arc<dyn LiquiditySource>) -> Self {
        let liquidity = LiquidityCache::new(source, settings.tiers);
        Self {
            settings,
            liquidity,
        }
    }

    /// Builds an estimator backed by the table in `settings.liquidity`.
    pub fn from_settings(settings: CostModelSettings) -> Self {
        let table = StaticLiquidityTable::new(settings.liquidity.clone());
        Self::new(settings, Arc::new(table))
    }

    pub fn settings(&self) -> &CostModelSettings {
        &self.settings
    }

    /// Expected slippage for a single order.
    ///
    /// `daily_volatility` is the standard deviation of daily returns as a fraction.
    pub fn estimate(
        &self,
        symbol: &Symbol,
        order_size_usd: f64,
        frequency: SignalFrequency,
        daily_volatility: f64,
        time_of_day: TimeOfDay,
    ) -> Result<StageOutput<CostEstimate>> {
        if !(order_size_usd.is_finite() && order_size_usd > 0.0) {
            return Err(Error::InvalidOrderSize(order_size_usd));
        }
        if !(daily_volatility.is_finite() && daily_volatility >= 0.0) {
            return Err(Error::InvalidVolatility(daily_volatility));
        }

        let liquidity = self.liquidity.resolve(symbol);
        let profile = self.settings.tiers.get(liquidity.tier);
        let vol_bps = daily_volatility * BPS;

        // 1. Spread
        let spread_bps =
            liquidity.spread_bps * frequency.spread_multiplier() * time_of_day.spread_multiplier();
        // 2. Square-root market impact
        let impact_bps = self.settings.impact_coefficient_bps
            * (order_size_usd / liquidity.depth_usd).sqrt()
            * profile.impact_adjustment;
        // 3. Price drift while the order is in flight
        let delay_bps = vol_bps
            * self.settings.delay_fraction
            * (self.settings.expected_delay_ms.max(0.0) / MS_PER_DAY).sqrt();
        // 4. Volatility slippage
        let volatility_bps =
            vol_bps * frequency.volatility_factor() * profile.volatility_multiplier;

        let total_bps = spread_bps + impact_bps + delay_bps + volatility_bps;
        let half_width = Z_95 * total_bps * profile.uncertainty;

        let estimate = CostEstimate {
            symbol: symbol.clone(),
            order_size_usd,
            breakdown: SlippageBreakdown {
                spread_bps,
                impact_bps,
                delay_bps,
                volatility_bps,
                total_bps,
            },
            ci_low_bps: (total_bps - half_width).max(0.0),
            ci_high_bps: total_bps + half_width,
            liquidity,
            signal_frequency: frequency,
            time_of_day,
        };

        let mut warnings = Vec::new();
        if !liquidity.known {
            warnings.push(Warning::new(
                Stage::CostModel,
                WarningKind::UnknownLiquidity,
                format!("{symbol} is not in the liquidity table; very-low tier assumed"),
            ));
        }

        debug!(
            %symbol,
            order_size_usd,
            total_bps,
            tier = ?liquidity.tier,
            "Slippage estimated."
        );
        Ok(StageOutput::with_warnings(estimate, warnings))
    }

    /// Portfolio-level frictions for a whole backtest.
    ///
    /// The typical order is the mean entry notional, the session is the one most
    /// entries fall in, and volatility comes from `daily_volatility` when given,
    /// otherwise from the trades' own price moves.
    pub fn estimate_backtest(
        &self,
        backtest: &BacktestResult,
        daily_volatility: Option<f64>,
    ) -> Result<StageOutput<Option<PortfolioCostEstimate>>> {
        let trades = backtest.trades();
        if trades.is_empty() {
            return Ok(StageOutput::with_warnings(
                None,
                vec![Warning::new(
                    Stage::CostModel,
                    WarningKind::StageSkipped,
                    "no trades to estimate costs for",
                )],
            ));
        }

        // 1. Trade frequency
        let first_entry = trades.iter().map(|t| t.entry_time).min();
        let last_exit = trades.iter().map(|t| t.exit_time).max();
        let span_days = match (first_entry, last_exit) {
            (Some(a), Some(b)) => (b - a).num_seconds() as f64 / 86_400.0,
            _ => 0.0,
        };
        let trades_per_day = trades.len() as f64 / span_days.max(1.0);
        let frequency = SignalFrequency::from_trades_per_day(trades_per_day);

        // 2. Typical order and session
        let notionals: Vec<f64> = trades
            .iter()
            .map(|t| t.entry_notional().to_f64().unwrap_or(0.0))
            .collect();
        let order_size_usd = stats::mean(&notionals);
        let time_of_day = dominant_session(trades.iter().map(|t| t.entry_time.hour()));

        // 3. Volatility
        let daily_volatility = daily_volatility
            .or_else(|| volatility_from_trades(backtest))
            .unwrap_or(self.settings.default_daily_volatility);

        let StageOutput {
            value: per_trade,
            warnings,
        } = self.estimate(
            backtest.symbol(),
            order_size_usd,
            frequency,
            daily_volatility,
            time_of_day,
        )?;

        // 4. Fees, round trip and edge
        let fee_bps = stats::mean(
            &trades
                .iter()
                .zip(&notionals)
                .filter(|(_, n)| **n > 0.0)
                .map(|(t, n)| t.fee.to_f64().unwrap_or(0.0) / n * BPS)
                .collect::<Vec<_>>(),
        );
        let round_trip_bps = 2.0 * per_trade.breakdown.total_bps + fee_bps;
        let capital = backtest.initial_capital().to_f64().unwrap_or(0.0);
        let annual_cost_drag_pct = if capital > 0.0 {
            round_trip_bps / BPS * order_size_usd * trades_per_day * 365.0 / capital * 100.0
        } else {
            0.0
        };
        let mean_edge_bps = stats::mean(
            &trades
                .iter()
                .zip(&notionals)
                .filter(|(_, n)| **n > 0.0)
                .map(|(t, n)| (t.pnl + t.fee).to_f64().unwrap_or(0.0) / n * BPS)
                .collect::<Vec<_>>(),
        );
        let edge_to_cost_ratio = if round_trip_bps > 0.0 {
            mean_edge_bps / round_trip_bps
        } else {
            0.0
        };

        info!(
            symbol = %backtest.symbol(),
            ?frequency,
            slippage_bps = per_trade.breakdown.total_bps,
            round_trip_bps,
            edge_to_cost_ratio,
            "Portfolio cost estimate ready."
        );

        Ok(StageOutput::with_warnings(
            Some(PortfolioCostEstimate {
                per_trade,
                trades_per_day,
                fee_bps,
                round_trip_bps,
                annual_cost_drag_pct,
                mean_edge_bps,
                edge_to_cost_ratio,
            }),
            warnings,
        ))
    }
}

/// Standard deviation of daily log returns implied by a kline series.
pub fn daily_volatility_from_klines(market: &MarketData) -> Option<f64> {
    let closes: Vec<f64> = market
        .klines
        .iter()
        .filter_map(|k| k.close.to_f64())
        .filter(|c| *c > 0.0)
        .collect();
    if closes.len() < 3 {
        return None;
    }
    let log_returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let bars_per_day = 86_400.0 / market.timeframe.seconds() as f64;
    Some(stats::sample_std(&log_returns) * bars_per_day.sqrt())
}

/// Daily volatility implied by how far prices moved while trades were open.
fn volatility_from_trades(backtest: &BacktestResult) -> Option<f64> {
    let variance_rates: Vec<f64> = backtest
        .trades()
        .iter()
        .filter(|t| t.holding_secs() > 0)
        .filter_map(|t| {
            let entry = t.entry_price.to_f64()?;
            let exit = t.exit_price.to_f64()?;
            let r = (exit / entry).ln();
            Some(r * r / t.holding_secs() as f64)
        })
        .collect();
    if variance_rates.is_empty() {
        return None;
    }
    let daily = (stats::mean(&variance_rates) * 86_400.0).sqrt();
    daily.is_finite().then_some(daily)
}

fn dominant_session(hours: impl Iterator<Item = u32>) -> TimeOfDay {
    let mut counts = [0usize; 5];
    for hour in hours {
        let session = TimeOfDay::from_utc_hour(hour);
        if let Some(i) = TimeOfDay::ALL.iter().position(|s| *s == session) {
            counts[i] += 1;
        }
    }
    let best = counts
        .iter()
        .enumerate()
        .fold(0, |best, (i, c)| if *c > counts[best] { i } else { best });
    TimeOfDay::ALL[best]
}
