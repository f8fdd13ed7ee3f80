// In crates/validation/src/multi_market.rs

use std::collections::BTreeMap;

use analytics::{ProfitabilityAnalyzer, stats};
use core_types::{
    CancelToken, MarketData, Stage, StageOutput, StrategyParams, StrategyRunner, Warning,
    WarningKind,
};
use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::regime;
use crate::types::{
    Consistency, MarketRegime, MarketTestResult, MultiMarketResult, MultiMarketSettings,
    MultiMarketSummary, RegimePassRate,
};

/// Re-runs a strategy over a matrix of markets and judges how well it carries over.
#[derive(Debug, Clone, Default)]
pub struct MultiMarketTester {
    settings: MultiMarketSettings,
    analyzer: ProfitabilityAnalyzer,
}

impl MultiMarketTester {
    pub fn new(settings: MultiMarketSettings, analyzer: ProfitabilityAnalyzer) -> Self {
        Self { settings, analyzer }
    }

    pub fn settings(&self) -> &MultiMarketSettings {
        &self.settings
    }

    /// Tests every market on the current rayon pool, one cell per market.
    ///
    /// Cancellation is checked before each cell; cells that never started are
    /// left out and the summary covers the finished ones.
    pub fn run(
        &self,
        runner: &dyn StrategyRunner,
        params: &StrategyParams,
        markets: &[MarketData],
        initial_capital: Decimal,
        cancel: &CancelToken,
    ) -> StageOutput<MultiMarketResult> {
        let mut warnings = Vec::new();
        if markets.is_empty() {
            warnings.push(Warning::new(
                Stage::MultiMarket,
                WarningKind::StageSkipped,
                "no market datasets supplied",
            ));
            let result = MultiMarketResult {
                cells: Vec::new(),
                summary: self.summarize(&[], false),
            };
            return StageOutput::with_warnings(result, warnings);
        }

        info!(strategy = runner.name(), markets = markets.len(), "Running market matrix.");

        // Order-preserving collect keeps the cell list deterministic.
        let outcomes: Vec<Option<MarketTestResult>> = markets
            .par_iter()
            .map(|market| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(self.test_cell(runner, params, market, initial_capital))
            })
            .collect();

        let cancelled = outcomes.iter().any(Option::is_none);
        let cells: Vec<MarketTestResult> = outcomes.into_iter().flatten().collect();
        if cancelled {
            warn!(finished = cells.len(), total = markets.len(), "Market matrix cancelled.");
            warnings.push(Warning::new(
                Stage::MultiMarket,
                WarningKind::Cancelled,
                format!("{} of {} markets tested before cancellation", cells.len(), markets.len()),
            ));
        }

        let summary = self.summarize(&cells, cancelled);
        if cells.len() < 2 {
            warnings.push(Warning::new(
                Stage::MultiMarket,
                WarningKind::InsufficientData,
                format!("{} market cell(s); dispersion is not meaningful", cells.len()),
            ));
        } else if summary.consistency == Consistency::Low {
            warnings.push(Warning::new(
                Stage::MultiMarket,
                WarningKind::HighDispersion,
                format!(
                    "Sharpe varies widely across markets (mean {:.2}, std {:.2})",
                    summary.mean_sharpe, summary.std_sharpe
                ),
            ));
        }

        info!(
            cells = summary.cells_tested,
            passed = summary.cells_passed,
            pass_rate = summary.pass_rate,
            consistency = ?summary.consistency,
            "Market matrix complete."
        );
        StageOutput::with_warnings(MultiMarketResult { cells, summary }, warnings)
    }

    fn test_cell(
        &self,
        runner: &dyn StrategyRunner,
        params: &StrategyParams,
        market: &MarketData,
        initial_capital: Decimal,
    ) -> MarketTestResult {
        let slice = market.as_slice();
        let regime = regime::classify(&slice, &self.settings.regime);
        let trades = runner.run(&slice, params);
        let metrics = self
            .analyzer
            .analyze_trades(initial_capital, &trades, market.timeframe.periods_per_year())
            .value;

        // --- Pass/Fail ---
        let mut failure_reasons = Vec::new();
        if metrics.total_trades < self.settings.min_trades_per_cell {
            failure_reasons.push(format!(
                "{} trades < {}",
                metrics.total_trades, self.settings.min_trades_per_cell
            ));
        }
        if metrics.sharpe < self.settings.min_sharpe {
            failure_reasons.push(format!(
                "sharpe {:.2} < {:.2}",
                metrics.sharpe, self.settings.min_sharpe
            ));
        }
        if metrics.quality_score < self.settings.min_quality {
            failure_reasons.push(format!(
                "quality {:.1} < {:.1}",
                metrics.quality_score, self.settings.min_quality
            ));
        }

        debug!(
            symbol = %market.symbol,
            timeframe = %market.timeframe,
            regime = ?regime.map(|r| r.regime),
            trades = metrics.total_trades,
            sharpe = metrics.sharpe,
            "Market cell tested."
        );
        MarketTestResult {
            symbol: market.symbol.clone(),
            timeframe: market.timeframe.clone(),
            regime,
            passed: failure_reasons.is_empty(),
            metrics,
            failure_reasons,
        }
    }

    /// Aggregates finished cells.
    pub fn summarize(&self, cells: &[MarketTestResult], cancelled: bool) -> MultiMarketSummary {
        let sharpes: Vec<f64> = cells.iter().map(|c| c.metrics.sharpe).collect();
        let cells_passed = cells.iter().filter(|c| c.passed).count();
        let mean_sharpe = stats::mean(&sharpes);
        let std_sharpe = stats::sample_std(&sharpes);
        let coefficient_of_variation =
            (mean_sharpe.abs() > f64::EPSILON).then(|| std_sharpe / mean_sharpe.abs());

        let mut regime_pass_rates: BTreeMap<MarketRegime, RegimePassRate> = BTreeMap::new();
        for cell in cells {
            let Some(classification) = cell.regime else {
                continue;
            };
            let entry = regime_pass_rates.entry(classification.regime).or_default();
            entry.cells += 1;
            if cell.passed {
                entry.passed += 1;
            }
        }
        for rate in regime_pass_rates.values_mut() {
            rate.pass_rate = rate.passed as f64 / rate.cells as f64;
        }

        MultiMarketSummary {
            cells_tested: cells.len(),
            cells_passed,
            pass_rate: if cells.is_empty() {
                0.0
            } else {
                cells_passed as f64 / cells.len() as f64
            },
            mean_sharpe,
            median_sharpe: stats::median(&sharpes),
            std_sharpe,
            coefficient_of_variation,
            penalized_sharpe: mean_sharpe - self.settings.dispersion_penalty * std_sharpe,
            consistency: if cells.is_empty() {
                Consistency::Low
            } else {
                Consistency::from_cv(coefficient_of_variation)
            },
            regime_pass_rates,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use core_types::{Kline, MarketSlice, Side, Symbol, Timeframe, Trade};
    use rust_decimal_macros::dec;

    /// Buys every bar and sells on the next; profits only when the market rises.
    struct BarByBar;

    impl StrategyRunner for BarByBar {
        fn name(&self) -> &str {
            "bar-by-bar"
        }

        fn run(&self, market: &MarketSlice<'_>, _params: &StrategyParams) -> Vec<Trade> {
            market
                .klines
                .windows(2)
                .map(|w| {
                    let qty = dec!(1);
                    Trade {
                        entry_time: w[0].open_time,
                        exit_time: w[1].open_time,
                        side: Side::Long,
                        entry_price: w[0].close,
                        exit_price: w[1].close,
                        quantity: qty,
                        fee: dec!(0),
                        pnl: (w[1].close - w[0].close) * qty,
                        signal_price: None,
                        signal_time: None,
                        requested_quantity: None,
                    }
                })
                .collect()
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// Rising market with a small pullback every fourth bar.
    fn market(symbol: &str, drift: Decimal) -> MarketData {
        let mut price = dec!(100);
        let klines = (0..120)
            .map(|i| {
                price += if i % 4 == 3 { -drift / dec!(2) } else { drift };
                Kline {
                    open_time: base() + Duration::days(i),
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: dec!(1000),
                }
            })
            .collect();
        MarketData::new(Symbol::from(symbol), Timeframe::parse("1d").unwrap(), klines)
    }

    #[test]
    fn trending_markets_pass_and_falling_ones_fail() {
        let tester = MultiMarketTester::default();
        let markets = vec![
            market("BTCUSDT", dec!(1)),
            market("ETHUSDT", dec!(1.2)),
            market("DOGEUSDT", dec!(-1)),
        ];
        let out = tester.run(
            &BarByBar,
            &StrategyParams::new(),
            &markets,
            dec!(10_000),
            &CancelToken::new(),
        );
        let result = out.value;

        assert_eq!(result.cells.len(), 3);
        assert_eq!(result.cells[0].symbol, Symbol::from("BTCUSDT"));
        assert!(result.cells[0].passed);
        assert!(result.cells[1].passed);
        assert!(!result.cells[2].passed);
        assert_eq!(result.summary.cells_passed, 2);
        assert!((result.summary.pass_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!(!result.summary.cancelled);
    }

    #[test]
    fn mixed_results_are_low_consistency() {
        let tester = MultiMarketTester::default();
        let markets = vec![market("AUSDT", dec!(1)), market("BUSDT", dec!(-1))];
        let out = tester.run(
            &BarByBar,
            &StrategyParams::new(),
            &markets,
            dec!(10_000),
            &CancelToken::new(),
        );
        assert_eq!(out.value.summary.consistency, Consistency::Low);
        assert!(out.has(WarningKind::HighDispersion));
        assert!(out.value.summary.penalized_sharpe < out.value.summary.mean_sharpe);
    }

    #[test]
    fn cancelled_runs_return_a_partial_aggregate() {
        let tester = MultiMarketTester::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = tester.run(
            &BarByBar,
            &StrategyParams::new(),
            &[market("BTCUSDT", dec!(1))],
            dec!(10_000),
            &cancel,
        );
        assert!(out.value.cells.is_empty());
        assert!(out.value.summary.cancelled);
        assert!(out.has(WarningKind::Cancelled));
    }

    #[test]
    fn no_markets_skips_the_stage() {
        let out = MultiMarketTester::default().run(
            &BarByBar,
            &StrategyParams::new(),
            &[],
            dec!(10_000),
            &CancelToken::new(),
        );
        assert!(out.has(WarningKind::StageSkipped));
        assert_eq!(out.value.summary.pass_rate, 0.0);
    }

    #[test]
    fn regime_pass_rates_group_cells() {
        let tester = MultiMarketTester::default();
        let markets = vec![market("AUSDT", dec!(1)), market("BUSDT", dec!(1.5))];
        let summary = tester
            .run(
                &BarByBar,
                &StrategyParams::new(),
                &markets,
                dec!(10_000),
                &CancelToken::new(),
            )
            .value
            .summary;
        let bull = summary.regime_pass_rates[&MarketRegime::Bull];
        assert_eq!(bull.cells, 2);
        assert_eq!(bull.pass_rate, 1.0);
    }
}
