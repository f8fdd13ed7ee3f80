// In crates/validation/src/walk_forward.rs

use std::ops::Range;

use analytics::{ProfitMetrics, ProfitabilityAnalyzer, stats};
use chrono::{DateTime, Duration, Utc};
use core_types::{
    BacktestResult, CancelToken, MarketData, Stage, StageOutput, StrategyParams, StrategyRunner,
    Trade, Warning, WarningKind,
};
use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{
    WalkForwardResult, WalkForwardSettings, WalkForwardSource, WalkForwardWindow, WindowMode,
};

/// In-sample and out-of-sample ranges of one window, in abstract units
/// (bar indices or seconds since the first trade).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowBounds {
    pub in_sample: Range<i64>,
    pub out_of_sample: Range<i64>,
}

/// Splits `total` units into `count` sequential windows.
///
/// Every window's out-of-sample segment is the tail `1 - in_sample_ratio` of
/// its slot. Rolling windows train on the rest of the slot; anchored windows
/// train on everything from the start up to the out-of-sample segment.
pub fn window_bounds(
    total: i64,
    count: usize,
    in_sample_ratio: f64,
    mode: WindowMode,
) -> Vec<WindowBounds> {
    let count = count as i64;
    if count == 0 {
        return Vec::new();
    }
    let slot = total / count;
    if slot < 2 {
        return Vec::new();
    }
    let oos_len = ((slot as f64 * (1.0 - in_sample_ratio)).round() as i64).clamp(1, slot - 1);

    (0..count)
        .filter_map(|i| {
            let end = if i == count - 1 { total } else { (i + 1) * slot };
            let split = end - oos_len;
            let start = match mode {
                WindowMode::Rolling => i * slot,
                WindowMode::Anchored => 0,
            };
            (split > start).then(|| WindowBounds {
                in_sample: start..split,
                out_of_sample: split..end,
            })
        })
        .collect()
}

/// Degradation of one window: `1 - oos / is`, clamped to [0, 1].
///
/// A non-positive in-sample Sharpe has nothing to degrade from: the window
/// counts as fully degraded unless out-of-sample made money anyway.
pub fn window_degradation(is_sharpe: f64, oos_sharpe: f64) -> f64 {
    if is_sharpe <= 0.0 {
        return if oos_sharpe <= 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - oos_sharpe / is_sharpe).clamp(0.0, 1.0)
}

fn oos_is_ratio(is_sharpe: f64, oos_sharpe: f64) -> f64 {
    if is_sharpe > 0.0 {
        (oos_sharpe / is_sharpe).max(0.0)
    } else if oos_sharpe > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Heuristic overfitting score in [0, 100] and the instability term it used.
///
/// `0.8 × mean degradation + 0.2 × instability`, where instability is the
/// spread of out-of-sample Sharpe relative to its level, capped at 1.
pub fn overfitting_score(degradations: &[f64], oos_sharpes: &[f64]) -> (f64, f64) {
    if degradations.is_empty() {
        return (0.0, 0.0);
    }
    let mean_degradation = stats::mean(degradations);
    let instability = (stats::sample_std(oos_sharpes) / (stats::mean(oos_sharpes).abs() + 1.0))
        .clamp(0.0, 1.0);
    let score = 100.0 * (0.8 * mean_degradation + 0.2 * instability).clamp(0.0, 1.0);
    (score, instability)
}

/// A window's trades and metrics before it is judged.
struct WindowRun {
    index: usize,
    in_sample_start: DateTime<Utc>,
    in_sample_end: DateTime<Utc>,
    out_of_sample_end: DateTime<Utc>,
    params: StrategyParams,
    in_sample: ProfitMetrics,
    out_of_sample: ProfitMetrics,
}

/// Sequential in-sample/out-of-sample testing.
#[derive(Debug, Clone)]
pub struct WalkForwardValidator {
    settings: WalkForwardSettings,
    analyzer: ProfitabilityAnalyzer,
}

impl WalkForwardValidator {
    pub fn new(settings: WalkForwardSettings, analyzer: ProfitabilityAnalyzer) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, analyzer })
    }

    pub fn settings(&self) -> &WalkForwardSettings {
        &self.settings
    }

    /// Re-runs the strategy per window: tuned on the in-sample bars, measured
    /// on the bars that follow.
    ///
    /// The out-of-sample replay starts at the in-sample start so indicators
    /// are warm; only trades entered after the split count.
    pub fn run_replay(
        &self,
        runner: &dyn StrategyRunner,
        base: &StrategyParams,
        market: &MarketData,
        initial_capital: Decimal,
        cancel: &CancelToken,
    ) -> StageOutput<Option<WalkForwardResult>> {
        let klines = &market.klines;
        let bounds = window_bounds(
            klines.len() as i64,
            self.settings.window_count,
            self.settings.in_sample_ratio,
            self.settings.mode,
        );
        if bounds.is_empty() {
            return self.not_enough_data(format!(
                "{} bars cannot form {} windows",
                klines.len(),
                self.settings.window_count
            ));
        }
        info!(
            strategy = runner.name(),
            symbol = %market.symbol,
            windows = bounds.len(),
            "Running walk-forward replay."
        );

        let ppy = market.timeframe.periods_per_year();
        let bar = Duration::seconds(market.timeframe.seconds());
        let full = market.as_slice();
        let runs: Vec<Option<WindowRun>> = bounds
            .par_iter()
            .enumerate()
            .map(|(index, b)| {
                if cancel.is_cancelled() {
                    return None;
                }
                let (is_start, split, end) = (
                    b.in_sample.start as usize,
                    b.out_of_sample.start as usize,
                    b.out_of_sample.end as usize,
                );
                let in_sample = full.slice(is_start, split);
                let params = runner.optimize(&in_sample, base);
                let is_trades = runner.run(&in_sample, &params);

                let oos_start = klines[split].open_time;
                let oos_trades: Vec<Trade> = runner
                    .run(&full.slice(is_start, end), &params)
                    .into_iter()
                    .filter(|t| t.entry_time >= oos_start)
                    .collect();

                Some(WindowRun {
                    index,
                    in_sample_start: klines[is_start].open_time,
                    in_sample_end: oos_start,
                    out_of_sample_end: klines[end - 1].open_time + bar,
                    params,
                    in_sample: self.metrics(initial_capital, &is_trades, ppy),
                    out_of_sample: self.metrics(initial_capital, &oos_trades, ppy),
                })
            })
            .collect();

        self.finish(WalkForwardSource::Replay, runs)
    }

    /// Splits the backtest's own trades by entry time with fixed parameters.
    pub fn run_trade_split(
        &self,
        backtest: &BacktestResult,
        cancel: &CancelToken,
    ) -> StageOutput<Option<WalkForwardResult>> {
        let trades = backtest.trades();
        let (Some(first), Some(last)) = (
            trades.iter().map(|t| t.entry_time).min(),
            trades.iter().map(|t| t.exit_time).max(),
        ) else {
            let warning = Warning::new(
                Stage::WalkForward,
                WarningKind::StageSkipped,
                "backtest has no trades to split",
            );
            return StageOutput::with_warnings(None, vec![warning]);
        };

        let span = (last - first).num_seconds() + 1;
        let bounds = window_bounds(
            span,
            self.settings.window_count,
            self.settings.in_sample_ratio,
            self.settings.mode,
        );
        if bounds.is_empty() {
            return self.not_enough_data(format!("trade history of {span}s is too short to split"));
        }
        info!(
            strategy = %backtest.strategy_id(),
            windows = bounds.len(),
            "Running walk-forward trade split."
        );

        let ppy = backtest.timeframe().periods_per_year();
        let capital = backtest.initial_capital();
        let at = |offset: i64| first + Duration::seconds(offset);
        let select = |range: &Range<i64>| -> Vec<Trade> {
            let (from, to) = (at(range.start), at(range.end));
            trades
                .iter()
                .filter(|t| t.entry_time >= from && t.entry_time < to)
                .cloned()
                .collect()
        };

        let runs: Vec<Option<WindowRun>> = bounds
            .par_iter()
            .enumerate()
            .map(|(index, b)| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(WindowRun {
                    index,
                    in_sample_start: at(b.in_sample.start),
                    in_sample_end: at(b.in_sample.end),
                    out_of_sample_end: at(b.out_of_sample.end),
                    params: StrategyParams::new(),
                    in_sample: self.metrics(capital, &select(&b.in_sample), ppy),
                    out_of_sample: self.metrics(capital, &select(&b.out_of_sample), ppy),
                })
            })
            .collect();

        self.finish(WalkForwardSource::TradeSplit, runs)
    }

    fn metrics(&self, capital: Decimal, trades: &[Trade], ppy: f64) -> ProfitMetrics {
        self.analyzer.analyze_trades(capital, trades, ppy).value
    }

    fn not_enough_data(&self, message: String) -> StageOutput<Option<WalkForwardResult>> {
        warn!(%message, "Walk-forward skipped.");
        StageOutput::with_warnings(
            None,
            vec![Warning::new(Stage::WalkForward, WarningKind::InsufficientData, message)],
        )
    }

    fn finish(
        &self,
        source: WalkForwardSource,
        runs: Vec<Option<WindowRun>>,
    ) -> StageOutput<Option<WalkForwardResult>> {
        let mut warnings = Vec::new();
        let planned = runs.len();
        let runs: Vec<WindowRun> = runs.into_iter().flatten().collect();
        let cancelled = runs.len() < planned;
        if cancelled {
            warnings.push(Warning::new(
                Stage::WalkForward,
                WarningKind::Cancelled,
                format!("{} of {planned} windows evaluated before cancellation", runs.len()),
            ));
        }

        let min_trades = self.settings.min_trades_per_window;
        let thin = runs
            .iter()
            .filter(|r| {
                r.in_sample.total_trades < min_trades || r.out_of_sample.total_trades < min_trades
            })
            .count();
        if thin > 0 {
            warnings.push(Warning::new(
                Stage::WalkForward,
                WarningKind::InsufficientData,
                format!("{thin} window(s) hold fewer than {min_trades} trades on one side"),
            ));
        }

        let windows: Vec<WalkForwardWindow> = runs.into_iter().map(|r| self.judge(r)).collect();
        let result = self.summarize(source, windows, cancelled);
        if result.overfitting_detected {
            warn!(
                score = result.overfitting_score,
                ceiling = self.settings.overfitting_ceiling,
                "Overfitting detected."
            );
            warnings.push(Warning::new(
                Stage::WalkForward,
                WarningKind::Overfitting,
                format!(
                    "overfitting score {:.1} exceeds {:.1}; out-of-sample keeps {:.0}% of in-sample Sharpe",
                    result.overfitting_score,
                    self.settings.overfitting_ceiling,
                    result.oos_is_ratio * 100.0
                ),
            ));
        }
        StageOutput::with_warnings(Some(result), warnings)
    }

    fn judge(&self, run: WindowRun) -> WalkForwardWindow {
        let (is_sharpe, oos_sharpe) = (run.in_sample.sharpe, run.out_of_sample.sharpe);
        let ratio = oos_is_ratio(is_sharpe, oos_sharpe);
        let passed =
            oos_sharpe >= self.settings.min_oos_sharpe && ratio >= self.settings.min_oos_is_ratio;
        debug!(
            window = run.index,
            is_sharpe, oos_sharpe, passed, "Walk-forward window judged."
        );
        WalkForwardWindow {
            index: run.index,
            in_sample_start: run.in_sample_start,
            in_sample_end: run.in_sample_end,
            out_of_sample_start: run.in_sample_end,
            out_of_sample_end: run.out_of_sample_end,
            params: run.params,
            in_sample: run.in_sample,
            out_of_sample: run.out_of_sample,
            degradation: window_degradation(is_sharpe, oos_sharpe),
            oos_is_ratio: ratio,
            passed,
        }
    }

    /// Rolls judged windows up into the stage result.
    pub fn summarize(
        &self,
        source: WalkForwardSource,
        windows: Vec<WalkForwardWindow>,
        cancelled: bool,
    ) -> WalkForwardResult {
        let is_sharpes: Vec<f64> = windows.iter().map(|w| w.in_sample.sharpe).collect();
        let oos_sharpes: Vec<f64> = windows.iter().map(|w| w.out_of_sample.sharpe).collect();
        let degradations: Vec<f64> = windows.iter().map(|w| w.degradation).collect();

        let mean_in_sample_sharpe = stats::mean(&is_sharpes);
        let mean_out_of_sample_sharpe = stats::mean(&oos_sharpes);
        let (overfitting_score, instability) = overfitting_score(&degradations, &oos_sharpes);
        let pass_rate = if windows.is_empty() {
            0.0
        } else {
            windows.iter().filter(|w| w.passed).count() as f64 / windows.len() as f64
        };

        WalkForwardResult {
            source,
            mode: self.settings.mode,
            mean_in_sample_sharpe,
            mean_out_of_sample_sharpe,
            oos_is_ratio: if mean_in_sample_sharpe > 0.0 {
                (mean_out_of_sample_sharpe / mean_in_sample_sharpe).max(0.0)
            } else {
                0.0
            },
            mean_degradation: stats::mean(&degradations),
            instability,
            overfitting_score,
            overfitting_detected: !windows.is_empty()
                && overfitting_score > self.settings.overfitting_ceiling,
            pass_rate,
            passed: !windows.is_empty() && pass_rate >= self.settings.min_pass_rate,
            windows,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{Kline, MarketSlice, RunMetadata, Side, Symbol, Timeframe};
    use rust_decimal_macros::dec;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn validator(mode: WindowMode) -> WalkForwardValidator {
        let settings = WalkForwardSettings {
            mode,
            ..Default::default()
        };
        WalkForwardValidator::new(settings, ProfitabilityAnalyzer::default()).unwrap()
    }

    fn trade(day: i64, pnl: Decimal) -> Trade {
        Trade {
            entry_time: base() + Duration::days(day),
            exit_time: base() + Duration::days(day) + Duration::hours(12),
            side: Side::Long,
            entry_price: dec!(100),
            exit_price: dec!(100) + pnl,
            quantity: dec!(1),
            fee: dec!(0),
            pnl,
            signal_price: None,
            signal_time: None,
            requested_quantity: None,
        }
    }

    /// Judged window with only the Sharpe ratios filled in.
    fn window(v: &WalkForwardValidator, index: usize, is_sharpe: f64, oos_sharpe: f64) -> WalkForwardWindow {
        let mut is_metrics = v.metrics(dec!(10_000), &[], 365.0);
        is_metrics.sharpe = is_sharpe;
        let mut oos_metrics = is_metrics.clone();
        oos_metrics.sharpe = oos_sharpe;
        v.judge(WindowRun {
            index,
            in_sample_start: base(),
            in_sample_end: base(),
            out_of_sample_end: base(),
            params: StrategyParams::new(),
            in_sample: is_metrics,
            out_of_sample: oos_metrics,
        })
    }

    #[test]
    fn rolling_windows_tile_the_range() {
        let bounds = window_bounds(100, 5, 0.7, WindowMode::Rolling);
        assert_eq!(bounds.len(), 5);
        assert_eq!(bounds[0].in_sample, 0..14);
        assert_eq!(bounds[0].out_of_sample, 14..20);
        assert_eq!(bounds[4].out_of_sample.end, 100);
        for pair in bounds.windows(2) {
            assert_eq!(pair[0].out_of_sample.end, pair[1].in_sample.start);
        }
    }

    #[test]
    fn anchored_windows_grow_from_the_start() {
        let bounds = window_bounds(100, 5, 0.7, WindowMode::Anchored);
        assert!(bounds.iter().all(|b| b.in_sample.start == 0));
        assert_eq!(bounds[2].in_sample, 0..54);
        assert_eq!(bounds[2].out_of_sample, 54..60);
    }

    #[test]
    fn too_little_data_forms_no_windows() {
        assert!(window_bounds(7, 5, 0.7, WindowMode::Rolling).is_empty());
    }

    #[test]
    fn degradation_edges() {
        assert_eq!(window_degradation(2.0, 1.0), 0.5);
        assert_eq!(window_degradation(1.0, 3.0), 0.0);
        assert_eq!(window_degradation(1.0, -1.0), 1.0);
        assert_eq!(window_degradation(-0.5, -1.0), 1.0);
        assert_eq!(window_degradation(0.0, 0.8), 0.0);
    }

    #[test]
    fn oos_at_thirty_percent_of_is_is_overfit() {
        let v = validator(WindowMode::Rolling);
        let windows: Vec<WalkForwardWindow> = [2.0, 1.8, 2.2, 1.6, 2.4]
            .iter()
            .enumerate()
            .map(|(i, is)| window(&v, i, *is, is * 0.3))
            .collect();
        let result = v.summarize(WalkForwardSource::Replay, windows, false);

        assert!((result.mean_degradation - 0.7).abs() < 1e-9);
        assert!(result.overfitting_score > 56.0);
        assert!(result.overfitting_detected);
        assert_eq!(result.pass_rate, 0.0);
        assert!(result.pass_rate < v.settings().min_pass_rate);
        assert!(!result.passed);
        assert!((result.oos_is_ratio - 0.3).abs() < 1e-9);
    }

    #[test]
    fn stable_windows_pass() {
        let v = validator(WindowMode::Rolling);
        let windows: Vec<WalkForwardWindow> = (0..5).map(|i| window(&v, i, 1.5, 1.4)).collect();
        let result = v.summarize(WalkForwardSource::Replay, windows, false);
        assert!(!result.overfitting_detected);
        assert!(result.overfitting_score < 10.0);
        assert_eq!(result.pass_rate, 1.0);
        assert!(result.passed);
    }

    #[test]
    fn consistent_trades_split_cleanly() {
        let trades: Vec<Trade> = (0..200)
            .map(|d| trade(d, if d % 3 == 2 { dec!(-10) } else { dec!(30) }))
            .collect();
        let meta = RunMetadata {
            strategy_id: "steady".into(),
            run_id: "r1".into(),
            symbol: Symbol::from("BTCUSDT"),
            timeframe: Timeframe::parse("1d").unwrap(),
        };
        let backtest = BacktestResult::new(meta, dec!(10_000), trades, None, 30).unwrap();
        let out = validator(WindowMode::Rolling).run_trade_split(&backtest, &CancelToken::new());
        assert!(!out.has(WarningKind::Overfitting));
        let result = out.value.unwrap();

        assert_eq!(result.source, WalkForwardSource::TradeSplit);
        assert_eq!(result.windows.len(), 5);
        assert!(result.windows.iter().all(|w| w.out_of_sample.total_trades > 0));
        assert!(!result.overfitting_detected);
        assert!(result.passed);
    }

    #[test]
    fn empty_backtest_skips_the_stage() {
        let meta = RunMetadata {
            strategy_id: "empty".into(),
            run_id: "r1".into(),
            symbol: Symbol::from("BTCUSDT"),
            timeframe: Timeframe::parse("1d").unwrap(),
        };
        let backtest = BacktestResult::new(meta, dec!(10_000), Vec::new(), None, 30).unwrap();
        let out = validator(WindowMode::Rolling).run_trade_split(&backtest, &CancelToken::new());
        assert!(out.value.is_none());
        assert!(out.has(WarningKind::StageSkipped));
    }

    struct BarByBar;

    impl StrategyRunner for BarByBar {
        fn name(&self) -> &str {
            "bar-by-bar"
        }

        fn run(&self, market: &MarketSlice<'_>, _params: &StrategyParams) -> Vec<Trade> {
            market
                .klines
                .windows(2)
                .map(|w| Trade {
                    entry_time: w[0].open_time,
                    exit_time: w[1].open_time,
                    side: Side::Long,
                    entry_price: w[0].close,
                    exit_price: w[1].close,
                    quantity: dec!(1),
                    fee: dec!(0),
                    pnl: w[1].close - w[0].close,
                    signal_price: None,
                    signal_time: None,
                    requested_quantity: None,
                })
                .collect()
        }

        fn optimize(&self, _in_sample: &MarketSlice<'_>, base: &StrategyParams) -> StrategyParams {
            let mut tuned = base.clone();
            tuned.insert("tuned".into(), 1.0);
            tuned
        }
    }

    fn rising_market(bars: i64) -> MarketData {
        let mut price = dec!(100);
        let klines = (0..bars)
            .map(|i| {
                price += if i % 4 == 3 { dec!(-0.5) } else { dec!(1) };
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
        MarketData::new(Symbol::from("BTCUSDT"), Timeframe::parse("1d").unwrap(), klines)
    }

    #[test]
    fn replay_tunes_in_sample_and_measures_after_the_split() {
        let market = rising_market(120);
        let base_params = StrategyParams::from([("fast".to_string(), 12.0)]);
        let out = validator(WindowMode::Anchored).run_replay(
            &BarByBar,
            &base_params,
            &market,
            dec!(10_000),
            &CancelToken::new(),
        );
        let result = out.value.unwrap();

        assert_eq!(result.source, WalkForwardSource::Replay);
        assert_eq!(result.windows.len(), 5);
        for w in &result.windows {
            assert_eq!(w.in_sample_start, base());
            assert_eq!(w.params.get("tuned"), Some(&1.0));
            assert_eq!(w.params.get("fast"), Some(&12.0));
            assert!(w.out_of_sample.total_trades > 0);
            assert!(w.out_of_sample_start > w.in_sample_start);
        }
    }

    #[test]
    fn cancelled_replay_reports_partial_windows() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = validator(WindowMode::Rolling).run_replay(
            &BarByBar,
            &StrategyParams::new(),
            &rising_market(120),
            dec!(10_000),
            &cancel,
        );
        assert!(out.has(WarningKind::Cancelled));
        let result = out.value.unwrap();
        assert!(result.cancelled);
        assert!(result.windows.is_empty());
        assert!(!result.passed);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = WalkForwardSettings {
            in_sample_ratio: 1.2,
            ..Default::default()
        };
        assert!(WalkForwardValidator::new(settings, ProfitabilityAnalyzer::default()).is_err());
    }
}
