// In crates/pipeline/tests/evaluate.rs

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use core_types::{
    BacktestResult, CancelToken, Kline, MarketData, RunMetadata, StrategyRunner, Symbol, Timeframe,
    WarningKind,
};
use cost_model::{LiquidityInfo, LiquidityTier};
use pipeline::{MarketInput, Pipeline, PipelineSettings, WalkForwardData};
use readiness::{ReadinessStatus, RecommendationSource};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use strategies::EmaCrossover;
use validation::WalkForwardSource;

const BARS: usize = 2_000;

/// Hourly bars oscillating around a gentle uptrend.
fn market(symbol: &str, phase: f64) -> MarketData {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut previous: Option<Decimal> = None;
    let klines = (0..BARS)
        .map(|i| {
            let t = i as f64;
            let price = 100.0 + 0.01 * t + 8.0 * (t * std::f64::consts::TAU / 60.0 + phase).sin();
            let close = Decimal::try_from(price).unwrap().round_dp(4);
            let open = previous.unwrap_or(close);
            previous = Some(close);
            Kline {
                open_time: base + Duration::hours(i as i64),
                open,
                high: open.max(close) + dec!(0.2),
                low: open.min(close) - dec!(0.2),
                close,
                volume: dec!(5000),
            }
        })
        .collect();
    MarketData::new(Symbol::from(symbol), Timeframe::parse("1h").unwrap(), klines)
}

fn datasets(primary: &str) -> Vec<MarketData> {
    vec![
        market(primary, 0.0),
        market("ETHUSDT", 1.0),
        market("SOLUSDT", 2.0),
    ]
}

fn backtest(symbol: &str, data: &MarketData, strategy: &EmaCrossover) -> BacktestResult {
    let trades = strategy.run(&data.as_slice(), &strategy.base_params());
    let meta = RunMetadata {
        strategy_id: "ema_crossover".to_string(),
        run_id: "run-1".to_string(),
        symbol: Symbol::from(symbol),
        timeframe: Timeframe::parse("1h").unwrap(),
    };
    BacktestResult::new(meta, dec!(10_000), trades, None, 30).unwrap()
}

fn settings(worker_threads: usize) -> PipelineSettings {
    let mut settings = PipelineSettings {
        worker_threads,
        ..PipelineSettings::default()
    };
    settings.cost_model.liquidity = vec![LiquidityInfo {
        symbol: Symbol::from("BTCUSDT"),
        volume_24h_usd: 2e10,
        spread_bps: None,
        depth_usd: None,
    }];
    settings
}

fn scenario(symbol: &str) -> (BacktestResult, MarketInput) {
    let strategy = EmaCrossover::default();
    let data = datasets(symbol);
    let backtest = backtest(symbol, &data[0], &strategy);
    let base = strategy.base_params();
    let input = MarketInput::new(data).with_runner(Arc::new(strategy), base);
    (backtest, input)
}

#[test]
fn evaluation_is_idempotent() {
    let pipeline = Pipeline::new(settings(4)).unwrap();
    let (backtest, input) = scenario("BTCUSDT");
    let cancel = CancelToken::new();

    let first = pipeline.evaluate(&backtest, &input, &cancel).unwrap();
    let second = pipeline.evaluate(&backtest, &input, &cancel).unwrap();
    assert_eq!(first, second);

    assert!(backtest.trades().len() >= 30, "only {} trades", backtest.trades().len());
    assert!(first.score.is_some());
    assert_ne!(first.status, ReadinessStatus::Evaluating);
    let wf = first.artifacts.walk_forward.as_ref().unwrap();
    assert_eq!(wf.source, WalkForwardSource::Replay);
    assert_eq!(first.artifacts.multi_market.as_ref().unwrap().summary.cells_tested, 3);
    assert!(first.artifacts.monte_carlo.is_some());
}

#[test]
fn pool_size_does_not_change_the_report() {
    let (backtest, input) = scenario("BTCUSDT");
    let cancel = CancelToken::new();
    let single = Pipeline::new(settings(1)).unwrap().evaluate(&backtest, &input, &cancel).unwrap();
    let wide = Pipeline::new(settings(6)).unwrap().evaluate(&backtest, &input, &cancel).unwrap();
    assert_eq!(single, wide);
}

#[test]
fn unknown_symbol_costs_as_very_low_liquidity_and_is_flagged() {
    let pipeline = Pipeline::new(settings(2)).unwrap();
    let (backtest, input) = scenario("NEWCOINXYZ");
    let report = pipeline.evaluate(&backtest, &input, &CancelToken::new()).unwrap();

    let cost = report.artifacts.cost.as_ref().unwrap();
    assert_eq!(cost.per_trade.liquidity.tier, LiquidityTier::VeryLow);
    assert!(!cost.per_trade.liquidity.known);
    assert!(report.warnings.iter().any(|w| w.kind == WarningKind::UnknownLiquidity));
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.source == RecommendationSource::Warning(WarningKind::UnknownLiquidity)));
    assert_ne!(report.status, ReadinessStatus::Approved);
}

#[test]
fn zero_trades_are_inconclusive_not_rejected() {
    let pipeline = Pipeline::new(settings(2)).unwrap();
    let meta = RunMetadata {
        strategy_id: "idle".to_string(),
        run_id: "run-0".to_string(),
        symbol: Symbol::from("BTCUSDT"),
        timeframe: Timeframe::parse("1h").unwrap(),
    };
    let backtest = BacktestResult::new(meta, dec!(10_000), Vec::new(), None, 30).unwrap();
    let report = pipeline
        .evaluate(&backtest, &MarketInput::default(), &CancelToken::new())
        .unwrap();

    assert_eq!(report.status, ReadinessStatus::Evaluating);
    assert!(report.is_inconclusive());
    assert!(report.score.is_none());
    assert!(report.critical_failures.is_empty());
    assert!(report.warnings.iter().any(|w| w.kind == WarningKind::InsufficientData));
    assert_eq!(report.artifacts.profit.total_trades, 0);
}

#[test]
fn trade_split_needs_no_runner_or_klines() {
    let pipeline = Pipeline::new(settings(2)).unwrap();
    let (backtest, _) = scenario("BTCUSDT");
    let input = MarketInput::default().with_walk_forward(WalkForwardData::TradeSplit);
    let report = pipeline.evaluate(&backtest, &input, &CancelToken::new()).unwrap();

    assert!(report.artifacts.multi_market.is_none());
    assert!(report.warnings.iter().any(|w| w.kind == WarningKind::StageSkipped));
    if let Some(wf) = &report.artifacts.walk_forward {
        assert_eq!(wf.source, WalkForwardSource::TradeSplit);
    }
}

#[test]
fn cancellation_yields_a_partial_report() {
    let pipeline = Pipeline::new(settings(2)).unwrap();
    let (backtest, input) = scenario("BTCUSDT");
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = pipeline.evaluate(&backtest, &input, &cancel).unwrap();
    assert!(report.warnings.iter().any(|w| w.kind == WarningKind::Cancelled));
    assert!(report.artifacts.monte_carlo.is_none());
    let mm = report.artifacts.multi_market.as_ref().unwrap();
    assert!(mm.summary.cancelled);
    assert_ne!(report.status, ReadinessStatus::Approved);
}

#[tokio::test]
async fn async_entry_point_matches_sync() {
    let pipeline = Arc::new(Pipeline::new(settings(2)).unwrap());
    let (backtest, input) = scenario("BTCUSDT");
    let cancel = CancelToken::new();

    let sync = pipeline.evaluate(&backtest, &input, &cancel).unwrap();
    let from_async = Arc::clone(&pipeline)
        .evaluate_async(Arc::new(backtest), input, cancel)
        .await
        .unwrap();
    assert_eq!(sync, from_async);
}
