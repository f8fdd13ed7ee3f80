// In crates/strategies/src/ma_crossover.rs

use analytics::ProfitabilityAnalyzer;
use chrono::{DateTime, Duration, Utc};
use core_types::{Kline, MarketSlice, Side, StrategyParams, StrategyRunner, Trade};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use ta::Next;
use ta::indicators::ExponentialMovingAverage as Ema;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{ALLOW_SHORT, EmaCrossoverSettings, FAST_PERIOD, SLOW_PERIOD, Signal};

/// Capital the optimizer measures candidate runs against.
const RANKING_CAPITAL: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

// Indicator state for one pass over a price series.
struct Crossover {
    fast: Ema,
    slow: Ema,
    warmup: usize,
    seen: usize,
    last: Option<(f64, f64)>,
}

impl Crossover {
    fn new(fast_period: usize, slow_period: usize) -> Result<Self> {
        let ema = |name: &str, period: usize| {
            Ema::new(period).map_err(|e| Error::InvalidParameter {
                name: name.to_string(),
                reason: e.to_string(),
            })
        };
        Ok(Self {
            fast: ema(FAST_PERIOD, fast_period)?,
            slow: ema(SLOW_PERIOD, slow_period)?,
            warmup: slow_period,
            seen: 0,
            last: None,
        })
    }

    fn assess(&mut self, close: f64) -> Signal {
        let fast = self.fast.next(close);
        let slow = self.slow.next(close);
        self.seen += 1;
        let previous = self.last.replace((fast, slow));

        // Both averages need a full slow period before a cross means anything.
        if self.seen <= self.warmup {
            return Signal::Hold;
        }
        match previous {
            Some((pf, ps)) if fast > slow && pf <= ps => Signal::GoLong,
            Some((pf, ps)) if fast < slow && pf >= ps => Signal::GoShort,
            _ => Signal::Hold,
        }
    }
}

struct OpenPosition {
    side: Side,
    entry_time: DateTime<Utc>,
    entry_price: Decimal,
    quantity: Decimal,
    signal_price: Decimal,
    signal_time: DateTime<Utc>,
}

struct PendingOrder {
    signal: Signal,
    price: Decimal,
    time: DateTime<Utc>,
}

/// EMA crossover: long when the fast average crosses above the slow one,
/// short (or flat) on the opposite cross.
///
/// Signals are computed on a bar's close and filled at the next bar's open.
/// An open position is closed at the last close of the slice.
#[derive(Debug, Clone, Default)]
pub struct EmaCrossover {
    settings: EmaCrossoverSettings,
    analyzer: ProfitabilityAnalyzer,
}

impl EmaCrossover {
    pub fn new(settings: EmaCrossoverSettings) -> Self {
        Self {
            settings,
            analyzer: ProfitabilityAnalyzer::default(),
        }
    }

    pub fn settings(&self) -> &EmaCrossoverSettings {
        &self.settings
    }

    /// The configured parameters as a parameter map.
    pub fn base_params(&self) -> StrategyParams {
        StrategyParams::from([
            (FAST_PERIOD.to_string(), self.settings.fast_period as f64),
            (SLOW_PERIOD.to_string(), self.settings.slow_period as f64),
            (ALLOW_SHORT.to_string(), if self.settings.allow_short { 1.0 } else { 0.0 }),
        ])
    }

    /// Reads `(fast, slow, allow_short)` from `params`, falling back to settings.
    pub fn resolve(&self, params: &StrategyParams) -> Result<(usize, usize, bool)> {
        let period = |name: &str, default: usize| -> Result<usize> {
            match params.get(name) {
                None => Ok(default),
                Some(v) if v.is_finite() && *v >= 1.0 && v.fract() == 0.0 => Ok(*v as usize),
                Some(v) => Err(Error::InvalidParameter {
                    name: name.to_string(),
                    reason: format!("expected a positive whole number, got {v}"),
                }),
            }
        };
        let fast = period(FAST_PERIOD, self.settings.fast_period)?;
        let slow = period(SLOW_PERIOD, self.settings.slow_period)?;
        if fast >= slow {
            return Err(Error::InvalidParameter {
                name: FAST_PERIOD.to_string(),
                reason: format!("fast period {fast} must be below slow period {slow}"),
            });
        }
        let allow_short = params
            .get(ALLOW_SHORT)
            .map_or(self.settings.allow_short, |v| *v != 0.0);
        Ok((fast, slow, allow_short))
    }

    fn simulate(
        &self,
        market: &MarketSlice<'_>,
        fast: usize,
        slow: usize,
        allow_short: bool,
    ) -> Result<Vec<Trade>> {
        let mut crossover = Crossover::new(fast, slow)?;
        let bar = Duration::seconds(market.timeframe.seconds());
        let mut trades = Vec::new();
        let mut position: Option<OpenPosition> = None;
        let mut pending: Option<PendingOrder> = None;

        for kline in market.klines {
            // 1. Fill yesterday's signal at this bar's open.
            if let Some(order) = pending.take() {
                let target = match order.signal {
                    Signal::GoLong => Some(Side::Long),
                    Signal::GoShort if allow_short => Some(Side::Short),
                    Signal::GoShort | Signal::Hold => None,
                };
                if position.as_ref().is_some_and(|p| Some(p.side) != target) {
                    if let Some(open) = position.take() {
                        trades.push(self.close(open, kline.open_time, kline.open));
                    }
                }
                if position.is_none() {
                    if let Some(side) = target {
                        position = self.open(side, kline, &order);
                    }
                }
            }

            // 2. Update the averages on the close.
            let Some(close) = kline.close.to_f64() else {
                continue;
            };
            let signal = crossover.assess(close);
            if signal != Signal::Hold {
                pending = Some(PendingOrder {
                    signal,
                    price: kline.close,
                    time: kline.open_time + bar,
                });
            }
        }

        // 3. Flatten at the end of the slice.
        if let (Some(open), Some(last)) = (position, market.klines.last()) {
            trades.push(self.close(open, last.open_time + bar, last.close));
        }
        Ok(trades)
    }

    fn open(&self, side: Side, kline: &Kline, order: &PendingOrder) -> Option<OpenPosition> {
        if kline.open <= Decimal::ZERO {
            return None;
        }
        let quantity = (self.settings.order_size / kline.open).round_dp(8);
        (quantity > Decimal::ZERO).then(|| OpenPosition {
            side,
            entry_time: kline.open_time,
            entry_price: kline.open,
            quantity,
            signal_price: order.price,
            signal_time: order.time,
        })
    }

    fn close(&self, open: OpenPosition, exit_time: DateTime<Utc>, exit_price: Decimal) -> Trade {
        let fee = (open.entry_price + exit_price) * open.quantity * self.settings.fee_rate_bps
            / Decimal::from(10_000);
        let pnl = (exit_price - open.entry_price) * open.quantity * open.side.direction() - fee;
        Trade {
            entry_time: open.entry_time,
            exit_time,
            side: open.side,
            entry_price: open.entry_price,
            exit_price,
            quantity: open.quantity,
            fee,
            pnl,
            signal_price: Some(open.signal_price),
            signal_time: Some(open.signal_time),
            requested_quantity: Some(open.quantity),
        }
    }
}

impl StrategyRunner for EmaCrossover {
    fn name(&self) -> &str {
        "ema_crossover"
    }

    fn run(&self, market: &MarketSlice<'_>, params: &StrategyParams) -> Vec<Trade> {
        let outcome = self
            .resolve(params)
            .and_then(|(fast, slow, allow_short)| self.simulate(market, fast, slow, allow_short));
        match outcome {
            Ok(trades) => trades,
            Err(e) => {
                warn!(error = %e, symbol = %market.symbol, "Strategy run skipped.");
                Vec::new()
            }
        }
    }

    /// Grid search over `fast_grid × slow_grid`, ranked by in-sample Sharpe.
    fn optimize(&self, in_sample: &MarketSlice<'_>, base: &StrategyParams) -> StrategyParams {
        let allow_short = base
            .get(ALLOW_SHORT)
            .map_or(self.settings.allow_short, |v| *v != 0.0);
        let ppy = in_sample.timeframe.periods_per_year();

        let mut best: Option<(f64, usize, usize)> = None;
        for &fast in &self.settings.fast_grid {
            for &slow in self.settings.slow_grid.iter().filter(|s| **s > fast) {
                let Ok(trades) = self.simulate(in_sample, fast, slow, allow_short) else {
                    continue;
                };
                if trades.len() < self.settings.min_trades_to_rank {
                    continue;
                }
                let sharpe = self
                    .analyzer
                    .analyze_trades(RANKING_CAPITAL, &trades, ppy)
                    .value
                    .sharpe;
                if best.is_none_or(|(s, _, _)| sharpe > s) {
                    best = Some((sharpe, fast, slow));
                }
            }
        }

        let mut tuned = base.clone();
        if let Some((sharpe, fast, slow)) = best {
            debug!(fast, slow, sharpe, bars = in_sample.klines.len(), "In-sample parameters chosen.");
            tuned.insert(FAST_PERIOD.to_string(), fast as f64);
            tuned.insert(SLOW_PERIOD.to_string(), slow as f64);
        }
        tuned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{Symbol, Timeframe};
    use rust_decimal_macros::dec;

    fn klines(closes: impl Iterator<Item = f64>) -> Vec<Kline> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut previous: Option<Decimal> = None;
        closes
            .enumerate()
            .map(|(i, c)| {
                let close = Decimal::try_from(c).unwrap().round_dp(4);
                let open = previous.unwrap_or(close);
                previous = Some(close);
                Kline {
                    open_time: base + Duration::hours(i as i64),
                    open,
                    high: open.max(close),
                    low: open.min(close),
                    close,
                    volume: dec!(1000),
                }
            })
            .collect()
    }

    fn sine(bars: usize) -> Vec<Kline> {
        klines((0..bars).map(|i| 100.0 + 10.0 * (i as f64 * std::f64::consts::TAU / 60.0).sin()))
    }

    fn run(strategy: &EmaCrossover, bars: &[Kline], params: &StrategyParams) -> Vec<Trade> {
        let symbol = Symbol::from("BTCUSDT");
        let timeframe = Timeframe::parse("1h").unwrap();
        strategy.run(&MarketSlice::new(&symbol, &timeframe, bars), params)
    }

    #[test]
    fn oscillating_prices_trade_both_ways() {
        let strategy = EmaCrossover::default();
        let trades = run(&strategy, &sine(600), &strategy.base_params());

        assert!(trades.len() >= 10);
        assert!(trades.iter().any(|t| t.side == Side::Long));
        assert!(trades.iter().any(|t| t.side == Side::Short));
        for t in &trades {
            assert!(t.exit_time >= t.entry_time);
            assert!(t.fee > Decimal::ZERO);
            assert_eq!(t.requested_quantity, Some(t.quantity));
            assert!(t.signal_time.unwrap() <= t.entry_time);
        }
        // Positions flip: each exit is the next entry.
        for pair in trades.windows(2) {
            assert_eq!(pair[0].exit_time, pair[1].entry_time);
        }
    }

    #[test]
    fn long_only_never_shorts() {
        let strategy = EmaCrossover::new(EmaCrossoverSettings {
            allow_short: false,
            ..Default::default()
        });
        let trades = run(&strategy, &sine(600), &strategy.base_params());
        assert!(!trades.is_empty());
        assert!(trades.iter().all(|t| t.side == Side::Long));
    }

    #[test]
    fn a_steady_uptrend_is_profitable_long() {
        let strategy = EmaCrossover::default();
        let bars = klines((0..200).map(|i| {
            if i < 40 { 100.0 - 0.2 * i as f64 } else { 92.0 + 0.5 * (i - 40) as f64 }
        }));
        let trades = run(&strategy, &bars, &strategy.base_params());
        let last = trades.last().unwrap();
        assert_eq!(last.side, Side::Long);
        assert!(last.pnl > Decimal::ZERO);
    }

    #[test]
    fn inverted_periods_are_rejected() {
        let strategy = EmaCrossover::default();
        let params = StrategyParams::from([
            (FAST_PERIOD.to_string(), 30.0),
            (SLOW_PERIOD.to_string(), 10.0),
        ]);
        assert!(strategy.resolve(&params).is_err());
        assert!(run(&strategy, &sine(300), &params).is_empty());
    }

    #[test]
    fn fractional_periods_are_rejected() {
        let params = StrategyParams::from([(FAST_PERIOD.to_string(), 2.5)]);
        assert!(EmaCrossover::default().resolve(&params).is_err());
    }

    #[test]
    fn optimize_picks_from_the_grid_and_keeps_other_keys() {
        let strategy = EmaCrossover::default();
        let bars = sine(600);
        let symbol = Symbol::from("BTCUSDT");
        let timeframe = Timeframe::parse("1h").unwrap();
        let slice = MarketSlice::new(&symbol, &timeframe, &bars);

        let mut base = strategy.base_params();
        base.insert("order_tag".to_string(), 7.0);
        let tuned = strategy.optimize(&slice, &base);
        let again = strategy.optimize(&slice, &base);

        assert_eq!(tuned, again);
        assert_eq!(tuned.get("order_tag"), Some(&7.0));
        let fast = tuned[FAST_PERIOD] as usize;
        let slow = tuned[SLOW_PERIOD] as usize;
        assert!(strategy.settings().fast_grid.contains(&fast));
        assert!(strategy.settings().slow_grid.contains(&slow));
        assert!(fast < slow);
    }

    #[test]
    fn flat_series_keeps_base_parameters() {
        let strategy = EmaCrossover::default();
        let bars = klines((0..300).map(|_| 100.0));
        let symbol = Symbol::from("BTCUSDT");
        let timeframe = Timeframe::parse("1h").unwrap();
        let base = strategy.base_params();
        let tuned = strategy.optimize(&MarketSlice::new(&symbol, &timeframe, &bars), &base);
        assert_eq!(tuned, base);
    }
}
