// In crates/validation/src/regime.rs

use analytics::stats;
use core_types::MarketSlice;
use rust_decimal::prelude::ToPrimitive;

use crate::types::{MarketRegime, RegimeClassification, RegimeSettings, VolatilityTier};

/// Classifies the realized regime of a price series.
///
/// Needs at least two bars with positive closes; returns `None` otherwise.
pub fn classify(market: &MarketSlice<'_>, settings: &RegimeSettings) -> Option<RegimeClassification> {
    let closes: Vec<f64> = market
        .klines
        .iter()
        .filter_map(|k| k.close.to_f64())
        .filter(|c| *c > 0.0)
        .collect();
    if closes.len() < 2 {
        return None;
    }
    let first_open = market
        .klines
        .first()
        .and_then(|k| k.open.to_f64())
        .filter(|o| *o > 0.0)
        .unwrap_or(closes[0]);
    let last_close = closes[closes.len() - 1];
    let period_return = last_close / first_open - 1.0;

    let log_returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let annualized_volatility = if log_returns.len() >= 2 {
        stats::sample_std(&log_returns) * market.timeframe.periods_per_year().sqrt()
    } else {
        0.0
    };

    let regime = if annualized_volatility > settings.volatile_annualized {
        MarketRegime::Volatile
    } else if period_return > settings.bull_return {
        MarketRegime::Bull
    } else if period_return < settings.bear_return {
        MarketRegime::Bear
    } else {
        MarketRegime::Sideways
    };

    let [low, medium, high] = settings.volatility_tiers;
    let volatility_tier = match annualized_volatility {
        v if v < low => VolatilityTier::Low,
        v if v < medium => VolatilityTier::Medium,
        v if v < high => VolatilityTier::High,
        _ => VolatilityTier::Extreme,
    };

    Some(RegimeClassification {
        regime,
        volatility_tier,
        period_return,
        annualized_volatility,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use core_types::{Kline, Symbol, Timeframe};
    use rust_decimal::Decimal;

    fn series(closes: &[f64]) -> Vec<Kline> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let price = Decimal::try_from(*c).unwrap();
                Kline {
                    open_time: base + Duration::days(i as i64),
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: Decimal::ONE,
                }
            })
            .collect()
    }

    fn classify_closes(closes: &[f64]) -> RegimeClassification {
        let symbol = Symbol::from("BTCUSDT");
        let timeframe = Timeframe::parse("1d").unwrap();
        let klines = series(closes);
        classify(
            &MarketSlice::new(&symbol, &timeframe, &klines),
            &RegimeSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn steady_uptrend_is_bull_and_calm() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 * 1.003f64.powi(i)).collect();
        let c = classify_closes(&closes);
        assert_eq!(c.regime, MarketRegime::Bull);
        assert_eq!(c.volatility_tier, VolatilityTier::Low);
        assert!(c.period_return > 0.10);
    }

    #[test]
    fn steady_downtrend_is_bear() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 * 0.997f64.powi(i)).collect();
        assert_eq!(classify_closes(&closes).regime, MarketRegime::Bear);
    }

    #[test]
    fn choppy_flat_series_is_sideways() {
        let closes: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 100.0 } else { 100.5 })
            .collect();
        let c = classify_closes(&closes);
        assert_eq!(c.regime, MarketRegime::Sideways);
    }

    #[test]
    fn wild_swings_override_direction() {
        let closes: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 100.0 } else { 110.0 })
            .collect();
        let c = classify_closes(&closes);
        assert_eq!(c.regime, MarketRegime::Volatile);
        assert_eq!(c.volatility_tier, VolatilityTier::Extreme);
    }

    #[test]
    fn a_single_bar_cannot_be_classified() {
        let symbol = Symbol::from("BTCUSDT");
        let timeframe = Timeframe::parse("1d").unwrap();
        let klines = series(&[100.0]);
        let slice = MarketSlice::new(&symbol, &timeframe, &klines);
        assert!(classify(&slice, &RegimeSettings::default()).is_none());
    }
}
