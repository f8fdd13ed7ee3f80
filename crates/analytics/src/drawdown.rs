// In crates/analytics/src/drawdown.rs

use chrono::Duration;
use core_types::EquityPoint;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawdown {
    /// Largest peak-to-trough decline as a fraction of the running peak.
    pub max_fraction: f64,
    /// Same decline in currency units.
    pub max_absolute: Decimal,
    /// Longest time spent below a previous peak. An unrecovered drawdown is
    /// measured to the last point of the curve.
    pub longest: Duration,
}

pub fn analyze(curve: &[EquityPoint]) -> Drawdown {
    let Some(first) = curve.first() else {
        return Drawdown {
            max_fraction: 0.0,
            max_absolute: Decimal::ZERO,
            longest: Duration::zero(),
        };
    };

    let mut peak = first.value;
    let mut peak_time = first.timestamp;
    let mut underwater = false;
    let mut max_fraction = 0.0f64;
    let mut max_absolute = Decimal::ZERO;
    let mut longest = Duration::zero();

    for point in &curve[1..] {
        if point.value >= peak {
            if underwater {
                longest = longest.max(point.timestamp - peak_time);
                underwater = false;
            }
            peak = point.value;
            peak_time = point.timestamp;
            continue;
        }

        underwater = true;
        let drop = peak - point.value;
        max_absolute = max_absolute.max(drop);
        if peak > Decimal::ZERO {
            let fraction = (drop / peak).to_f64().unwrap_or(0.0);
            max_fraction = max_fraction.max(fraction);
        }
    }

    if underwater {
        if let Some(last) = curve.last() {
            longest = longest.max(last.timestamp - peak_time);
        }
    }

    Drawdown {
        max_fraction: max_fraction.clamp(0.0, 1.0),
        max_absolute,
        longest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn curve(values: &[Decimal]) -> Vec<EquityPoint> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| EquityPoint {
                timestamp: base + Duration::days(i as i64),
                value: *v,
            })
            .collect()
    }

    #[test]
    fn measures_depth_and_recovery_time() {
        let dd = analyze(&curve(&[dec!(100), dec!(120), dec!(90), dec!(110), dec!(125)]));
        assert!((dd.max_fraction - 0.25).abs() < 1e-12);
        assert_eq!(dd.max_absolute, dec!(30));
        assert_eq!(dd.longest, Duration::days(3));
    }

    #[test]
    fn open_drawdown_runs_to_the_end() {
        let dd = analyze(&curve(&[dec!(100), dec!(80), dec!(85), dec!(90)]));
        assert!((dd.max_fraction - 0.2).abs() < 1e-12);
        assert_eq!(dd.longest, Duration::days(3));
    }

    #[test]
    fn rising_curve_has_no_drawdown() {
        let dd = analyze(&curve(&[dec!(1), dec!(2), dec!(3)]));
        assert_eq!(dd.max_fraction, 0.0);
        assert_eq!(dd.longest, Duration::zero());
    }
}
