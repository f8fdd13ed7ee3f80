// In crates/analytics/src/stats.rs

//! Small numeric helpers shared by every stage that reduces samples to statistics.
//!
//! All functions return a defined value for empty or degenerate input instead
//! of NaN, so callers never have to special-case a division by zero.

use statrs::distribution::{ContinuousCDF, StudentsT};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1). Zero for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, 0.5)
}

/// Percentile of an already sorted sample, linearly interpolated between ranks.
///
/// `q` is a fraction in `[0, 1]`.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let weight = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * weight
        }
    }
}

/// Two-sided p-value of a Student-t statistic.
pub fn two_sided_p_value(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return if t.is_nan() { 1.0 } else { 0.0 };
    }
    match StudentsT::new(0.0, 1.0, df.max(1.0)) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Two-sided critical value of Student's t at the given confidence level.
pub fn t_critical(confidence: f64, df: f64) -> f64 {
    let p = 0.5 + confidence.clamp(0.0, 0.999_999) / 2.0;
    match StudentsT::new(0.0, 1.0, df.max(1.0)) {
        Ok(dist) => dist.inverse_cdf(p),
        Err(_) => 1.96,
    }
}

/// One-sample t-test of `values` against a zero mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    pub t_statistic: f64,
    pub p_value: f64,
    /// Confidence interval of the mean.
    pub lower: f64,
    pub upper: f64,
}

pub fn t_test_zero_mean(values: &[f64], confidence: f64) -> TTest {
    let m = mean(values);
    let sd = sample_std(values);
    if values.len() < 2 || sd == 0.0 {
        return TTest {
            t_statistic: 0.0,
            p_value: 1.0,
            lower: m,
            upper: m,
        };
    }
    let n = values.len() as f64;
    let se = sd / n.sqrt();
    let t = m / se;
    let crit = t_critical(confidence, n - 1.0);
    TTest {
        t_statistic: t,
        p_value: two_sided_p_value(t, n - 1.0),
        lower: m - crit * se,
        upper: m + crit * se,
    }
}

/// Ordinary least-squares fit of `y` against its index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
    pub t_statistic: f64,
    pub p_value: f64,
}

pub fn linear_trend(y: &[f64]) -> Option<LinearTrend> {
    let n = y.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = mean(y);
    let sxx: f64 = (0..n).map(|i| (i as f64 - x_mean).powi(2)).sum();
    let sxy: f64 = y
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64 - x_mean) * (v - y_mean))
        .sum();
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let sse: f64 = y
        .iter()
        .enumerate()
        .map(|(i, v)| (v - (intercept + slope * i as f64)).powi(2))
        .sum();
    let se = (sse / (nf - 2.0) / sxx).sqrt();

    let (t_statistic, p_value) = if se > 0.0 {
        let t = slope / se;
        (t, two_sided_p_value(t, nf - 2.0))
    } else if slope != 0.0 {
        // A perfect fit: the trend is as certain as it gets.
        (slope.signum() * f64::MAX, 0.0)
    } else {
        (0.0, 1.0)
    };

    Some(LinearTrend {
        slope,
        intercept,
        t_statistic,
        p_value,
    })
}

/// Linear map of `value` onto `[0, 1]` between `floor` and `target`.
///
/// Works in either direction: when `target < floor`, lower values score higher.
pub fn normalize(value: f64, floor: f64, target: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    if (target - floor).abs() < f64::EPSILON {
        return if value >= target { 1.0 } else { 0.0 };
    }
    ((value - floor) / (target - floor)).clamp(0.0, 1.0)
}
