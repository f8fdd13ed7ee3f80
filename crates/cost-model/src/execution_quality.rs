// In crates/cost-model/src/execution_quality.rs

use analytics::stats::{self, normalize};
use core_types::{Side, Stage, StageOutput, Trade, Warning, WarningKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, warn};

use crate::types::{
    DriftAnalysis, ExecutionQuality, ExecutionQualitySettings, ExecutionRating,
    LatencyPercentiles,
};

/// Measures how well realized fills tracked the strategy's intended prices.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQualityAnalyzer {
    settings: ExecutionQualitySettings,
}

impl ExecutionQualityAnalyzer {
    pub fn new(settings: ExecutionQualitySettings) -> Self {
        Self { settings }
    }

    pub fn analyze(&self, trades: &[Trade]) -> StageOutput<ExecutionQuality> {
        let mut warnings = Vec::new();

        // Entry order, so the drift window reads left to right in time.
        let mut ordered: Vec<&Trade> = trades.iter().collect();
        ordered.sort_by_key(|t| t.entry_time);

        // --- 1. Fill Rate ---
        let (filled, requested) = ordered
            .iter()
            .filter_map(|t| t.requested_quantity.map(|r| (t.quantity, r)))
            .fold((Decimal::ZERO, Decimal::ZERO), |(f, r), (q, req)| {
                (f + q.min(req), r + req)
            });
        let fill_rate = (requested > Decimal::ZERO)
            .then(|| (filled / requested).to_f64().unwrap_or(0.0).clamp(0.0, 1.0));

        // --- 2. Slippage vs. Signal Price ---
        let slippage: Vec<(f64, bool)> = ordered
            .iter()
            .filter_map(|t| signed_slippage_bps(t).map(|s| (s, t.is_loss())))
            .collect();
        let slippage_bps: Vec<f64> = slippage.iter().map(|(s, _)| *s).collect();
        let avg_slippage_bps = (!slippage_bps.is_empty()).then(|| stats::mean(&slippage_bps));

        // --- 3. Impact Split & Adverse Selection ---
        let adverse: Vec<f64> = slippage_bps.iter().map(|s| s.max(0.0)).collect();
        let mean_adverse = stats::mean(&adverse);
        let permanent_impact_bps = mean_adverse * self.settings.permanent_share;
        let temporary_impact_bps = mean_adverse - permanent_impact_bps;
        let losing: Vec<f64> = slippage
            .iter()
            .filter(|(_, loss)| *loss)
            .map(|(s, _)| *s)
            .collect();
        let adverse_selection_bps = match avg_slippage_bps {
            Some(overall) if !losing.is_empty() => (stats::mean(&losing) - overall).max(0.0),
            _ => 0.0,
        };

        // --- 4. Latency ---
        let mut latencies: Vec<f64> = ordered
            .iter()
            .filter_map(|t| {
                let signal = t.signal_time?;
                let ms = (t.entry_time - signal).num_milliseconds();
                (ms >= 0).then_some(ms as f64)
            })
            .collect();
        latencies.sort_by(f64::total_cmp);
        let latency = (!latencies.is_empty()).then(|| LatencyPercentiles {
            p50_ms: stats::percentile_sorted(&latencies, 0.50),
            p90_ms: stats::percentile_sorted(&latencies, 0.90),
            p99_ms: stats::percentile_sorted(&latencies, 0.99),
        });

        // --- 5. Drift ---
        let drift = self.detect_drift(&slippage_bps);
        if let Some(d) = &drift {
            if d.drifting {
                warn!(
                    slope = d.slope_bps_per_trade,
                    p_value = d.p_value,
                    "Fill quality is degrading over recent trades."
                );
                warnings.push(Warning::new(
                    Stage::ExecutionQuality,
                    WarningKind::ExecutionDrift,
                    format!(
                        "slippage rising {:.2} bps per trade over the last {} trades (p = {:.3})",
                        d.slope_bps_per_trade, d.trades_examined, d.p_value
                    ),
                ));
            }
        } else if !slippage_bps.is_empty() {
            warnings.push(Warning::new(
                Stage::ExecutionQuality,
                WarningKind::InsufficientData,
                format!(
                    "{} trades with signal prices; drift detection needs {}",
                    slippage_bps.len(),
                    self.settings.drift_min_trades
                ),
            ));
        }

        // --- 6. Rating ---
        let quality_score = quality_score(fill_rate, avg_slippage_bps, latency.as_ref());
        if quality_score.is_none() {
            warnings.push(Warning::new(
                Stage::ExecutionQuality,
                WarningKind::StageSkipped,
                "trades carry no signal price, signal time or requested quantity",
            ));
        }

        let quality = ExecutionQuality {
            trades_analyzed: trades.len(),
            trades_with_signal: slippage_bps.len(),
            fill_rate,
            avg_slippage_bps,
            latency,
            temporary_impact_bps,
            permanent_impact_bps,
            adverse_selection_bps,
            quality_score,
            rating: quality_score.map(ExecutionRating::from_score),
            drift,
        };
        debug!(
            trades = quality.trades_analyzed,
            score = ?quality.quality_score,
            "Execution quality analyzed."
        );
        StageOutput::with_warnings(quality, warnings)
    }

    /// OLS trend of slippage over the most recent `drift_lookback` trades.
    fn detect_drift(&self, slippage_bps: &[f64]) -> Option<DriftAnalysis> {
        let min = self.settings.drift_min_trades.max(3);
        if slippage_bps.len() < min {
            return None;
        }
        let start = slippage_bps.len().saturating_sub(self.settings.drift_lookback.max(min));
        let window = &slippage_bps[start..];
        let trend = stats::linear_trend(window)?;

        let k = self.settings.rolling_window.clamp(1, window.len());
        let early_mean_bps = stats::mean(&window[..k]);
        let late_mean_bps = stats::mean(&window[window.len() - k..]);

        Some(DriftAnalysis {
            trades_examined: window.len(),
            slope_bps_per_trade: trend.slope,
            t_statistic: trend.t_statistic,
            p_value: trend.p_value,
            early_mean_bps,
            late_mean_bps,
            drifting: trend.slope > 0.0 && trend.p_value < self.settings.drift_p_value,
        })
    }
}

/// Entry price against the intended price, in bps; positive means the fill was worse.
pub fn signed_slippage_bps(trade: &Trade) -> Option<f64> {
    let intended = trade.signal_price?;
    if intended <= Decimal::ZERO {
        return None;
    }
    let diff = match trade.side {
        Side::Long => trade.entry_price - intended,
        Side::Short => intended - trade.entry_price,
    };
    (diff / intended).to_f64().map(|r| r * 10_000.0)
}

/// Weighted mean of whichever components have data: slippage 50%, fill rate
/// 30%, latency 20%.
fn quality_score(
    fill_rate: Option<f64>,
    avg_slippage_bps: Option<f64>,
    latency: Option<&LatencyPercentiles>,
) -> Option<f64> {
    let parts = [
        avg_slippage_bps.map(|s| (0.5, 100.0 * normalize(s.max(0.0), 50.0, 0.0))),
        fill_rate.map(|f| (0.3, 100.0 * f)),
        latency.map(|l| (0.2, 100.0 * normalize(l.p90_ms, 2_000.0, 100.0))),
    ];
    let (weight, points) = parts
        .iter()
        .flatten()
        .fold((0.0, 0.0), |(w, p), (wi, pi)| (w + wi, p + wi * pi));
    (weight > 0.0).then(|| (points / weight).clamp(0.0, 100.0))
}
