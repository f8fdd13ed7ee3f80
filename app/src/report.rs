// In app/src/report.rs

use readiness::{Adjustment, LiveOutcome, ReadinessReport, StatusReason};
use report_store::StoredReport;

/// Prints a human-readable summary of one stored report.
pub fn print_report(stored: &StoredReport) {
    let report = &stored.report;
    println!("\n--- Readiness Report ---");
    println!(
        "Strategy: {} | Run: {} | {} {} | Version #{} ({})",
        report.meta.strategy_id,
        report.meta.run_id,
        report.meta.symbol,
        report.meta.timeframe,
        stored.sequence,
        stored.stored_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    println!("------------------------");

    println!("Status: {:?} ({})", report.status, describe_reason(&report.status_reason));
    if let Some(score) = &report.score {
        println!("Score: {:.1} / 100 (grade {})", score.total, score.grade);
    }
    if let Some(tier) = report.risk_tier {
        println!("Risk Tier: {tier:?}");
    }
    println!(
        "  - Position Size: {:.2}% | Max Exposure: {:.0}% | Daily Loss Limit: {:.1}% | Kelly: {:.3}",
        report.sizing.position_size_fraction * 100.0,
        report.sizing.max_exposure_fraction * 100.0,
        report.sizing.daily_loss_limit_fraction * 100.0,
        report.sizing.kelly_fraction,
    );

    print_stages(report);

    if !report.critical_failures.is_empty() {
        println!("\nCritical Failures:");
        for failure in &report.critical_failures {
            println!("  - [{:?}] {}", failure.check, failure.message);
        }
    }
    if !report.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }
    if !report.recommendations.is_empty() {
        println!("\nRecommendations:");
        for (i, recommendation) in report.recommendations.iter().enumerate() {
            println!("  {}. {}", i + 1, recommendation.message);
        }
    }
    println!("------------------------");
}

fn print_stages(report: &ReadinessReport) {
    let artifacts = &report.artifacts;
    let profit = &artifacts.profit;
    println!(
        "\n  - P&L: ${:.2} ({:.2}%) | Max Drawdown: {:.2}% | Sharpe: {:.2} | Win Rate: {:.1}% | Trades: {}",
        profit.net_pnl,
        profit.total_return * 100.0,
        profit.max_drawdown * 100.0,
        profit.sharpe,
        profit.win_rate * 100.0,
        profit.total_trades,
    );
    if let Some(cost) = &artifacts.cost {
        println!(
            "  - Costs: {:.1} bps round trip | Edge/Cost: {:.2} | Liquidity: {:?}",
            cost.round_trip_bps, cost.edge_to_cost_ratio, cost.per_trade.liquidity.tier,
        );
    }
    if let Some(mm) = &artifacts.multi_market {
        println!(
            "  - Multi-Market: {}/{} passed | Mean Sharpe: {:.2} | Consistency: {:?}",
            mm.summary.cells_passed, mm.summary.cells_tested, mm.summary.mean_sharpe, mm.summary.consistency,
        );
    }
    if let Some(wf) = &artifacts.walk_forward {
        println!(
            "  - Walk-Forward ({:?}): OOS/IS {:.2} | Overfitting Score: {:.0}{}",
            wf.source,
            wf.oos_is_ratio,
            wf.overfitting_score,
            if wf.overfitting_detected { " (overfit)" } else { "" },
        );
    }
    if let Some(mc) = &artifacts.monte_carlo {
        println!(
            "  - Monte Carlo ({} trials): P(profit) {:.1}% | P(ruin) {:.2}% | VaR95 {:.2}% | 5th-95th: {:.2}% to {:.2}%",
            mc.trials,
            mc.probability_of_profit * 100.0,
            mc.probability_of_ruin * 100.0,
            mc.var_95 * 100.0,
            mc.percentiles.p5 * 100.0,
            mc.percentiles.p95 * 100.0,
        );
    }
}

fn describe_reason(reason: &StatusReason) -> String {
    match reason {
        StatusReason::Inconclusive { trades, required } => {
            format!("inconclusive: {trades} of {required} required trades")
        }
        StatusReason::CriticalFailure { checks } => format!("{} critical check(s) failed", checks.len()),
        StatusReason::CappedByWarnings { score, warnings } => {
            format!("score {score:.1} capped by {warnings} unresolved warning(s)")
        }
        StatusReason::ScoreBand { score } => format!("score {score:.1}"),
    }
}

/// One line per stored version.
pub fn print_history(strategy_id: &str, history: &[StoredReport]) {
    println!("\n--- History for {strategy_id} ({} reports) ---", history.len());
    for stored in history {
        let report = &stored.report;
        let score = report
            .total_score()
            .map(|s| format!("{s:.1}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "#{:<4} {} | run {:<16} | {:?} | score {} | {} warning(s)",
            stored.sequence,
            stored.stored_at.format("%Y-%m-%d %H:%M"),
            report.meta.run_id,
            report.status,
            score,
            report.warnings.len(),
        );
    }
}

pub fn print_calibration(observations: usize, adjustments: &[(&LiveOutcome, Adjustment)]) {
    println!("\n--- Calibration ---");
    println!("Outcomes used: {observations}");
    for (outcome, adjustment) in adjustments {
        println!(
            "  - {}/{}: {:?} -> Sharpe target {:.2}, drawdown target {:.1}%",
            outcome.strategy_id,
            outcome.run_id,
            adjustment.direction,
            adjustment.sharpe_target,
            adjustment.drawdown_target * 100.0,
        );
    }
}
