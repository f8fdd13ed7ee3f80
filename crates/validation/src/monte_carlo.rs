// In crates/validation/src/monte_carlo.rs

use analytics::{ConfidenceInterval, stats};
use core_types::{BacktestResult, CancelToken, Stage, StageOutput, Warning, WarningKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{
    MonteCarloResult, MonteCarloSettings, ReturnPercentiles, ScenarioSummary, SimulationMode,
    StressScenario,
};

/// SplitMix64 finalizer; spreads nearby seeds across the whole u64 range.
pub fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// The RNG for one trial. Depends only on the run seed and the trial index,
/// so results do not depend on how trials are scheduled across threads.
///
/// The seed is mixed before the index is added; combining them raw lets
/// neighbouring seeds share the same set of trial streams.
pub fn trial_rng(seed: u64, trial: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(splitmix64(splitmix64(seed).wrapping_add(trial)))
}

#[derive(Debug, Clone, Copy)]
struct TrialOutcome {
    terminal_return: f64,
    max_drawdown: f64,
    ruined: bool,
    scenario: Option<StressScenario>,
}

/// Moments of the input sample used to size the drawdown shock.
#[derive(Debug, Clone, Copy)]
struct SampleMoments {
    mean: f64,
    std: f64,
}

/// Bootstrap and stress simulation of a trade-return sequence.
#[derive(Debug, Clone)]
pub struct MonteCarloSimulator {
    settings: MonteCarloSettings,
}

impl MonteCarloSimulator {
    pub fn new(settings: MonteCarloSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &MonteCarloSettings {
        &self.settings
    }

    /// Simulates the backtest's per-trade returns.
    pub fn run(
        &self,
        backtest: &BacktestResult,
        cancel: &CancelToken,
    ) -> StageOutput<Option<MonteCarloResult>> {
        self.simulate(backtest.trade_returns(), cancel)
    }

    /// Runs every trial on the current rayon pool.
    ///
    /// Each path resamples `trade_returns.len()` returns with replacement and
    /// compounds them from an equity of 1. In stress mode trial `i` also
    /// suffers scenario `i % 3`.
    pub fn simulate(
        &self,
        trade_returns: &[f64],
        cancel: &CancelToken,
    ) -> StageOutput<Option<MonteCarloResult>> {
        let returns: Vec<f64> = trade_returns.iter().copied().filter(|r| r.is_finite()).collect();
        if returns.len() < 2 {
            let kind = if returns.is_empty() {
                WarningKind::StageSkipped
            } else {
                WarningKind::InsufficientData
            };
            let warning = Warning::new(
                Stage::MonteCarlo,
                kind,
                format!("{} trade returns; resampling needs at least 2", returns.len()),
            );
            return StageOutput::with_warnings(None, vec![warning]);
        }

        let moments = SampleMoments {
            mean: stats::mean(&returns),
            std: stats::sample_std(&returns),
        };
        let trials = self.settings.trials;
        info!(
            trials,
            seed = self.settings.seed,
            mode = ?self.settings.mode,
            sample = returns.len(),
            "Running Monte Carlo."
        );

        let outcomes: Vec<Option<TrialOutcome>> = (0..trials)
            .into_par_iter()
            .map(|i| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(self.trial(i, &returns, moments))
            })
            .collect();

        let mut warnings = Vec::new();
        let outcomes: Vec<TrialOutcome> = outcomes.into_iter().flatten().collect();
        let cancelled = outcomes.len() < trials;
        if cancelled {
            warn!(completed = outcomes.len(), trials, "Monte Carlo cancelled.");
            warnings.push(Warning::new(
                Stage::MonteCarlo,
                WarningKind::Cancelled,
                format!("{} of {trials} trials completed before cancellation", outcomes.len()),
            ));
        }
        if outcomes.is_empty() {
            return StageOutput::with_warnings(None, warnings);
        }

        let result = self.aggregate(&outcomes, cancelled);
        info!(
            p_profit = result.probability_of_profit,
            p_ruin = result.probability_of_ruin,
            var_95 = result.var_95,
            robustness = result.robustness_score,
            "Monte Carlo complete."
        );
        StageOutput::with_warnings(Some(result), warnings)
    }

    fn trial(&self, index: usize, returns: &[f64], moments: SampleMoments) -> TrialOutcome {
        let mut rng = trial_rng(self.settings.seed, index as u64);
        let n = returns.len();
        let mut path: Vec<f64> = (0..n).map(|_| returns[rng.gen_range(0..n)]).collect();

        let scenario = match self.settings.mode {
            SimulationMode::Bootstrap => None,
            SimulationMode::Stress => Some(StressScenario::ALL[index % StressScenario::ALL.len()]),
        };
        if let Some(scenario) = scenario {
            self.apply_scenario(scenario, &mut path, &mut rng, moments);
        }

        let mut equity = 1.0_f64;
        let mut peak = 1.0_f64;
        let mut max_drawdown = 0.0_f64;
        for r in path {
            equity *= 1.0 + r.max(-1.0);
            peak = peak.max(equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max(1.0 - equity / peak);
            }
        }

        TrialOutcome {
            terminal_return: equity - 1.0,
            max_drawdown,
            ruined: max_drawdown >= self.settings.ruin_threshold,
            scenario,
        }
    }

    fn apply_scenario(
        &self,
        scenario: StressScenario,
        path: &mut [f64],
        rng: &mut ChaCha8Rng,
        moments: SampleMoments,
    ) {
        let n = path.len();
        let affected = ((n as f64 * self.settings.stress_fraction).ceil() as usize).clamp(1, n);
        match scenario {
            StressScenario::FlashCrash => {
                let at = rng.gen_range(0..n);
                path[at] = self.settings.flash_crash_return;
            }
            StressScenario::ExtendedDrawdown => {
                let start = rng.gen_range(0..=n - affected);
                let shock = moments.mean.abs() + moments.std;
                for r in &mut path[start..start + affected] {
                    *r -= shock;
                }
            }
            StressScenario::VolatilitySpike => {
                for at in rand::seq::index::sample(rng, n, affected).iter() {
                    path[at] *= self.settings.spike_multiplier;
                }
            }
        }
    }

    fn aggregate(&self, outcomes: &[TrialOutcome], cancelled: bool) -> MonteCarloResult {
        let n = outcomes.len() as f64;
        let mut returns: Vec<f64> = outcomes.iter().map(|o| o.terminal_return).collect();
        returns.sort_by(f64::total_cmp);
        let pct = |q: f64| stats::percentile_sorted(&returns, q);

        // --- Distribution ---
        let percentiles = ReturnPercentiles {
            p5: pct(0.05),
            p25: pct(0.25),
            p50: pct(0.50),
            p75: pct(0.75),
            p95: pct(0.95),
        };
        let confidence_interval = ConfidenceInterval {
            lower: pct(0.025),
            upper: pct(0.975),
        };

        // --- Tail Risk ---
        let var_95 = (-percentiles.p5).max(0.0);
        let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= percentiles.p5).collect();
        // The tail mean can round just below its own cutoff.
        let cvar_95 = (-stats::mean(&tail)).max(var_95);

        // --- Probabilities ---
        let probability_of_profit = outcomes.iter().filter(|o| o.terminal_return > 0.0).count() as f64 / n;
        let probability_of_ruin = outcomes.iter().filter(|o| o.ruined).count() as f64 / n;
        let drawdowns: Vec<f64> = outcomes.iter().map(|o| o.max_drawdown).collect();

        let robustness_score = robustness_score(
            probability_of_profit,
            probability_of_ruin,
            confidence_interval.width(),
        );

        let scenarios = match self.settings.mode {
            SimulationMode::Bootstrap => Vec::new(),
            SimulationMode::Stress => StressScenario::ALL
                .iter()
                .filter_map(|s| summarize_scenario(*s, outcomes))
                .collect(),
        };
        debug!(scenarios = scenarios.len(), "Monte Carlo aggregated.");

        MonteCarloResult {
            mode: self.settings.mode,
            seed: self.settings.seed,
            trials: outcomes.len(),
            mean_return: stats::mean(&returns),
            median_return: percentiles.p50,
            std_return: stats::sample_std(&returns),
            percentiles,
            confidence_interval,
            var_95,
            cvar_95,
            probability_of_profit,
            probability_of_ruin,
            mean_max_drawdown: stats::mean(&drawdowns),
            worst_max_drawdown: drawdowns.iter().copied().fold(0.0, f64::max),
            robustness_score,
            scenarios,
            cancelled,
        }
    }
}

/// 0-100: 40% P(profit), 35% survival, 25% tightness of the 95% interval.
pub fn robustness_score(probability_of_profit: f64, probability_of_ruin: f64, ci_width: f64) -> f64 {
    let tightness = 1.0 / (1.0 + ci_width.max(0.0));
    (100.0 * (0.4 * probability_of_profit + 0.35 * (1.0 - probability_of_ruin) + 0.25 * tightness))
        .clamp(0.0, 100.0)
}

fn summarize_scenario(scenario: StressScenario, outcomes: &[TrialOutcome]) -> Option<ScenarioSummary> {
    let hits: Vec<&TrialOutcome> = outcomes.iter().filter(|o| o.scenario == Some(scenario)).collect();
    if hits.is_empty() {
        return None;
    }
    let mut returns: Vec<f64> = hits.iter().map(|o| o.terminal_return).collect();
    returns.sort_by(f64::total_cmp);
    Some(ScenarioSummary {
        scenario,
        trials: hits.len(),
        mean_return: stats::mean(&returns),
        p5_return: stats::percentile_sorted(&returns, 0.05),
        probability_of_ruin: hits.iter().filter(|o| o.ruined).count() as f64 / hits.len() as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use proptest::prelude::*;
    use rand::RngCore;

    fn simulator(mode: SimulationMode, seed: u64) -> MonteCarloSimulator {
        MonteCarloSimulator::new(MonteCarloSettings {
            mode,
            seed,
            ..Default::default()
        })
        .unwrap()
    }

    fn sample_returns() -> Vec<f64> {
        (0..60)
            .map(|i| match i % 5 {
                0 | 1 | 2 => 0.012,
                3 => -0.008,
                _ => -0.015,
            })
            .collect()
    }

    #[test]
    fn splitmix_matches_reference_output() {
        assert_eq!(splitmix64(0), 0xE220_A839_7B1D_CDAF);
        assert_ne!(splitmix64(1), splitmix64(2));
    }

    #[test]
    fn fixed_seed_is_bit_reproducible() {
        let sim = simulator(SimulationMode::Stress, 7);
        let a = sim.simulate(&sample_returns(), &CancelToken::new()).value.unwrap();
        let b = sim.simulate(&sample_returns(), &CancelToken::new()).value.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.mean_return.to_bits(), b.mean_return.to_bits());
    }

    #[test]
    fn neighbouring_seeds_draw_distinct_trial_streams() {
        let mut first: Vec<u64> = (0..1_000).map(|t| trial_rng(0, t).next_u64()).collect();
        let mut second: Vec<u64> = (0..1_000).map(|t| trial_rng(1, t).next_u64()).collect();
        first.sort_unstable();
        second.sort_unstable();
        assert_ne!(first, second);
    }

    #[test]
    fn nearby_seeds_give_different_distributions() {
        let means: Vec<f64> = (0..3)
            .map(|seed| {
                let r = simulator(SimulationMode::Bootstrap, seed)
                    .simulate(&sample_returns(), &CancelToken::new())
                    .value
                    .unwrap();
                assert_eq!(r.trials, 1_000);
                r.mean_return
            })
            .collect();
        assert_ne!(means[0], means[1]);
        assert_ne!(means[1], means[2]);
        assert_ne!(means[0], means[2]);
    }

    #[test]
    fn different_seeds_give_different_paths() {
        let a = simulator(SimulationMode::Bootstrap, 1)
            .simulate(&sample_returns(), &CancelToken::new())
            .value
            .unwrap();
        let b = simulator(SimulationMode::Bootstrap, 2)
            .simulate(&sample_returns(), &CancelToken::new())
            .value
            .unwrap();
        assert_ne!(a.mean_return, b.mean_return);
    }

    #[test]
    fn always_winning_trades_never_lose() {
        let result = simulator(SimulationMode::Bootstrap, 42)
            .simulate(&[0.01, 0.02, 0.015, 0.005], &CancelToken::new())
            .value
            .unwrap();
        assert_eq!(result.probability_of_profit, 1.0);
        assert_eq!(result.probability_of_ruin, 0.0);
        assert_eq!(result.var_95, 0.0);
        assert_eq!(result.cvar_95, 0.0);
        assert!(result.scenarios.is_empty());
    }

    #[test]
    fn steady_losses_are_ruinous() {
        let result = simulator(SimulationMode::Bootstrap, 42)
            .simulate(&[-0.05; 30], &CancelToken::new())
            .value
            .unwrap();
        assert_eq!(result.probability_of_ruin, 1.0);
        assert_eq!(result.probability_of_profit, 0.0);
        assert!(result.var_95 > 0.7);
        // Every path ends at the same loss, so the tail mean equals its cutoff.
        assert!(result.cvar_95 >= result.var_95);
        assert!((result.cvar_95 - result.var_95).abs() < 1e-12);
    }

    #[test]
    fn stress_mode_rotates_scenarios() {
        let result = simulator(SimulationMode::Stress, 42)
            .simulate(&sample_returns(), &CancelToken::new())
            .value
            .unwrap();
        assert_eq!(result.scenarios.len(), 3);
        assert_eq!(result.scenarios.iter().map(|s| s.trials).sum::<usize>(), result.trials);
        assert_eq!(result.scenarios[0].scenario, StressScenario::FlashCrash);
        assert_eq!(result.scenarios[0].trials, 334);
        assert!(result.worst_max_drawdown > 0.149);
    }

    #[test]
    fn percentiles_are_ordered() {
        let r = simulator(SimulationMode::Stress, 3)
            .simulate(&sample_returns(), &CancelToken::new())
            .value
            .unwrap();
        let p = r.percentiles;
        assert!(r.confidence_interval.lower <= p.p5);
        assert!(p.p5 <= p.p25 && p.p25 <= p.p50 && p.p50 <= p.p75 && p.p75 <= p.p95);
        assert!(p.p95 <= r.confidence_interval.upper);
        assert_eq!(r.median_return, p.p50);
    }

    #[test]
    fn too_few_trials_is_a_configuration_error() {
        let err = MonteCarloSimulator::new(MonteCarloSettings {
            trials: 500,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, Error::TooFewTrials { trials: 500, minimum: 1_000 });
    }

    #[test]
    fn thin_samples_are_not_simulated() {
        let sim = simulator(SimulationMode::Bootstrap, 1);
        let out = sim.simulate(&[0.01], &CancelToken::new());
        assert!(out.value.is_none());
        assert!(out.has(WarningKind::InsufficientData));

        let out = sim.simulate(&[], &CancelToken::new());
        assert!(out.has(WarningKind::StageSkipped));
    }

    #[test]
    fn cancellation_before_start_yields_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = simulator(SimulationMode::Bootstrap, 1).simulate(&sample_returns(), &cancel);
        assert!(out.value.is_none());
        assert!(out.has(WarningKind::Cancelled));
    }

    #[test]
    fn robustness_rewards_profit_and_survival() {
        assert!((robustness_score(1.0, 0.0, 0.0) - 100.0).abs() < 1e-9);
        assert!((robustness_score(0.0, 1.0, f64::INFINITY) - 0.0).abs() < 1e-9);
        assert!(robustness_score(0.8, 0.05, 0.4) > robustness_score(0.6, 0.05, 0.4));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn outputs_stay_in_range(returns in prop::collection::vec(-0.2f64..0.2, 2..40), seed in any::<u64>()) {
            let r = simulator(SimulationMode::Stress, seed)
                .simulate(&returns, &CancelToken::new())
                .value
                .unwrap();
            prop_assert!((0.0..=1.0).contains(&r.probability_of_profit));
            prop_assert!((0.0..=1.0).contains(&r.probability_of_ruin));
            prop_assert!((0.0..=100.0).contains(&r.robustness_score));
            prop_assert!(r.var_95 >= 0.0 && r.cvar_95 >= 0.0);
            prop_assert!(r.cvar_95 >= r.var_95);
            prop_assert!((0.0..=1.0).contains(&r.worst_max_drawdown));
        }
    }
}
