// In crates/core-types/src/warning.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline stage a warning originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    CostModel,
    ExecutionQuality,
    Profitability,
    MultiMarket,
    WalkForward,
    MonteCarlo,
    Scoring,
    Readiness,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingestion => "ingestion",
            Stage::CostModel => "cost-model",
            Stage::ExecutionQuality => "execution-quality",
            Stage::Profitability => "profitability",
            Stage::MultiMarket => "multi-market",
            Stage::WalkForward => "walk-forward",
            Stage::MonteCarlo => "monte-carlo",
            Stage::Scoring => "scoring",
            Stage::Readiness => "readiness",
        };
        f.write_str(name)
    }
}

/// Conditions that are absorbed by a stage instead of aborting the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Too few trades or windows for a stable statistic.
    InsufficientData,
    /// Symbol missing from the liquidity table; the very-low tier was assumed.
    UnknownLiquidity,
    /// Zero-variance or zero-trade statistic resolved to a sentinel.
    Degenerate,
    /// Fill quality is trending worse over recent trades.
    ExecutionDrift,
    Overfitting,
    /// Per-cell results disagree too much to trust the mean.
    HighDispersion,
    /// Stopped early; the value holds a partial aggregate.
    Cancelled,
    /// The stage had no input to work on.
    StageSkipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

impl WarningKind {
    pub fn default_severity(&self) -> Severity {
        match self {
            WarningKind::Degenerate | WarningKind::StageSkipped => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub stage: Stage,
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
}

impl Warning {
    pub fn new(stage: Stage, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            severity: kind.default_severity(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}: {}", self.stage, self.kind, self.message)
    }
}

/// A stage result plus the non-fatal conditions it absorbed along the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> StageOutput<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    pub fn has(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutput<U> {
        StageOutput {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}
