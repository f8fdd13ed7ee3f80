// In app/src/main.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use app_config::Settings;
use clap::{Parser, Subcommand, ValueEnum};
use core_types::{CancelToken, RunMetadata, Symbol, Timeframe};
use ingestion::BacktestSource;
use pipeline::{MarketInput, Pipeline, WalkForwardData};
use readiness::{LiveOutcome, ThresholdLearner};
use report_store::{JsonlReportStore, ReportStore};
use strategies::EmaCrossover;
use tracing_subscriber::prelude::*;

mod report;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Validates backtest results and decides whether a strategy is ready to deploy."
)]
struct Cli {
    /// Directory holding base.toml and the per-environment overrides.
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the full validation pipeline over one backtest and stores the report.
    Evaluate {
        /// Trade records (.csv or .json).
        #[arg(short, long)]
        trades: PathBuf,

        /// Optional equity curve (.csv or .json); derived from the trades otherwise.
        #[arg(short, long)]
        equity: Option<PathBuf>,

        /// Directory of `{SYMBOL}_{TIMEFRAME}` kline files for replay stages.
        #[arg(short, long)]
        markets: Option<PathBuf>,

        #[arg(long)]
        strategy_id: String,

        #[arg(long)]
        run_id: String,

        /// The symbol the backtest traded (e.g., "BTCUSDT").
        #[arg(short, long)]
        symbol: String,

        /// The timeframe the backtest ran on (e.g., "1h").
        #[arg(short = 'f', long)]
        timeframe: String,

        /// Extra `[[symbols]]` liquidity entries, merged over the configured table.
        #[arg(long)]
        liquidity: Option<PathBuf>,

        /// Strategy used to re-run the market data.
        #[arg(long, value_enum, default_value_t = RunnerKind::EmaCrossover)]
        runner: RunnerKind,

        /// Split the backtest's own trades for walk-forward instead of replaying klines.
        #[arg(long)]
        trade_split: bool,

        /// Replay walk-forward on this dataset instead of the backtest's own market.
        #[arg(long, requires = "walk_forward_timeframe", conflicts_with = "trade_split")]
        walk_forward_symbol: Option<String>,

        #[arg(long, requires = "walk_forward_symbol")]
        walk_forward_timeframe: Option<String>,

        /// Print the full report as JSON after the summary.
        #[arg(long)]
        json: bool,
    },

    /// Shows the latest stored report for a strategy, or a specific run.
    Show {
        #[arg(long)]
        strategy_id: String,

        #[arg(long)]
        run_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Lists every stored report for a strategy, oldest first.
    History {
        #[arg(long)]
        strategy_id: String,
    },

    /// Feeds live outcomes back into the scoring thresholds and prints the proposal.
    Calibrate {
        /// JSON array of live outcomes.
        #[arg(short, long)]
        outcomes: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RunnerKind {
    EmaCrossover,
    /// Only the recorded trades are analysed; multi-market testing is skipped.
    None,
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let cli = Cli::parse();

    let settings = app_config::load_settings_from(&cli.config_dir)
        .with_context(|| format!("Failed to load settings from {}", cli.config_dir.display()))?;
    init_tracing(&settings.app.log_level);

    tracing::info!(environment = %settings.app.environment, "Starting proving-ground");

    // Match on the parsed command and call the appropriate handler.
    match cli.command {
        Commands::Evaluate {
            trades,
            equity,
            markets,
            strategy_id,
            run_id,
            symbol,
            timeframe,
            liquidity,
            runner,
            trade_split,
            walk_forward_symbol,
            walk_forward_timeframe,
            json,
        } => {
            let walk_forward = match (trade_split, walk_forward_symbol, walk_forward_timeframe) {
                (true, _, _) => WalkForwardData::TradeSplit,
                (false, Some(symbol), Some(timeframe)) => WalkForwardData::Dataset {
                    symbol: Symbol::from(symbol.as_str()),
                    timeframe: Timeframe::parse(&timeframe)?,
                },
                _ => WalkForwardData::Primary,
            };
            let request = EvaluateRequest {
                source: BacktestSource {
                    trades,
                    equity,
                },
                meta: RunMetadata {
                    strategy_id,
                    run_id,
                    symbol: Symbol::from(symbol.as_str()),
                    timeframe: Timeframe::parse(&timeframe)?,
                },
                markets,
                liquidity,
                runner,
                walk_forward,
            };
            handle_evaluate(settings, request, json).await?;
        }
        Commands::Show {
            strategy_id,
            run_id,
            json,
        } => {
            handle_show(&settings, &strategy_id, run_id.as_deref(), json)?;
        }
        Commands::History { strategy_id } => {
            handle_history(&settings, &strategy_id)?;
        }
        Commands::Calibrate { outcomes } => {
            handle_calibrate(&settings, &outcomes)?;
        }
    }

    tracing::info!("proving-ground has finished successfully.");

    Ok(())
}

fn init_tracing(log_level: &str) {
    let level = log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(
            tracing_subscriber::filter::Targets::new()
                .with_target("config", tracing::Level::WARN)
                .with_default(level),
        );
    tracing_subscriber::registry().with(fmt_layer).init();
}

fn open_store(settings: &Settings) -> Result<JsonlReportStore> {
    JsonlReportStore::open(&settings.store.directory).with_context(|| {
        format!(
            "Failed to open report store at {}",
            settings.store.directory.display()
        )
    })
}

// --- "Evaluate" Subcommand Logic ---

struct EvaluateRequest {
    source: BacktestSource,
    meta: RunMetadata,
    markets: Option<PathBuf>,
    liquidity: Option<PathBuf>,
    runner: RunnerKind,
    walk_forward: WalkForwardData,
}

/// Handles the logic for the `evaluate` subcommand.
async fn handle_evaluate(mut settings: Settings, request: EvaluateRequest, json: bool) -> Result<()> {
    // --- 1. Ingestion ---
    let ingested = ingestion::load_backtest(&request.source, request.meta, &settings.ingestion)
        .with_context(|| format!("Failed to ingest {}", request.source.trades.display()))?;
    for warning in &ingested.warnings {
        tracing::warn!(%warning, "Ingestion warning");
    }
    let backtest = Arc::new(ingested.value);

    // --- 2. Market Inputs ---
    if let Some(path) = &request.liquidity {
        let extra = app_config::load_liquidity_file(path)
            .with_context(|| format!("Failed to read liquidity table {}", path.display()))?;
        tracing::info!(entries = extra.len(), "Merging liquidity table");
        settings.cost_model.liquidity.extend(extra);
    }

    let datasets = match &request.markets {
        Some(dir) => ingestion::load_market_dir(dir)
            .with_context(|| format!("Failed to load market data from {}", dir.display()))?,
        None => Vec::new(),
    };
    let mut market = MarketInput::new(datasets).with_walk_forward(request.walk_forward);
    if request.runner == RunnerKind::EmaCrossover {
        let strategy = EmaCrossover::new(settings.strategy.clone());
        let base = strategy.base_params();
        market = market.with_runner(Arc::new(strategy), base);
    }

    // --- 3. Pipeline ---
    let pipeline = Arc::new(Pipeline::new(settings.pipeline_settings())?);
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing with partial results.");
            on_interrupt.cancel();
        }
    });

    let readiness = pipeline.evaluate_async(backtest, market, cancel).await?;

    // --- 4. Persist and Report ---
    let store = open_store(&settings)?;
    let stored = store.append(&readiness)?;
    tracing::info!(
        sequence = stored.sequence,
        path = %store.directory().display(),
        "Report stored."
    );

    report::print_report(&stored);
    if json {
        println!("{}", serde_json::to_string_pretty(&stored.report)?);
    }
    Ok(())
}

// --- "Show" and "History" Subcommand Logic ---

fn handle_show(settings: &Settings, strategy_id: &str, run_id: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(settings)?;
    let stored = match run_id {
        Some(run_id) => store.get(strategy_id, run_id)?,
        None => store.latest(strategy_id)?,
    };
    let Some(stored) = stored else {
        anyhow::bail!("No stored report for strategy '{strategy_id}'.");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else {
        report::print_report(&stored);
    }
    Ok(())
}

fn handle_history(settings: &Settings, strategy_id: &str) -> Result<()> {
    let history = open_store(settings)?.history(strategy_id)?;
    if history.is_empty() {
        println!("No stored reports for strategy '{strategy_id}'.");
        return Ok(());
    }
    report::print_history(strategy_id, &history);
    Ok(())
}

// --- "Calibrate" Subcommand Logic ---

fn handle_calibrate(settings: &Settings, outcomes_path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(outcomes_path)
        .with_context(|| format!("Failed to read {}", outcomes_path.display()))?;
    let outcomes: Vec<LiveOutcome> =
        serde_json::from_str(&content).context("Live outcomes must be a JSON array")?;

    let store = open_store(settings)?;
    let mut learner = ThresholdLearner::new(settings.learner.clone(), settings.scoring.clone())?;
    let mut adjustments = Vec::new();
    for outcome in &outcomes {
        let Some(stored) = store.get(&outcome.strategy_id, &outcome.run_id)? else {
            tracing::warn!(
                strategy = %outcome.strategy_id,
                run = %outcome.run_id,
                "No stored report for live outcome; skipping."
            );
            continue;
        };
        if let Some(adjustment) = learner.observe(&stored.report, outcome) {
            adjustments.push((outcome, adjustment));
        }
    }

    report::print_calibration(learner.observations(), &adjustments);
    println!("\n# Proposed [scoring] section");
    println!("{}", toml::to_string(learner.proposal())?);
    Ok(())
}
