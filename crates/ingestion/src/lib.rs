// In crates/ingestion/src/lib.rs

pub mod error;
mod reader;
mod records;
pub mod types;

use std::path::{Path, PathBuf};

use core_types::{
    BacktestResult, DataSufficiency, EquityPoint, Kline, MarketData, RunMetadata, Stage,
    StageOutput, Symbol, Timeframe, Trade, Warning, WarningKind,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::{debug, info, warn};

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{BacktestSource, FileFormat, IngestionSettings};

/// Reads every trade record from a CSV or JSON file.
pub fn read_trades(path: &Path, fee_rate_bps: f64) -> Result<Vec<Trade>> {
    let fee_rate = Decimal::from_f64(fee_rate_bps).ok_or_else(|| Error::Parse {
        path: path.to_path_buf(),
        record: 0,
        reason: format!("fee rate {fee_rate_bps} bps is not representable"),
    })?;
    reader::read_rows(path, "trades")?
        .iter()
        .map(|row| records::trade_from_row(row, fee_rate))
        .collect()
}

/// Reads an equity curve, enforcing strictly increasing timestamps.
pub fn read_equity(path: &Path) -> Result<Vec<EquityPoint>> {
    let rows = reader::read_rows(path, "equity")?;
    let mut curve: Vec<EquityPoint> = Vec::with_capacity(rows.len());
    for row in &rows {
        let point = records::equity_from_row(row)?;
        if let Some(prev) = curve.last() {
            if point.timestamp <= prev.timestamp {
                return Err(row.invalid(format!(
                    "timestamp {} does not come after {}",
                    point.timestamp, prev.timestamp
                )));
            }
        }
        curve.push(point);
    }
    Ok(curve)
}

/// Loads and validates one backtest run.
///
/// Malformed input aborts with a typed error. Too few trades does not: the
/// result is returned flagged as insufficient, with an `InsufficientData` warning.
pub fn load_backtest(
    source: &BacktestSource,
    meta: RunMetadata,
    settings: &IngestionSettings,
) -> Result<StageOutput<BacktestResult>> {
    let trades = read_trades(&source.trades, settings.fee_rate_bps)?;
    let equity = match &source.equity {
        Some(path) => Some(read_equity(path)?),
        None => None,
    };
    debug!(
        trades = trades.len(),
        equity_points = equity.as_ref().map(Vec::len),
        "Records read."
    );
    build_backtest(meta, trades, equity, settings)
}

/// Validates already-parsed records into a `BacktestResult`.
pub fn build_backtest(
    meta: RunMetadata,
    trades: Vec<Trade>,
    equity: Option<Vec<EquityPoint>>,
    settings: &IngestionSettings,
) -> Result<StageOutput<BacktestResult>> {
    let result = BacktestResult::new(
        meta,
        settings.initial_capital,
        trades,
        equity,
        settings.min_trades,
    )?;

    let mut warnings = Vec::new();
    if let DataSufficiency::Insufficient { trades, required } = result.sufficiency() {
        warn!(trades, required, "Backtest has too few trades for stable statistics.");
        warnings.push(Warning::new(
            Stage::Ingestion,
            WarningKind::InsufficientData,
            format!("{trades} trades recorded, at least {required} needed"),
        ));
    }

    info!(
        strategy = %result.strategy_id(),
        symbol = %result.symbol(),
        timeframe = %result.timeframe(),
        trades = result.trades().len(),
        equity_derived = result.equity_derived(),
        "Backtest ingested."
    );
    Ok(StageOutput::with_warnings(result, warnings))
}

/// Reads a kline file for a single market.
pub fn read_klines(path: &Path, symbol: Symbol, timeframe: Timeframe) -> Result<MarketData> {
    let rows = reader::read_rows(path, "klines")?;
    let mut klines: Vec<Kline> = Vec::with_capacity(rows.len());
    for row in &rows {
        let kline = records::kline_from_row(row)?;
        if let Some(prev) = klines.last() {
            if kline.open_time <= prev.open_time {
                return Err(row.invalid("bars are not in ascending open_time order"));
            }
        }
        klines.push(kline);
    }
    Ok(MarketData::new(symbol, timeframe, klines))
}

/// Splits a `{SYMBOL}_{TIMEFRAME}` file stem, e.g. `BTCUSDT_1h`.
pub fn parse_market_file_name(path: &Path) -> Option<(Symbol, Timeframe)> {
    let stem = path.file_stem()?.to_str()?;
    let (symbol, timeframe) = stem.rsplit_once('_')?;
    if symbol.is_empty() {
        return None;
    }
    let timeframe = Timeframe::parse(timeframe).ok()?;
    Some((Symbol::from(symbol), timeframe))
}

/// Loads every `{SYMBOL}_{TIMEFRAME}.csv|json` file in a directory.
///
/// Files whose names do not follow the convention are skipped with a log line.
/// The result is sorted by symbol, then timeframe length.
pub fn load_market_dir(dir: &Path) -> Result<Vec<MarketData>> {
    let entries = std::fs::read_dir(dir).map_err(|source| Error::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && reader::detect_format(&path).is_ok() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut markets = Vec::with_capacity(paths.len());
    for path in paths {
        let Some((symbol, timeframe)) = parse_market_file_name(&path) else {
            warn!(path = %path.display(), "Skipping kline file with unrecognised name.");
            continue;
        };
        let market = read_klines(&path, symbol, timeframe)?;
        debug!(
            symbol = %market.symbol,
            timeframe = %market.timeframe,
            bars = market.klines.len(),
            "Loaded kline file."
        );
        markets.push(market);
    }
    markets.sort_by(|a, b| {
        a.symbol
            .cmp(&b.symbol)
            .then(a.timeframe.seconds().cmp(&b.timeframe.seconds()))
    });

    info!(markets = markets.len(), dir = %dir.display(), "Market data loaded.");
    Ok(markets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Side;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::TempDir;

    fn meta() -> RunMetadata {
        RunMetadata {
            strategy_id: "breakout".to_string(),
            run_id: "r1".to_string(),
            symbol: Symbol::from("ethusdt"),
            timeframe: Timeframe::parse("1h").unwrap(),
        }
    }

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    const TRADES_CSV: &str = "\
entry_time,exit_time,side,entry_price,exit_price,quantity,fee,pnl
2024-01-01T00:00:00Z,2024-01-01T04:00:00Z,long,100,110,1,,
2024-01-02T00:00:00Z,2024-01-02T02:00:00Z,sell,100,95,2,0.5,
1704326400000,1704330000000,buy,50,49,1,0,-1
";

    #[test]
    fn csv_trades_fill_in_fee_and_pnl() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "trades.csv", TRADES_CSV);
        let trades = read_trades(&path, 10.0).unwrap();

        assert_eq!(trades.len(), 3);
        // (100 + 110) * 1 * 10 / 10_000
        assert_eq!(trades[0].fee, dec!(0.21));
        assert_eq!(trades[0].pnl, dec!(9.79));
        assert_eq!(trades[1].side, Side::Short);
        assert_eq!(trades[1].pnl, dec!(9.5));
        assert_eq!(trades[2].pnl, dec!(-1));
    }

    #[test]
    fn bad_record_reports_its_number() {
        let dir = TempDir::new().unwrap();
        let body = "entry_time,exit_time,side,entry_price,exit_price,quantity\n\
                    2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,long,100,101,1\n\
                    2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,long,abc,101,1\n";
        let path = write(&dir, "trades.csv", body);
        match read_trades(&path, 0.0) {
            Err(Error::Parse { record, .. }) => assert_eq!(record, 2),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn exit_before_entry_is_fatal() {
        let dir = TempDir::new().unwrap();
        let body = "entry_time,exit_time,side,entry_price,exit_price,quantity\n\
                    2024-01-01T05:00:00Z,2024-01-01T01:00:00Z,long,100,101,1\n";
        let path = write(&dir, "trades.csv", body);
        assert!(matches!(
            read_trades(&path, 0.0),
            Err(Error::Parse { record: 1, .. })
        ));
    }

    #[test]
    fn json_trades_accept_wrapped_arrays() {
        let dir = TempDir::new().unwrap();
        let body = r#"{"trades": [
            {"entry_time": "2024-01-01T00:00:00Z", "exit_time": "2024-01-01T01:00:00Z",
             "side": "short", "entry_price": 200.0, "exit_price": 190.0, "quantity": 0.5,
             "fee": 0, "signal_price": 199.5}
        ]}"#;
        let path = write(&dir, "trades.json", body);
        let trades = read_trades(&path, 0.0).unwrap();
        assert_eq!(trades[0].pnl, dec!(5));
        assert_eq!(trades[0].signal_price, Some(dec!(199.5)));
    }

    #[test]
    fn few_trades_are_flagged_not_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "trades.csv", TRADES_CSV);
        let output = load_backtest(
            &BacktestSource::new(&path),
            meta(),
            &IngestionSettings::default(),
        )
        .unwrap();

        assert!(output.has(WarningKind::InsufficientData));
        assert!(!output.value.sufficiency().is_sufficient());
        assert!(output.value.equity_derived());
        assert_eq!(output.value.equity_curve().len(), 4);
    }

    #[test]
    fn supplied_equity_must_increase_in_time() {
        let dir = TempDir::new().unwrap();
        let body = "timestamp,equity\n\
                    2024-01-01T00:00:00Z,1000\n\
                    2024-01-01T00:00:00Z,1010\n";
        let path = write(&dir, "equity.csv", body);
        assert!(matches!(
            read_equity(&path),
            Err(Error::Parse { record: 2, .. })
        ));
    }

    #[test]
    fn market_dir_uses_file_name_convention() {
        let dir = TempDir::new().unwrap();
        let bars = "open_time,open,high,low,close,volume\n\
                    2024-01-01T00:00:00Z,1,2,0.5,1.5,10\n\
                    2024-01-01T01:00:00Z,1.5,2,1,1.8,12\n";
        write(&dir, "SOLUSDT_1h.csv", bars);
        write(&dir, "BTCUSDT_4h.csv", bars);
        write(&dir, "notes.csv", bars);

        let markets = load_market_dir(dir.path()).unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0].symbol, Symbol::from("BTCUSDT"));
        assert_eq!(markets[1].timeframe.label(), "1h");
        assert_eq!(markets[1].klines.len(), 2);
    }
}
