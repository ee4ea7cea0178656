//! Pricing segments: daily history, option chains, technical insights.

use serde_json::Value;

use super::{project_records, run_per_ticker, BatchPlan, FetchContext, FetchError, FetchSummary, UnitOutcome};
use crate::files::write_segment;
use crate::flatten::{flatten_normalized, flatten_reports, FlattenOptions, RenameTable};
use crate::record::ProviderResponse;
use crate::segment::{SegmentFile, TickerSegment};
use crate::table::Table;

pub const HISTORY_COLUMNS: &[&str] = &[
    "date", "ticker", "open", "high", "low", "close", "adjclose", "volume", "dividends", "splits",
];

pub const OPTION_CHAIN_COLUMNS: &[&str] = &[
    "ticker",
    "expiration",
    "optiontype",
    "contractsymbol",
    "strike",
    "lastprice",
    "bid",
    "ask",
    "volume",
    "openinterest",
    "impliedvolatility",
    "inthemoney",
];

/// Key excluded from the insights row and flattened separately.
pub const REPORTS_KEY: &str = "reports";

fn write_ticker_table(
    ctx: &FetchContext<'_>,
    segment: TickerSegment,
    ticker: &str,
    table: &Table,
) -> Result<UnitOutcome, FetchError> {
    let file = SegmentFile::ticker(segment, ticker);
    let (path, meta) = write_segment(ctx.layout, &file, table)?;
    Ok(UnitOutcome::Written {
        path,
        rows: meta.row_count,
    })
}

/// History for one ticker.
pub fn fetch_history_one(ctx: &FetchContext<'_>, ticker: &str) -> Result<UnitOutcome, FetchError> {
    let records = match ctx.provider.history(ticker)? {
        ProviderResponse::Empty => return Ok(UnitOutcome::Skipped("no price history".into())),
        ProviderResponse::SingleRecord(r) => vec![r],
        ProviderResponse::Table(rows) if rows.is_empty() => {
            return Ok(UnitOutcome::Skipped("no price history".into()))
        }
        ProviderResponse::Table(rows) => rows,
    };
    let table = project_records(&records, HISTORY_COLUMNS, ticker, &["close"])?;
    write_ticker_table(ctx, TickerSegment::History, ticker, &table)
}

/// Option chain for one ticker.
pub fn fetch_option_chain_one(
    ctx: &FetchContext<'_>,
    ticker: &str,
) -> Result<UnitOutcome, FetchError> {
    let records = match ctx.provider.option_chain(ticker)? {
        ProviderResponse::Empty => return Ok(UnitOutcome::Skipped("no option chain".into())),
        ProviderResponse::SingleRecord(r) => vec![r],
        ProviderResponse::Table(rows) if rows.is_empty() => {
            return Ok(UnitOutcome::Skipped("no option chain".into()))
        }
        ProviderResponse::Table(rows) => rows,
    };
    let table = project_records(&records, OPTION_CHAIN_COLUMNS, ticker, &["contractsymbol"])?;
    write_ticker_table(ctx, TickerSegment::OptionChain, ticker, &table)
}

/// Technical insights for one ticker. Writes the flattened insights row and,
/// when present, one row per report into a sibling file.
pub fn fetch_technical_insights_one(
    ctx: &FetchContext<'_>,
    ticker: &str,
    summary: &mut FetchSummary,
) -> Result<UnitOutcome, FetchError> {
    let record = match ctx.provider.technical_insights(ticker)? {
        ProviderResponse::Empty => {
            return Ok(UnitOutcome::Skipped("no technical insights".into()))
        }
        ProviderResponse::SingleRecord(r) => r,
        ProviderResponse::Table(mut rows) => match rows.len() {
            0 => return Ok(UnitOutcome::Skipped("no technical insights".into())),
            1 => rows.remove(0),
            n => {
                return Err(FetchError::UnexpectedShape(format!(
                    "{n} insight records for one ticker"
                )))
            }
        },
    };

    let reports: Vec<Value> = record
        .get(REPORTS_KEY)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut row = flatten_normalized(
        &record,
        &FlattenOptions::excluding([REPORTS_KEY]),
        &RenameTable::technical_insights(),
    );
    if !row.contains("symbol") {
        row.prepend("symbol", Some(ticker.to_string()));
    }
    let insights = Table::from_rows(&[row])?;
    let outcome = write_ticker_table(ctx, TickerSegment::TechnicalInsights, ticker, &insights)?;

    let unit = format!("{ticker}/reports");
    let report_rows = flatten_reports(&reports);
    if report_rows.is_empty() {
        summary.record(&unit, Ok(UnitOutcome::Skipped("no reports".into())));
    } else {
        let result = Table::from_rows(&report_rows)
            .map_err(FetchError::from)
            .and_then(|table| write_ticker_table(ctx, TickerSegment::TechnicalReports, ticker, &table));
        summary.record(&unit, result);
    }
    Ok(outcome)
}

/// History for every ticker, batched.
pub fn fetch_history(ctx: &FetchContext<'_>, tickers: &[String], plan: &BatchPlan) -> FetchSummary {
    run_per_ticker("history", tickers, plan, |ticker, summary| {
        summary.record(ticker, fetch_history_one(ctx, ticker));
    })
}

pub fn fetch_option_chain(
    ctx: &FetchContext<'_>,
    tickers: &[String],
    plan: &BatchPlan,
) -> FetchSummary {
    run_per_ticker("option_chain", tickers, plan, |ticker, summary| {
        summary.record(ticker, fetch_option_chain_one(ctx, ticker));
    })
}

pub fn fetch_technical_insights(
    ctx: &FetchContext<'_>,
    tickers: &[String],
    plan: &BatchPlan,
) -> FetchSummary {
    run_per_ticker("technical_insights", tickers, plan, |ticker, summary| {
        let result = fetch_technical_insights_one(ctx, ticker, summary);
        summary.record(ticker, result);
    })
}
