//! Financial statements: balance sheet, income statement and cash flow, each
//! annual and quarterly. Every (statement, frequency) pair is an independent
//! unit, so one failing statement never blocks its siblings.

use super::{run_per_ticker, BatchPlan, FetchContext, FetchError, FetchSummary, UnitOutcome};
use crate::files::write_segment;
use crate::flatten::{flatten_normalized, FlattenOptions, RenameTable};
use crate::record::ProviderResponse;
use crate::segment::{Frequency, SegmentFile, StatementKind, TickerSegment};
use crate::table::Table;

/// Leading columns of every statement file; line items follow.
pub const STATEMENT_LEAD_COLUMNS: &[&str] = &["ticker", "date", "periodtype", "currencycode"];

pub fn fetch_statement_one(
    ctx: &FetchContext<'_>,
    ticker: &str,
    kind: StatementKind,
    frequency: Frequency,
) -> Result<UnitOutcome, FetchError> {
    let records = match ctx.provider.financial_statement(ticker, kind, frequency)? {
        ProviderResponse::Empty => return Ok(UnitOutcome::Skipped("no statement data".into())),
        ProviderResponse::SingleRecord(r) => vec![r],
        ProviderResponse::Table(rows) if rows.is_empty() => {
            return Ok(UnitOutcome::Skipped("no statement data".into()))
        }
        ProviderResponse::Table(rows) => rows,
    };

    let renames = RenameTable::statements();
    let rows: Vec<_> = records
        .iter()
        .map(|r| {
            let mut row = flatten_normalized(r, &FlattenOptions::default(), &renames);
            row.prepend("ticker", Some(ticker.to_string()));
            row
        })
        .collect();
    let mut table = Table::from_rows(&rows)?;
    table.move_to_front(STATEMENT_LEAD_COLUMNS)?;

    let file = SegmentFile::ticker(TickerSegment::Statement { kind, frequency }, ticker);
    let (path, meta) = write_segment(ctx.layout, &file, &table)?;
    Ok(UnitOutcome::Written {
        path,
        rows: meta.row_count,
    })
}

/// All six statements for every ticker.
pub fn fetch_statements(
    ctx: &FetchContext<'_>,
    tickers: &[String],
    plan: &BatchPlan,
) -> FetchSummary {
    run_per_ticker("financial_statements", tickers, plan, |ticker, summary| {
        for kind in StatementKind::ALL {
            for frequency in Frequency::ALL {
                let unit = format!("{ticker}/{}_{}", kind.code(), frequency.code());
                summary.record(&unit, fetch_statement_one(ctx, ticker, kind, frequency));
            }
        }
    })
}
