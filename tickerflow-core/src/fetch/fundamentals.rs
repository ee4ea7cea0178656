//! Fundamentals: per-batch module files, plus per-ticker valuation measures
//! and company officers.
//!
//! Module columns are prefixed with the module name (`summary_beta`,
//! `profile_companyofficers`) so the five merged datasets never collide.

use tracing::warn;

use super::{for_each_batch, run_per_ticker, BatchPlan, FetchContext, FetchError, FetchSummary, UnitOutcome};
use crate::files::write_segment;
use crate::flatten::{flatten_normalized, FlatRow, FlattenOptions, RenameTable};
use crate::record::ProviderResponse;
use crate::segment::{FundamentalsModule, SegmentFile, TickerSegment};
use crate::table::Table;

fn module_row(
    ctx: &FetchContext<'_>,
    ticker: &str,
    module: FundamentalsModule,
) -> Result<Option<FlatRow>, FetchError> {
    let record = match ctx.provider.fundamentals(ticker, module)? {
        ProviderResponse::Empty => return Ok(None),
        ProviderResponse::SingleRecord(r) => r,
        ProviderResponse::Table(mut rows) => match rows.len() {
            0 => return Ok(None),
            1 => rows.remove(0),
            n => {
                return Err(FetchError::UnexpectedShape(format!(
                    "{n} {} records for one ticker",
                    module.slug()
                )))
            }
        },
    };
    let flat = flatten_normalized(&record, &FlattenOptions::default(), &RenameTable::empty());
    let mut row = FlatRow::new();
    row.insert_unique("ticker", Some(ticker.to_string()));
    for (key, value) in flat {
        row.insert_unique(&format!("{}_{key}", module.slug()), value);
    }
    Ok(Some(row))
}

/// Fetch every fundamentals module per batch and write one file per
/// (module, batch). Rows are de-duplicated by ticker within the batch.
pub fn fetch_fundamentals(
    ctx: &FetchContext<'_>,
    tickers: &[String],
    plan: &BatchPlan,
) -> FetchSummary {
    let mut summary = FetchSummary::new("fundamentals");
    for_each_batch(tickers, plan, |batch_no, batch| {
        for module in FundamentalsModule::ALL {
            let mut rows = Vec::with_capacity(batch.len());
            for ticker in batch {
                match module_row(ctx, ticker, module) {
                    Ok(Some(row)) => rows.push(row),
                    Ok(None) => warn!(ticker = %ticker, module = module.slug(), "no data"),
                    Err(e) => {
                        let unit = format!("{ticker}/{}", module.slug());
                        summary.record(&unit, Err(e));
                    }
                }
            }

            let unit = format!("{}_batch{batch_no}", module.slug());
            if rows.is_empty() {
                summary.record(&unit, Ok(UnitOutcome::Skipped("no rows in batch".into())));
                continue;
            }
            let file = SegmentFile::batch(module, batch_no);
            let result = batch_table(&rows).and_then(|table| {
                let (path, meta) = write_segment(ctx.layout, &file, &table)?;
                Ok(UnitOutcome::Written {
                    path,
                    rows: meta.row_count,
                })
            });
            summary.record(&unit, result);
        }
    });
    summary.log_complete();
    summary
}

/// One row per ticker; the first occurrence wins.
fn batch_table(rows: &[FlatRow]) -> Result<Table, FetchError> {
    let mut table = Table::from_rows(rows)?;
    table.dedupe_by(&["ticker"])?;
    Ok(table)
}

pub fn fetch_valuation_one(ctx: &FetchContext<'_>, ticker: &str) -> Result<UnitOutcome, FetchError> {
    let records = match ctx.provider.valuation_measures(ticker)? {
        ProviderResponse::Empty => return Ok(UnitOutcome::Skipped("no valuation data".into())),
        ProviderResponse::SingleRecord(r) => vec![r],
        ProviderResponse::Table(rows) if rows.is_empty() => {
            return Ok(UnitOutcome::Skipped("no valuation data".into()))
        }
        ProviderResponse::Table(rows) => rows,
    };
    let rows: Vec<FlatRow> = records
        .iter()
        .map(|r| {
            let mut row = flatten_normalized(r, &FlattenOptions::default(), &RenameTable::empty());
            row.prepend("ticker", Some(ticker.to_string()));
            row
        })
        .collect();
    let table = Table::from_rows(&rows)?;
    let file = SegmentFile::ticker(TickerSegment::Valuation, ticker);
    let (path, meta) = write_segment(ctx.layout, &file, &table)?;
    Ok(UnitOutcome::Written {
        path,
        rows: meta.row_count,
    })
}

/// Officers for one ticker. Each row carries `ticker` and the ingestion `date`.
pub fn fetch_officers_one(ctx: &FetchContext<'_>, ticker: &str) -> Result<UnitOutcome, FetchError> {
    let records = match ctx.provider.company_officers(ticker)? {
        ProviderResponse::Empty => return Ok(UnitOutcome::Skipped("no officer list".into())),
        ProviderResponse::SingleRecord(r) => vec![r],
        ProviderResponse::Table(rows) if rows.is_empty() => {
            return Ok(UnitOutcome::Skipped("no officer list".into()))
        }
        ProviderResponse::Table(rows) => rows,
    };
    let date = ctx.today.to_string();
    let rows: Vec<FlatRow> = records
        .iter()
        .map(|r| {
            let mut row = flatten_normalized(r, &FlattenOptions::default(), &RenameTable::empty());
            row.prepend("date", Some(date.clone()));
            row.prepend("ticker", Some(ticker.to_string()));
            row
        })
        .collect();
    let table = Table::from_rows(&rows)?;
    let file = SegmentFile::ticker(TickerSegment::Officers, ticker);
    let (path, meta) = write_segment(ctx.layout, &file, &table)?;
    Ok(UnitOutcome::Written {
        path,
        rows: meta.row_count,
    })
}

pub fn fetch_valuations(ctx: &FetchContext<'_>, tickers: &[String], plan: &BatchPlan) -> FetchSummary {
    run_per_ticker("valuations", tickers, plan, |ticker, summary| {
        summary.record(ticker, fetch_valuation_one(ctx, ticker));
    })
}

pub fn fetch_officers(ctx: &FetchContext<'_>, tickers: &[String], plan: &BatchPlan) -> FetchSummary {
    run_per_ticker("officers", tickers, plan, |ticker, summary| {
        summary.record(ticker, fetch_officers_one(ctx, ticker));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;
    use crate::provider::synthetic::SyntheticProvider;
    use chrono::NaiveDate;

    fn setup() -> (tempfile::TempDir, Layout, SyntheticProvider, NaiveDate) {
        let today = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        (tmp, layout, SyntheticProvider::new(today), today)
    }

    #[test]
    fn module_files_per_batch_with_prefixed_columns() {
        let (_tmp, layout, provider, today) = setup();
        let ctx = FetchContext {
            provider: &provider,
            layout: &layout,
            today,
        };
        let tickers: Vec<String> = ["AAA", "BBB", "AAA", "CCC"].map(String::from).to_vec();
        let summary = fetch_fundamentals(&ctx, &tickers, &BatchPlan::unthrottled(3));
        assert_eq!(summary.written, 10);

        let first = Table::read_csv(&layout.fundamentals_dir().join("summary_batch1.csv")).unwrap();
        assert_eq!(first.columns()[0], "ticker");
        assert_eq!(first.len(), 2, "duplicate ticker removed within batch");
        assert!(first.columns().iter().skip(1).all(|c| c.starts_with("summary_")));

        let profile = Table::read_csv(&layout.fundamentals_dir().join("profile_batch2.csv")).unwrap();
        assert!(profile.has_column("profile_companyofficers"));
    }

    #[test]
    fn officers_carry_ticker_and_date() {
        let (_tmp, layout, provider, today) = setup();
        let ctx = FetchContext {
            provider: &provider,
            layout: &layout,
            today,
        };
        let summary = fetch_officers(&ctx, &["AAA".into()], &BatchPlan::unthrottled(5));
        assert_eq!(summary.written, 1);
        let t = Table::read_csv(&layout.fundamentals_dir().join("AAA_officers.csv")).unwrap();
        assert_eq!(&t.columns()[..2], ["ticker", "date"]);
        assert_eq!(t.cell(0, "date"), Some("2024-06-14"));
        assert!(t.has_column("maxage"));
    }

    #[test]
    fn valuations_keep_as_of_date() {
        let (_tmp, layout, provider, today) = setup();
        let ctx = FetchContext {
            provider: &provider,
            layout: &layout,
            today,
        };
        fetch_valuations(&ctx, &["AAA".into()], &BatchPlan::unthrottled(5));
        let t = Table::read_csv(&layout.fundamentals_dir().join("AAA_valuation.csv")).unwrap();
        assert_eq!(t.columns()[0], "ticker");
        assert!(t.has_column("asofdate"));
        assert_eq!(t.len(), 4);
    }
}
