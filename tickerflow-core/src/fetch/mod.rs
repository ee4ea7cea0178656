//! Fetch stage: provider records to segment files.
//!
//! Tickers are processed in input order, in fixed-size batches with a
//! blocking pause between batches. Every unit of work (one ticker's
//! segment, or one batch file) is independent: errors are logged, recorded
//! in the [`FetchSummary`] and the loop moves on.

pub mod fundamentals;
pub mod pricing;
pub mod statements;

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::files::FileError;
use crate::flatten::{scalar_cell, FlatRow};
use crate::layout::Layout;
use crate::provider::{MarketDataProvider, ProviderError};
use crate::record::Record;
use crate::table::{Table, TableError};

pub use fundamentals::{fetch_fundamentals, fetch_officers, fetch_valuations};
pub use pricing::{fetch_history, fetch_option_chain, fetch_technical_insights};
pub use statements::fetch_statements;

/// Structured fetch errors for one unit of work.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("missing required columns {missing:?}")]
    MissingColumns { missing: Vec<String> },

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    File(#[from] FileError),
}

/// Batching parameters of one fetch stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub pause: Duration,
}

impl BatchPlan {
    pub fn new(batch_size: usize, pause: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pause,
        }
    }

    /// Batches of 5 with a 2 second pause.
    pub fn standard() -> Self {
        Self::new(5, Duration::from_secs(2))
    }

    /// No pause at all, for tests and offline providers.
    pub fn unthrottled(batch_size: usize) -> Self {
        Self::new(batch_size, Duration::ZERO)
    }

    pub fn batch_count(&self, tickers: usize) -> usize {
        tickers.div_ceil(self.batch_size)
    }
}

impl Default for BatchPlan {
    fn default() -> Self {
        Self::standard()
    }
}

/// Everything a fetcher needs besides the tickers.
pub struct FetchContext<'a> {
    pub provider: &'a dyn MarketDataProvider,
    pub layout: &'a Layout,
    /// Ingestion date stamped onto segments that carry one.
    pub today: NaiveDate,
}

/// Result of one unit of work that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Written { path: PathBuf, rows: usize },
    Skipped(String),
}

/// Summary of a fetch stage.
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub stage: String,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<(String, FetchError)>,
}

impl FetchSummary {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Self::default()
        }
    }

    pub fn total(&self) -> usize {
        self.written + self.skipped + self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Record and log the result of one unit.
    pub fn record(&mut self, unit: &str, result: Result<UnitOutcome, FetchError>) {
        match result {
            Ok(UnitOutcome::Written { path, rows }) => {
                debug!(stage = %self.stage, unit, rows, path = %path.display(), "saved");
                self.written += 1;
            }
            Ok(UnitOutcome::Skipped(reason)) => {
                warn!(stage = %self.stage, unit, "skipped: {reason}");
                self.skipped += 1;
            }
            Err(e) => {
                error!(stage = %self.stage, unit, "failed: {e}");
                self.failed += 1;
                self.errors.push((unit.to_string(), e));
            }
        }
    }

    pub fn absorb(&mut self, other: FetchSummary) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }

    fn log_complete(&self) {
        info!(
            stage = %self.stage,
            written = self.written,
            skipped = self.skipped,
            failed = self.failed,
            "fetch complete"
        );
    }
}

/// Run `work` over `tickers` in batches, sleeping `plan.pause` between
/// batches (not after the last). `work` receives the 1-based batch number.
pub fn for_each_batch<F>(tickers: &[String], plan: &BatchPlan, mut work: F)
where
    F: FnMut(usize, &[String]),
{
    let total = plan.batch_count(tickers.len());
    for (i, batch) in tickers.chunks(plan.batch_size).enumerate() {
        info!("batch {}/{}: {}", i + 1, total, batch.join(", "));
        work(i + 1, batch);
        if i + 1 < total && !plan.pause.is_zero() {
            std::thread::sleep(plan.pause);
        }
    }
}

/// Per-ticker fetch loop shared by the per-ticker segments.
pub fn run_per_ticker<F>(stage: &str, tickers: &[String], plan: &BatchPlan, mut per_ticker: F) -> FetchSummary
where
    F: FnMut(&str, &mut FetchSummary),
{
    let mut summary = FetchSummary::new(stage);
    for_each_batch(tickers, plan, |_, batch| {
        for ticker in batch {
            per_ticker(ticker, &mut summary);
        }
    });
    summary.log_complete();
    summary
}

/// Project records onto a fixed column list. Each provider key goes through
/// the naming policy first, so `contractSymbol` fills `contractsymbol`.
/// `ticker` is filled from the argument when listed. Fails when none of the
/// records carries one of the `required` columns.
pub(crate) fn project_records(
    records: &[Record],
    columns: &[&str],
    ticker: &str,
    required: &[&str],
) -> Result<Table, FetchError> {
    let normalized: Vec<FlatRow> = records
        .iter()
        .map(|r| {
            let mut row = FlatRow::new();
            for (k, v) in r {
                row.insert_unique(&crate::flatten::canonical_name(k), scalar_cell(v));
            }
            row
        })
        .collect();

    let missing: Vec<String> = required
        .iter()
        .filter(|col| !normalized.iter().any(|row| row.contains(col)))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(FetchError::MissingColumns { missing });
    }

    let cells = normalized
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| {
                    if *col == "ticker" {
                        Some(ticker.to_string())
                    } else {
                        row.get(col).cloned().flatten()
                    }
                })
                .collect()
        })
        .collect();
    Ok(Table::from_cells(columns.iter().copied(), cells)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batches_follow_input_order() {
        let tickers: Vec<String> = (1..=7).map(|i| format!("T{i}")).collect();
        let mut seen = Vec::new();
        for_each_batch(&tickers, &BatchPlan::unthrottled(3), |n, batch| {
            seen.push((n, batch.to_vec()));
        });
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[2].1, vec!["T7".to_string()]);
        let flat: Vec<String> = seen.into_iter().flat_map(|(_, b)| b).collect();
        assert_eq!(flat, tickers);
    }

    #[test]
    fn zero_batch_size_clamped() {
        assert_eq!(BatchPlan::unthrottled(0).batch_size, 1);
        assert_eq!(BatchPlan::standard().batch_count(11), 3);
    }

    #[test]
    fn projection_checks_required_columns() {
        let rec = json!({"open": 1.0}).as_object().cloned().unwrap();
        let err = project_records(&[rec], &["ticker", "open", "close"], "AAA", &["close"]).unwrap_err();
        assert!(matches!(err, FetchError::MissingColumns { .. }));
    }

    #[test]
    fn projection_normalizes_keys_and_fills_ticker() {
        let rec = json!({"contractSymbol": "X1", "lastPrice": 2.5, "extra": 1})
            .as_object()
            .cloned()
            .unwrap();
        let t = project_records(&[rec], &["ticker", "contractsymbol", "lastprice"], "AAA", &[]).unwrap();
        assert_eq!(t.columns(), ["ticker", "contractsymbol", "lastprice"]);
        assert_eq!(t.cell(0, "ticker"), Some("AAA"));
        assert_eq!(t.cell(0, "contractsymbol"), Some("X1"));
        assert_eq!(t.cell(0, "lastprice"), Some("2.5"));
    }

    #[test]
    fn summary_counts_units() {
        let mut s = FetchSummary::new("test");
        s.record("a", Ok(UnitOutcome::Skipped("empty".into())));
        s.record(
            "b",
            Err(FetchError::UnexpectedShape("single record".into())),
        );
        assert_eq!(s.total(), 2);
        assert!(!s.all_succeeded());
        assert_eq!(s.errors[0].0, "b");
    }
}
