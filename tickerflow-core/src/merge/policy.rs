//! Per-dataset postprocessing applied after concatenation.

use polars::prelude::*;

use crate::segment::DatasetId;
use crate::table::{Cell, Table, TableError};

/// Price columns forward-filled in merged history.
pub const PRICE_COLUMNS: &[&str] = &["open", "high", "low", "close", "adjclose"];

/// Columns whose nulls become `0` in merged history.
pub const EVENT_COLUMNS: &[&str] = &["dividends", "splits"];

/// Column dropped from merged officers; it changes on every fetch.
pub const OFFICERS_VOLATILE_COLUMN: &str = "maxage";

/// Settings shared by every merge of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSettings {
    /// Statements in other currencies are dropped.
    pub reporting_currency: String,
    /// Ingestion date stamped into `date` columns.
    pub ingestion_date: chrono::NaiveDate,
}

impl MergeSettings {
    pub fn new(ingestion_date: chrono::NaiveDate) -> Self {
        Self {
            reporting_currency: "USD".to_string(),
            ingestion_date,
        }
    }

    fn stamp(&self) -> Cell {
        Some(self.ingestion_date.format("%Y-%m-%d").to_string())
    }
}

/// Apply the dataset's postprocessing to a concatenated table.
pub fn apply(dataset: DatasetId, table: &mut Table, settings: &MergeSettings) -> Result<(), TableError> {
    match dataset {
        DatasetId::History => history(table),
        DatasetId::OptionChain | DatasetId::TechnicalReports => table.insert_column(0, "date", settings.stamp()),
        DatasetId::TechnicalInsights => {
            table.insert_column(0, "date", settings.stamp())?;
            if table.has_column("instrument_provider") {
                let before = table.len();
                table.map_lazy(|lf| lf.filter(col("instrument_provider").is_not_null()))?;
                let dropped = before - table.len();
                if dropped > 0 {
                    tracing::debug!(dropped, "insights rows without instrument_provider removed");
                }
            }
            Ok(())
        }
        DatasetId::Statement { .. } => statements(table, &settings.reporting_currency),
        DatasetId::Fundamentals(_) => {
            table.sort_columns()?;
            ticker_then_date(table, settings)
        }
        DatasetId::Valuation => ticker_then_date(table, settings),
        DatasetId::Officers => {
            table.remove_column(OFFICERS_VOLATILE_COLUMN);
            table.move_to_front(&["date", "ticker"])
        }
    }
}

/// `ticker` first, stamped `date` second.
fn ticker_then_date(table: &mut Table, settings: &MergeSettings) -> Result<(), TableError> {
    table.move_to_front(&["ticker"])?;
    let position = usize::from(table.has_column("ticker"));
    table.insert_column(position, "date", settings.stamp())
}

/// Keep rows in the reporting currency, then one row per (ticker, date).
pub fn statements(table: &mut Table, currency: &str) -> Result<(), TableError> {
    if table.has_column("currencycode") {
        let currency = currency.to_string();
        table.map_lazy(|lf| lf.filter(col("currencycode").eq(lit(currency))))?;
    }
    if table.has_column("ticker") && table.has_column("date") {
        table.dedupe_by(&["ticker", "date"])?;
    }
    Ok(())
}

/// Sort by (ticker, date), forward-fill missing prices per ticker and mark
/// the filled rows with zero volume. Null dividends and splits become `0`.
pub fn history(table: &mut Table) -> Result<(), TableError> {
    table.sort_rows_by(&["ticker", "date"])?;
    forward_fill_prices(table)?;
    for c in EVENT_COLUMNS {
        table.ensure_column(c)?;
    }
    let zeros: Vec<Expr> = EVENT_COLUMNS.iter().map(|c| col(*c).fill_null(lit("0"))).collect();
    table.map_lazy(|lf| lf.with_columns(zeros))
}

/// Forward-fill [`PRICE_COLUMNS`] within each ticker, in current row order.
/// A row with any missing price gets `volume = 0`, whether or not a prior
/// value existed to fill from.
pub fn forward_fill_prices(table: &mut Table) -> Result<(), TableError> {
    table.ensure_column("volume")?;
    let prices: Vec<&str> = PRICE_COLUMNS.iter().copied().filter(|c| table.has_column(c)).collect();
    let Some(any_missing) = prices.iter().map(|c| col(*c).is_null()).reduce(|a, b| a.or(b)) else {
        return Ok(());
    };
    let per_ticker = table.has_column("ticker");

    let mut exprs: Vec<Expr> = prices
        .iter()
        .map(|c| {
            let filled = col(*c).forward_fill(None);
            if per_ticker {
                filled.over([col("ticker")])
            } else {
                filled
            }
        })
        .collect();
    // evaluated against the unfilled input, like the price columns
    exprs.push(
        when(any_missing)
            .then(lit("0"))
            .otherwise(col("volume"))
            .alias("volume"),
    );
    table.map_lazy(|lf| lf.with_columns(exprs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn table(columns: &[&str], rows: &[&[Option<&str>]]) -> Table {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| c.map(String::from)).collect())
            .collect();
        Table::from_cells(columns.iter().copied(), rows).unwrap()
    }

    fn settings() -> MergeSettings {
        MergeSettings::new(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap())
    }

    #[test]
    fn history_fills_from_same_ticker_only() {
        let cols = [
            "date", "ticker", "open", "high", "low", "close", "adjclose", "volume", "dividends", "splits",
        ];
        let mut t = table(
            &cols,
            &[
                &[Some("2024-01-03"), Some("AAA"), None, None, None, None, None, Some("900"), None, None],
                &[Some("2024-01-02"), Some("AAA"), Some("1"), Some("2"), Some("0.5"), Some("1.5"), Some("1.4"), Some("100"), Some("0.2"), None],
                &[Some("2024-01-02"), Some("BBB"), None, None, None, None, None, Some("7"), None, None],
            ],
        );
        history(&mut t).unwrap();

        assert_eq!(t.cell(0, "date"), Some("2024-01-02"));
        assert_eq!(t.cell(1, "close"), Some("1.5"));
        assert_eq!(t.cell(1, "volume"), Some("0"));
        assert_eq!(t.cell(1, "dividends"), Some("0"));
        assert_eq!(t.cell(0, "dividends"), Some("0.2"));
        assert_eq!(t.cell(2, "ticker"), Some("BBB"));
        assert_eq!(t.cell(2, "close"), None, "nothing earlier to fill from");
        assert_eq!(t.cell(2, "volume"), Some("0"));
        assert_eq!(t.cell(2, "splits"), Some("0"));
    }

    #[test]
    fn statements_filter_currency_then_dedupe() {
        let mut t = table(
            &["ticker", "date", "currencycode", "totalrevenue"],
            &[
                &[Some("AAA"), Some("2023-12-31"), Some("USD"), Some("1")],
                &[Some("AAA"), Some("2023-12-31"), Some("USD"), Some("2")],
                &[Some("AAA"), Some("2022-12-31"), Some("EUR"), Some("3")],
                &[Some("BBB"), Some("2023-12-31"), None, Some("4")],
            ],
        );
        statements(&mut t, "USD").unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.cell(0, "totalrevenue"), Some("1"));
    }

    #[test]
    fn fundamentals_sorted_with_ticker_and_date_first() {
        let mut t = table(
            &["summary_pe", "ticker", "summary_beta"],
            &[&[Some("10"), Some("AAA"), Some("1.1")]],
        );
        apply(
            DatasetId::Fundamentals(crate::segment::FundamentalsModule::Summary),
            &mut t,
            &settings(),
        )
        .unwrap();
        assert_eq!(t.columns(), ["ticker", "date", "summary_beta", "summary_pe"]);
        assert_eq!(t.cell(0, "date"), Some("2024-06-14"));
    }

    #[test]
    fn insights_without_provider_dropped() {
        let mut t = table(
            &["symbol", "instrument_provider"],
            &[&[Some("AAA"), Some("Trading Central")], &[Some("BBB"), None]],
        );
        apply(DatasetId::TechnicalInsights, &mut t, &settings()).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.columns()[0], "date");
    }

    #[test]
    fn officers_lose_maxage() {
        let mut t = table(
            &["ticker", "date", "name", "maxage"],
            &[&[Some("AAA"), Some("2024-06-14"), Some("Jane"), Some("1")]],
        );
        apply(DatasetId::Officers, &mut t, &settings()).unwrap();
        assert_eq!(t.columns(), ["date", "ticker", "name"]);
    }
}
