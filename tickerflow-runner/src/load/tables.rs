//! Destination table declarations, one per merged dataset.

use tickerflow_core::{DatasetId, Frequency, FundamentalsModule, StatementKind, Table};

use super::coerce::{looks_numeric, ColumnKind};

/// Which columns are stored as REAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericColumns {
    /// Exactly these.
    Listed(&'static [&'static str]),
    /// Every column not otherwise typed, except these.
    AllExcept(&'static [&'static str]),
    /// Columns whose every non-null cell is a number.
    Inferred,
}

/// Declaration of one destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub natural_key: &'static [&'static str],
    pub date_columns: &'static [&'static str],
    pub epoch_ms_columns: &'static [&'static str],
    pub numeric: NumericColumns,
    pub bool_columns: &'static [&'static str],
    pub json_columns: &'static [&'static str],
    /// Nulls here are replaced by the ingestion date after coercion.
    pub today_fill_columns: &'static [&'static str],
}

const HISTORY_NUMERIC: &[&str] = &[
    "open", "high", "low", "close", "adjclose", "volume", "dividends", "splits",
];

const OPTION_NUMERIC: &[&str] = &[
    "strike",
    "lastprice",
    "bid",
    "ask",
    "volume",
    "openinterest",
    "impliedvolatility",
];

const STATEMENT_TEXT: &[&str] = &["ticker", "date", "periodtype", "currencycode"];

impl TableSpec {
    fn text_table(name: impl Into<String>, natural_key: &'static [&'static str]) -> Self {
        Self {
            name: name.into(),
            natural_key,
            date_columns: &[],
            epoch_ms_columns: &[],
            numeric: NumericColumns::Inferred,
            bool_columns: &[],
            json_columns: &[],
            today_fill_columns: &[],
        }
    }

    /// The destination of a merged dataset.
    pub fn for_dataset(dataset: DatasetId) -> TableSpec {
        match dataset {
            DatasetId::History => TableSpec {
                date_columns: &["date"],
                numeric: NumericColumns::Listed(HISTORY_NUMERIC),
                ..Self::text_table("pricing_history", &["ticker", "date"])
            },
            DatasetId::OptionChain => TableSpec {
                date_columns: &["date", "expiration"],
                numeric: NumericColumns::Listed(OPTION_NUMERIC),
                bool_columns: &["inthemoney"],
                ..Self::text_table("pricing_option_chain", &["date", "contractsymbol"])
            },
            DatasetId::TechnicalInsights => TableSpec {
                date_columns: &["date", "research_date"],
                epoch_ms_columns: &["ms_summary_date"],
                json_columns: &["sig_devs", "sec_reports", "events"],
                today_fill_columns: &["ms_summary_date", "research_date"],
                ..Self::text_table("pricing_technical_insights", &["date", "symbol"])
            },
            DatasetId::TechnicalReports => TableSpec {
                date_columns: &["date", "reportdate"],
                ..Self::text_table("pricing_technical_reports", &["ticker", "id"])
            },
            DatasetId::Statement { kind, frequency } => TableSpec {
                date_columns: &["date"],
                numeric: NumericColumns::AllExcept(STATEMENT_TEXT),
                ..Self::text_table(statement_table(kind, frequency), &["ticker", "date"])
            },
            DatasetId::Fundamentals(module) => {
                let json_columns: &'static [&'static str] = match module {
                    FundamentalsModule::Profile => {
                        &["profile_companyofficers", "profile_executiveteam"]
                    }
                    _ => &[],
                };
                TableSpec {
                    date_columns: &["date"],
                    json_columns,
                    ..Self::text_table(fundamentals_table(module), &["ticker", "date"])
                }
            }
            DatasetId::Valuation => TableSpec {
                date_columns: &["date", "asofdate"],
                ..Self::text_table("fundamentals_valuation_data", &["ticker", "asofdate"])
            },
            DatasetId::Officers => TableSpec {
                date_columns: &["date"],
                ..Self::text_table("fundamentals_officers_data", &["date", "ticker", "name"])
            },
        }
    }

    /// Resolve the kind of every column of `table`.
    pub fn column_kinds(&self, table: &Table) -> Vec<ColumnKind> {
        table
            .columns()
            .iter()
            .map(|name| {
                let name = name.as_str();
                if self.date_columns.contains(&name) {
                    ColumnKind::Date
                } else if self.epoch_ms_columns.contains(&name) {
                    ColumnKind::EpochMs
                } else if self.bool_columns.contains(&name) {
                    ColumnKind::Bool
                } else if self.json_columns.contains(&name) {
                    ColumnKind::Json
                } else if self.is_numeric(table, name) {
                    ColumnKind::Real
                } else {
                    ColumnKind::Text
                }
            })
            .collect()
    }

    fn is_numeric(&self, table: &Table, name: &str) -> bool {
        match self.numeric {
            NumericColumns::Listed(cols) => cols.contains(&name),
            NumericColumns::AllExcept(cols) => !cols.contains(&name),
            NumericColumns::Inferred => {
                !self.natural_key.contains(&name)
                    && table.values(name).is_some_and(|cells| looks_numeric(cells))
            }
        }
    }
}

/// `financial_statements_{bs|is|cf}_{a|q}`.
pub fn statement_table(kind: StatementKind, frequency: Frequency) -> String {
    format!(
        "financial_statements_{}_{}",
        kind.code().to_ascii_lowercase(),
        frequency.code().to_ascii_lowercase()
    )
}

pub fn fundamentals_table(module: FundamentalsModule) -> &'static str {
    match module {
        FundamentalsModule::Summary => "fundamentals_summary_data",
        FundamentalsModule::KeyStats => "fundamentals_key_stats",
        FundamentalsModule::Financial => "fundamentals_financial_data",
        FundamentalsModule::Price => "fundamentals_price_data",
        FundamentalsModule::Profile => "fundamentals_profile_data",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_dataset_has_a_distinct_table() {
        let names: std::collections::HashSet<String> = DatasetId::all()
            .into_iter()
            .map(|d| TableSpec::for_dataset(d).name)
            .collect();
        assert_eq!(names.len(), DatasetId::all().len());
        assert!(names.contains("financial_statements_cf_q"));
        assert!(names.contains("fundamentals_key_stats"));
    }

    #[test]
    fn kinds_follow_declaration_then_inference() {
        let t = Table::from_cells(
            ["date", "symbol", "ms_summary_date", "st_score", "sector", "sig_devs"],
            vec![vec![
                Some("2024-06-14".into()),
                Some("AAA".into()),
                Some("1718366400000".into()),
                Some("3".into()),
                Some("Technology".into()),
                Some("[]".into()),
            ]],
        )
        .unwrap();
        let kinds = TableSpec::for_dataset(DatasetId::TechnicalInsights).column_kinds(&t);
        assert_eq!(
            kinds,
            [
                ColumnKind::Date,
                ColumnKind::Text,
                ColumnKind::EpochMs,
                ColumnKind::Real,
                ColumnKind::Text,
                ColumnKind::Json,
            ]
        );
    }

    #[test]
    fn statements_numeric_except_identity_columns() {
        let t = Table::from_cells(
            ["ticker", "date", "periodtype", "currencycode", "totalrevenue"],
            vec![vec![None, None, None, None, None]],
        )
        .unwrap();
        let spec = TableSpec::for_dataset(DatasetId::Statement {
            kind: StatementKind::IncomeStatement,
            frequency: Frequency::Annual,
        });
        assert_eq!(spec.name, "financial_statements_is_a");
        let kinds = spec.column_kinds(&t);
        assert_eq!(kinds[2], ColumnKind::Text);
        assert_eq!(kinds[4], ColumnKind::Real);
    }
}
