//! Segment and dataset identifiers with their file naming scheme.
//!
//! Every file the pipeline writes has a structured name with a parser that
//! round-trips it. Merge and load prefer the JSON sidecar next to each file
//! (see [`crate::files`]) and fall back to these parsers only when the
//! sidecar is missing.
//!
//! Segment files:
//! - history, option chain: `{TICKER}.csv`
//! - technical insights: `{TICKER}_technical_insights.csv`
//! - technical reports: `{TICKER}_reports.csv`
//! - statements: `{TICKER}_{BS|IS|CF}_{A|Q}.csv`
//! - fundamentals: `{module}_batch{N}.csv`
//! - valuations: `{TICKER}_valuation.csv`
//! - officers: `{TICKER}_officers.csv`
//!
//! Merged datasets: `merged_{slug}.csv`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level pipeline domains, run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Pricing,
    FinancialStatements,
    Fundamentals,
}

impl Domain {
    pub const ALL: [Domain; 3] = [
        Domain::Pricing,
        Domain::FinancialStatements,
        Domain::Fundamentals,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Domain::Pricing => "pricing",
            Domain::FinancialStatements => "financial_statements",
            Domain::Fundamentals => "fundamentals",
        }
    }

    pub fn parse(s: &str) -> Option<Domain> {
        let s = s.trim().to_ascii_lowercase().replace('-', "_");
        Domain::ALL.into_iter().find(|d| d.slug() == s)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Financial statement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
}

impl StatementKind {
    pub const ALL: [StatementKind; 3] = [
        StatementKind::BalanceSheet,
        StatementKind::IncomeStatement,
        StatementKind::CashFlow,
    ];

    /// Two-letter code used in segment file names.
    pub fn code(self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "BS",
            StatementKind::IncomeStatement => "IS",
            StatementKind::CashFlow => "CF",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "balance_sheet",
            StatementKind::IncomeStatement => "income_statement",
            StatementKind::CashFlow => "cash_flow",
        }
    }

    /// Directory name under the statements tree.
    pub fn dir_name(self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "Balance Sheet",
            StatementKind::IncomeStatement => "Income Statement",
            StatementKind::CashFlow => "Cash Flow",
        }
    }

    fn from_code(code: &str) -> Option<StatementKind> {
        StatementKind::ALL.into_iter().find(|k| k.code() == code)
    }
}

/// Reporting frequency of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Annual,
    Quarterly,
}

impl Frequency {
    pub const ALL: [Frequency; 2] = [Frequency::Annual, Frequency::Quarterly];

    pub fn code(self) -> &'static str {
        match self {
            Frequency::Annual => "A",
            Frequency::Quarterly => "Q",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Frequency::Annual => "annual",
            Frequency::Quarterly => "quarterly",
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Frequency::Annual => "Annual",
            Frequency::Quarterly => "Quarterly",
        }
    }

    fn from_code(code: &str) -> Option<Frequency> {
        Frequency::ALL.into_iter().find(|f| f.code() == code)
    }
}

/// Fundamentals modules fetched per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundamentalsModule {
    Summary,
    KeyStats,
    Financial,
    Price,
    Profile,
}

impl FundamentalsModule {
    pub const ALL: [FundamentalsModule; 5] = [
        FundamentalsModule::Summary,
        FundamentalsModule::KeyStats,
        FundamentalsModule::Financial,
        FundamentalsModule::Price,
        FundamentalsModule::Profile,
    ];

    /// Short name; also the column prefix for the module's fields.
    pub fn slug(self) -> &'static str {
        match self {
            FundamentalsModule::Summary => "summary",
            FundamentalsModule::KeyStats => "keystats",
            FundamentalsModule::Financial => "fin",
            FundamentalsModule::Price => "price",
            FundamentalsModule::Profile => "profile",
        }
    }

    fn from_slug(slug: &str) -> Option<FundamentalsModule> {
        FundamentalsModule::ALL.into_iter().find(|m| m.slug() == slug)
    }
}

/// Per-ticker segment types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerSegment {
    History,
    OptionChain,
    TechnicalInsights,
    TechnicalReports,
    Statement {
        kind: StatementKind,
        frequency: Frequency,
    },
    Valuation,
    Officers,
}

impl TickerSegment {
    fn suffix(self) -> String {
        match self {
            TickerSegment::History | TickerSegment::OptionChain => String::new(),
            TickerSegment::TechnicalInsights => "_technical_insights".into(),
            TickerSegment::TechnicalReports => "_reports".into(),
            TickerSegment::Statement { kind, frequency } => {
                format!("_{}_{}", kind.code(), frequency.code())
            }
            TickerSegment::Valuation => "_valuation".into(),
            TickerSegment::Officers => "_officers".into(),
        }
    }
}

/// Identity of one segment file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SegmentFile {
    PerTicker {
        segment: TickerSegment,
        ticker: String,
    },
    PerBatch {
        module: FundamentalsModule,
        batch: usize,
    },
}

impl SegmentFile {
    pub fn ticker(segment: TickerSegment, ticker: impl Into<String>) -> Self {
        SegmentFile::PerTicker {
            segment,
            ticker: ticker.into(),
        }
    }

    pub fn batch(module: FundamentalsModule, batch: usize) -> Self {
        SegmentFile::PerBatch { module, batch }
    }

    pub fn ticker_name(&self) -> Option<&str> {
        match self {
            SegmentFile::PerTicker { ticker, .. } => Some(ticker),
            SegmentFile::PerBatch { .. } => None,
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            SegmentFile::PerTicker { segment, ticker } => {
                format!("{ticker}{}.csv", segment.suffix())
            }
            SegmentFile::PerBatch { module, batch } => {
                format!("{}_batch{batch}.csv", module.slug())
            }
        }
    }

    /// Parse a file name as a file of `segment`. Returns `None` when the
    /// name does not follow that segment's scheme.
    pub fn parse_ticker_file(segment: TickerSegment, file_name: &str) -> Option<SegmentFile> {
        let stem = file_name.strip_suffix(".csv")?;
        let ticker = match segment {
            TickerSegment::History | TickerSegment::OptionChain => stem,
            TickerSegment::Statement { .. } => {
                let mut parts = stem.rsplitn(3, '_');
                let freq = Frequency::from_code(parts.next()?)?;
                let kind = StatementKind::from_code(parts.next()?)?;
                let ticker = parts.next()?;
                if (TickerSegment::Statement {
                    kind,
                    frequency: freq,
                }) != segment
                {
                    return None;
                }
                ticker
            }
            other => stem.strip_suffix(other.suffix().as_str())?,
        };
        if ticker.is_empty() {
            return None;
        }
        Some(SegmentFile::ticker(segment, ticker))
    }

    /// Parse `{module}_batch{N}.csv`.
    pub fn parse_batch_file(file_name: &str) -> Option<SegmentFile> {
        let stem = file_name.strip_suffix(".csv")?;
        let (slug, n) = stem.rsplit_once("_batch")?;
        let module = FundamentalsModule::from_slug(slug)?;
        let batch = n.parse().ok()?;
        Some(SegmentFile::batch(module, batch))
    }
}

impl fmt::Display for SegmentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Identity of one merged dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetId {
    History,
    OptionChain,
    TechnicalInsights,
    TechnicalReports,
    Statement {
        kind: StatementKind,
        frequency: Frequency,
    },
    Fundamentals(FundamentalsModule),
    Valuation,
    Officers,
}

impl DatasetId {
    /// Every dataset in pipeline order.
    pub fn all() -> Vec<DatasetId> {
        let mut out = vec![
            DatasetId::History,
            DatasetId::OptionChain,
            DatasetId::TechnicalInsights,
            DatasetId::TechnicalReports,
        ];
        for kind in StatementKind::ALL {
            for frequency in Frequency::ALL {
                out.push(DatasetId::Statement { kind, frequency });
            }
        }
        out.extend(FundamentalsModule::ALL.map(DatasetId::Fundamentals));
        out.push(DatasetId::Valuation);
        out.push(DatasetId::Officers);
        out
    }

    pub fn for_domain(domain: Domain) -> Vec<DatasetId> {
        DatasetId::all()
            .into_iter()
            .filter(|d| d.domain() == domain)
            .collect()
    }

    pub fn domain(self) -> Domain {
        match self {
            DatasetId::History
            | DatasetId::OptionChain
            | DatasetId::TechnicalInsights
            | DatasetId::TechnicalReports => Domain::Pricing,
            DatasetId::Statement { .. } => Domain::FinancialStatements,
            DatasetId::Fundamentals(_) | DatasetId::Valuation | DatasetId::Officers => {
                Domain::Fundamentals
            }
        }
    }

    pub fn slug(self) -> String {
        match self {
            DatasetId::History => "history".into(),
            DatasetId::OptionChain => "option_chain".into(),
            DatasetId::TechnicalInsights => "technical_insights".into(),
            DatasetId::TechnicalReports => "technical_reports".into(),
            DatasetId::Statement { kind, frequency } => {
                format!("{}_{}", kind.slug(), frequency.slug())
            }
            DatasetId::Fundamentals(m) => m.slug().into(),
            DatasetId::Valuation => "valuation".into(),
            DatasetId::Officers => "officers".into(),
        }
    }

    pub fn file_name(self) -> String {
        format!("merged_{}.csv", self.slug())
    }

    pub fn parse_file_name(file_name: &str) -> Option<DatasetId> {
        let slug = file_name.strip_prefix("merged_")?.strip_suffix(".csv")?;
        DatasetId::all().into_iter().find(|d| d.slug() == slug)
    }

    /// Whether a segment file feeds this dataset.
    pub fn accepts(self, file: &SegmentFile) -> bool {
        match (self, file) {
            (DatasetId::Fundamentals(m), SegmentFile::PerBatch { module, .. }) => m == *module,
            (_, SegmentFile::PerTicker { segment, .. }) => self.ticker_segment() == Some(*segment),
            _ => false,
        }
    }

    /// The per-ticker segment this dataset is merged from, if any.
    pub fn ticker_segment(self) -> Option<TickerSegment> {
        match self {
            DatasetId::History => Some(TickerSegment::History),
            DatasetId::OptionChain => Some(TickerSegment::OptionChain),
            DatasetId::TechnicalInsights => Some(TickerSegment::TechnicalInsights),
            DatasetId::TechnicalReports => Some(TickerSegment::TechnicalReports),
            DatasetId::Statement { kind, frequency } => {
                Some(TickerSegment::Statement { kind, frequency })
            }
            DatasetId::Valuation => Some(TickerSegment::Valuation),
            DatasetId::Officers => Some(TickerSegment::Officers),
            DatasetId::Fundamentals(_) => None,
        }
    }

    /// Parse a file name under this dataset's naming scheme.
    pub fn parse_source_name(self, file_name: &str) -> Option<SegmentFile> {
        match self.ticker_segment() {
            Some(segment) => SegmentFile::parse_ticker_file(segment, file_name),
            None => SegmentFile::parse_batch_file(file_name).filter(|f| self.accepts(f)),
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_ticker_segment() -> Vec<TickerSegment> {
        DatasetId::all()
            .into_iter()
            .filter_map(DatasetId::ticker_segment)
            .collect()
    }

    #[test]
    fn ticker_file_names_roundtrip() {
        for segment in every_ticker_segment() {
            for ticker in ["AAPL", "BRK-B", "BF.B"] {
                let file = SegmentFile::ticker(segment, ticker);
                let name = file.file_name();
                assert_eq!(
                    SegmentFile::parse_ticker_file(segment, &name),
                    Some(file),
                    "{name}"
                );
            }
        }
    }

    #[test]
    fn batch_file_names_roundtrip() {
        for module in FundamentalsModule::ALL {
            let file = SegmentFile::batch(module, 12);
            assert_eq!(SegmentFile::parse_batch_file(&file.file_name()), Some(file));
        }
    }

    #[test]
    fn insights_and_reports_do_not_cross_match() {
        assert!(SegmentFile::parse_ticker_file(
            TickerSegment::TechnicalInsights,
            "AAA_reports.csv"
        )
        .is_none());
        assert!(SegmentFile::parse_ticker_file(
            TickerSegment::TechnicalReports,
            "AAA_technical_insights.csv"
        )
        .is_none());
    }

    #[test]
    fn statement_names_checked_against_segment() {
        let bs_a = TickerSegment::Statement {
            kind: StatementKind::BalanceSheet,
            frequency: Frequency::Annual,
        };
        assert!(SegmentFile::parse_ticker_file(bs_a, "AAA_BS_Q.csv").is_none());
        assert!(SegmentFile::parse_ticker_file(bs_a, "AAA_BS_A.csv").is_some());
    }

    #[test]
    fn dataset_names_roundtrip_and_are_unique() {
        let all = DatasetId::all();
        assert_eq!(all.len(), 17);
        for id in &all {
            assert_eq!(DatasetId::parse_file_name(&id.file_name()), Some(*id));
        }
        assert_eq!(DatasetId::parse_file_name("merged_unknown.csv"), None);
    }

    #[test]
    fn datasets_grouped_by_domain() {
        assert_eq!(DatasetId::for_domain(Domain::Pricing).len(), 4);
        assert_eq!(DatasetId::for_domain(Domain::FinancialStatements).len(), 6);
        assert_eq!(DatasetId::for_domain(Domain::Fundamentals).len(), 7);
    }

    #[test]
    fn batch_files_match_only_their_module() {
        let f = SegmentFile::batch(FundamentalsModule::Price, 1);
        assert!(DatasetId::Fundamentals(FundamentalsModule::Price).accepts(&f));
        assert!(!DatasetId::Fundamentals(FundamentalsModule::Profile).accepts(&f));
        assert!(!DatasetId::Valuation.accepts(&f));
    }

    #[test]
    fn domain_parse_accepts_dashes() {
        assert_eq!(Domain::parse("financial-statements"), Some(Domain::FinancialStatements));
        assert_eq!(Domain::parse("nope"), None);
    }
}
