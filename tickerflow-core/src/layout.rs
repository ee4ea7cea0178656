//! On-disk layout of the pipeline's working tree.
//!
//! ```text
//! {root}/output/_1_pricing/{history,option_chain,technical_insights}/
//! {root}/output/_2_financial_statements/{Balance Sheet,...}/{Annual,Quarterly}/
//! {root}/output/_3_fundamentals/Batches/
//! {root}/output/merged/
//! {root}/output/Static Data/Tickers.csv
//! {root}/Archive/Data/
//! ```
//!
//! Components receive a `Layout` and never resolve paths themselves.

use std::path::{Path, PathBuf};

use crate::segment::{DatasetId, Frequency, SegmentFile, StatementKind, TickerSegment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.output_dir().join("_1_pricing").join("history")
    }

    pub fn option_chain_dir(&self) -> PathBuf {
        self.output_dir().join("_1_pricing").join("option_chain")
    }

    pub fn technical_insights_dir(&self) -> PathBuf {
        self.output_dir().join("_1_pricing").join("technical_insights")
    }

    pub fn statements_dir(&self, kind: StatementKind, frequency: Frequency) -> PathBuf {
        self.output_dir()
            .join("_2_financial_statements")
            .join(kind.dir_name())
            .join(frequency.dir_name())
    }

    pub fn fundamentals_dir(&self) -> PathBuf {
        self.output_dir().join("_3_fundamentals").join("Batches")
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.output_dir().join("merged")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.output_dir().join("Static Data")
    }

    /// Default location of the ticker list.
    pub fn default_tickers_file(&self) -> PathBuf {
        self.static_dir().join("Tickers.csv")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("Archive").join("Data")
    }

    /// Directory holding files of a per-ticker segment.
    pub fn ticker_segment_dir(&self, segment: TickerSegment) -> PathBuf {
        match segment {
            TickerSegment::History => self.history_dir(),
            TickerSegment::OptionChain => self.option_chain_dir(),
            TickerSegment::TechnicalInsights | TickerSegment::TechnicalReports => {
                self.technical_insights_dir()
            }
            TickerSegment::Statement { kind, frequency } => self.statements_dir(kind, frequency),
            TickerSegment::Valuation | TickerSegment::Officers => self.fundamentals_dir(),
        }
    }

    pub fn segment_path(&self, file: &SegmentFile) -> PathBuf {
        let dir = match file {
            SegmentFile::PerTicker { segment, .. } => self.ticker_segment_dir(*segment),
            SegmentFile::PerBatch { .. } => self.fundamentals_dir(),
        };
        dir.join(file.file_name())
    }

    /// Directory scanned when merging `dataset`.
    pub fn source_dir(&self, dataset: DatasetId) -> PathBuf {
        match dataset.ticker_segment() {
            Some(segment) => self.ticker_segment_dir(segment),
            None => self.fundamentals_dir(),
        }
    }

    pub fn merged_path(&self, dataset: DatasetId) -> PathBuf {
        self.merged_dir().join(dataset.file_name())
    }

    /// Every directory of the tree, parents before children.
    pub fn all_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![
            self.output_dir(),
            self.history_dir(),
            self.option_chain_dir(),
            self.technical_insights_dir(),
        ];
        for kind in StatementKind::ALL {
            for frequency in Frequency::ALL {
                dirs.push(self.statements_dir(kind, frequency));
            }
        }
        dirs.push(self.fundamentals_dir());
        dirs.push(self.merged_dir());
        dirs.push(self.static_dir());
        dirs.push(self.archive_dir());
        dirs
    }

    /// Create the full directory tree. Existing directories are left alone.
    pub fn create_all(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        for dir in self.all_dirs() {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                created.push(dir);
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::FundamentalsModule;

    #[test]
    fn segment_paths_follow_tree() {
        let layout = Layout::new("/data");
        let f = SegmentFile::ticker(
            TickerSegment::Statement {
                kind: StatementKind::CashFlow,
                frequency: Frequency::Quarterly,
            },
            "AAA",
        );
        assert_eq!(
            layout.segment_path(&f),
            PathBuf::from("/data/output/_2_financial_statements/Cash Flow/Quarterly/AAA_CF_Q.csv")
        );
        let b = SegmentFile::batch(FundamentalsModule::KeyStats, 3);
        assert_eq!(
            layout.segment_path(&b),
            PathBuf::from("/data/output/_3_fundamentals/Batches/keystats_batch3.csv")
        );
    }

    #[test]
    fn merged_path_uses_dataset_name() {
        let layout = Layout::new("/data");
        assert_eq!(
            layout.merged_path(DatasetId::History),
            PathBuf::from("/data/output/merged/merged_history.csv")
        );
    }

    #[test]
    fn create_all_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let first = layout.create_all().unwrap();
        assert_eq!(first.len(), layout.all_dirs().len());
        assert!(layout.create_all().unwrap().is_empty());
        assert!(layout.statements_dir(StatementKind::BalanceSheet, Frequency::Annual).is_dir());
    }
}
