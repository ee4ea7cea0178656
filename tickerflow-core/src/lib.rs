//! Tickerflow Core: provider records to segment files to merged datasets.
//!
//! This crate contains the file-producing half of the pipeline:
//! - Provider records and the tagged provider response
//! - Flattening of nested records into uniquely named columns
//! - String tables with CSV I/O and column-union concatenation
//! - The file naming scheme and metadata sidecars
//! - Provider trait with a Yahoo client and a deterministic synthetic source
//! - Batched fetchers and per-dataset mergers

pub mod fetch;
pub mod files;
pub mod flatten;
pub mod layout;
pub mod merge;
pub mod provider;
pub mod record;
pub mod segment;
pub mod table;
pub mod universe;

pub use layout::Layout;
pub use record::{ProviderResponse, Record};
pub use segment::{DatasetId, Domain, Frequency, FundamentalsModule, SegmentFile, StatementKind};
pub use table::{Cell, Table};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across stages are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Table>();
        require_sync::<Table>();
        require_send::<ProviderResponse>();
        require_sync::<ProviderResponse>();
        require_send::<files::SegmentMeta>();
        require_sync::<files::SegmentMeta>();
        require_send::<files::DatasetMeta>();
        require_sync::<files::DatasetMeta>();
        require_send::<fetch::FetchSummary>();
        require_send::<merge::MergeOutcome>();
        require_sync::<merge::MergeOutcome>();
        require_send::<provider::yahoo::YahooProvider>();
        require_sync::<provider::yahoo::YahooProvider>();
        require_send::<provider::synthetic::SyntheticProvider>();
        require_sync::<provider::synthetic::SyntheticProvider>();
    }

    /// Fetchers take the provider as a trait object.
    #[test]
    fn provider_trait_is_object_safe() {
        fn _accepts(_p: &dyn provider::MarketDataProvider) {}
        let p = provider::synthetic::SyntheticProvider::new(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        _accepts(&p);
    }
}
