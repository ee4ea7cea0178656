//! tickerflow runner: configuration, destination store, loaders and
//! orchestration.
//!
//! This crate builds on `tickerflow-core` to provide:
//! - `PipelineConfig` from TOML plus environment overrides
//! - Destination table declarations and cell coercion
//! - PostgreSQL and SQLite stores with insert-or-ignore on the natural key
//! - Per-domain Fetch → Merge → Load orchestration with typed outcomes
//! - Archiving, ticker list refresh and JSON run reports

pub mod archive;
pub mod config;
pub mod load;
pub mod outcome;
pub mod pipeline;
pub mod store;
pub mod tickers;

pub use archive::{archive_output, ArchiveError, ArchivedFile};
pub use config::{ConfigError, PipelineConfig, PostgresConfig, StoreBackend};
pub use load::{load_domain, load_file, LoadError, TableLoad, TableSpec};
pub use outcome::{RunReport, StageKind, StageOutcome, StageReport};
pub use pipeline::{Pipeline, PipelineError};
pub use store::{open_store, InsertReport, PostgresStore, SqlType, SqlValue, SqliteStore, Store, StoreError};
pub use tickers::{refresh_sp500, TickersError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_and_reports_are_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
    }

    #[test]
    fn pipeline_is_send_sync() {
        assert_send::<Pipeline>();
        assert_sync::<Pipeline>();
        assert_send::<SqliteStore>();
        assert_sync::<SqliteStore>();
        assert_send::<PostgresStore>();
        assert_sync::<PostgresStore>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<LoadError>();
        assert_sync::<LoadError>();
        assert_send::<StoreError>();
        assert_send::<ConfigError>();
    }
}
