//! Domain and global orchestration.
//!
//! Per domain: Fetch → Merge → Load. Globally: Pricing → Financial
//! Statements → Fundamentals. Every stage call returns a [`StageReport`]
//! and the next stage always runs, whatever the previous one ended with.

use std::time::Instant;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{error, info, warn};

use tickerflow_core::fetch::{self, FetchContext, FetchSummary};
use tickerflow_core::merge::{merge_domain, MergeOutcome, MergeSettings};
use tickerflow_core::provider::synthetic::SyntheticProvider;
use tickerflow_core::provider::yahoo::YahooProvider;
use tickerflow_core::provider::{MarketDataProvider, ProviderError};
use tickerflow_core::universe::{load_tickers, UniverseError};
use tickerflow_core::{Domain, Layout};

use crate::archive::{archive_output, dated_archive_dir};
use crate::config::PipelineConfig;
use crate::load::load_domain;
use crate::outcome::{RunReport, StageKind, StageOutcome, StageReport};
use crate::store::{open_store, Store};
use crate::tickers::refresh_sp500;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot build provider: {0}")]
    Provider(#[from] ProviderError),
}

/// Everything a run needs, resolved once from the configuration.
pub struct Pipeline {
    config: PipelineConfig,
    layout: Layout,
    provider: Box<dyn MarketDataProvider>,
    store: Box<dyn Store>,
    today: NaiveDate,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, provider: Box<dyn MarketDataProvider>, today: NaiveDate) -> Self {
        let layout = config.layout();
        let store = open_store(&config);
        Self {
            config,
            layout,
            provider,
            store,
            today,
        }
    }

    /// Pipeline backed by Yahoo Finance.
    pub fn yahoo(config: PipelineConfig, today: NaiveDate) -> Result<Self, PipelineError> {
        let provider = YahooProvider::new(config.provider_timeout(), &config.provider.user_agent)?;
        Ok(Self::new(config, Box::new(provider), today))
    }

    /// Pipeline backed by the offline synthetic provider.
    pub fn synthetic(config: PipelineConfig, today: NaiveDate) -> Self {
        Self::new(config, Box::new(SyntheticProvider::new(today)), today)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn tickers(&self) -> Result<Vec<String>, UniverseError> {
        load_tickers(&self.config.tickers_path())
    }

    // ── Whole runs ───────────────────────────────────────────────────

    /// Fetch, merge and load every domain in order.
    pub fn run_all(&self) -> RunReport {
        info!(provider = self.provider.name(), today = %self.today, "starting global run");
        let mut report = RunReport::new(self.today);
        for domain in Domain::ALL {
            self.run_domain(domain, &mut report);
        }
        info!(failed = report.failed().count(), "global run complete");
        report
    }

    /// Fetch, merge and load one domain.
    pub fn run_domain(&self, domain: Domain, report: &mut RunReport) {
        info!(%domain, "running domain");
        report.push(self.fetch(domain));
        report.push(self.merge(domain));
        report.push(self.load(domain));
    }

    // ── Stages ───────────────────────────────────────────────────────

    pub fn fetch(&self, domain: Domain) -> StageReport {
        let start = Instant::now();
        let report = |outcome, detail: String| {
            StageReport::new(Some(domain), StageKind::Fetch, outcome, detail).timed(start)
        };

        let tickers = match self.tickers() {
            Ok(t) => t,
            Err(e) => {
                error!(%domain, "cannot load tickers: {e}");
                return report(StageOutcome::Failed(format!("ticker list: {e}")), String::new());
            }
        };
        if tickers.is_empty() {
            warn!(%domain, "ticker list is empty");
            return report(StageOutcome::Skipped("no tickers".into()), String::new());
        }

        let ctx = FetchContext {
            provider: self.provider.as_ref(),
            layout: &self.layout,
            today: self.today,
        };
        let plan = self.config.batching.for_domain(domain).plan();
        let mut summary = FetchSummary::new(domain.slug());
        match domain {
            Domain::Pricing => {
                summary.absorb(fetch::fetch_history(&ctx, &tickers, &plan));
                summary.absorb(fetch::fetch_option_chain(&ctx, &tickers, &plan));
                summary.absorb(fetch::fetch_technical_insights(&ctx, &tickers, &plan));
            }
            Domain::FinancialStatements => {
                summary.absorb(fetch::fetch_statements(&ctx, &tickers, &plan));
            }
            Domain::Fundamentals => {
                summary.absorb(fetch::fetch_fundamentals(&ctx, &tickers, &plan));
                summary.absorb(fetch::fetch_valuations(&ctx, &tickers, &plan));
                summary.absorb(fetch::fetch_officers(&ctx, &tickers, &plan));
            }
        }

        let detail = format!(
            "tickers={} written={} skipped={} failed={}",
            tickers.len(),
            summary.written,
            summary.skipped,
            summary.failed
        );
        let outcome = if summary.failed > 0 && summary.written == 0 {
            StageOutcome::Failed(format!("all {} failing unit(s), nothing written", summary.failed))
        } else if summary.written == 0 {
            StageOutcome::Skipped("no data returned".into())
        } else {
            StageOutcome::Succeeded
        };
        report(outcome, detail)
    }

    pub fn merge(&self, domain: Domain) -> StageReport {
        let start = Instant::now();
        let settings = MergeSettings {
            reporting_currency: self.config.merge.reporting_currency.clone(),
            ingestion_date: self.today,
        };

        let (mut written, mut skipped) = (0usize, 0usize);
        let mut failed = Vec::new();
        for (dataset, result) in merge_domain(&self.layout, domain, &settings) {
            match result {
                Ok(MergeOutcome::Written { .. }) => written += 1,
                Ok(MergeOutcome::Skipped { .. }) => skipped += 1,
                Err(e) => {
                    error!(%dataset, "merge failed: {e}");
                    failed.push(dataset.slug());
                }
            }
        }

        let detail = format!("written={written} skipped={skipped} failed={}", failed.len());
        let outcome = if !failed.is_empty() {
            StageOutcome::Failed(format!("failed: {}", failed.join(", ")))
        } else if written == 0 {
            StageOutcome::Skipped("no input files".into())
        } else {
            StageOutcome::Succeeded
        };
        StageReport::new(Some(domain), StageKind::Merge, outcome, detail).timed(start)
    }

    pub fn load(&self, domain: Domain) -> StageReport {
        let start = Instant::now();
        let report = |outcome, detail: String| {
            StageReport::new(Some(domain), StageKind::Load, outcome, detail).timed(start)
        };

        let results = match load_domain(self.store.as_ref(), &self.layout, domain, self.today) {
            Ok(r) => r,
            Err(e) => {
                error!(%domain, "load failed: {e}");
                return report(StageOutcome::Failed(e.to_string()), String::new());
            }
        };
        if results.is_empty() {
            return report(StageOutcome::Skipped("no merged files".into()), String::new());
        }

        let (mut inserted, mut ignored) = (0usize, 0usize);
        let mut failed = Vec::new();
        for (dataset, result) in &results {
            match result {
                Ok(load) => {
                    inserted += load.report.inserted;
                    ignored += load.report.ignored();
                }
                Err(_) => failed.push(dataset.slug()),
            }
        }
        let detail = format!(
            "tables={} inserted={inserted} ignored={ignored} failed={}",
            results.len(),
            failed.len()
        );
        let outcome = if failed.is_empty() {
            StageOutcome::Succeeded
        } else {
            StageOutcome::Failed(format!("failed: {}", failed.join(", ")))
        };
        report(outcome, detail)
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Create the directory tree and check the database.
    pub fn setup(&self) -> StageReport {
        let start = Instant::now();
        let outcome = match self.layout.create_all() {
            Ok(created) => match self.store.ensure_ready() {
                Ok(()) => {
                    let db = format!("{}:{}", self.store.backend(), self.store.target());
                    info!(created = created.len(), %db, "setup complete");
                    Ok(format!("created_dirs={} db={db}", created.len()))
                }
                Err(e) => Err(format!("database: {e}")),
            },
            Err(e) => Err(format!("directories: {e}")),
        };
        finish(None, StageKind::Setup, outcome, start)
    }

    pub fn refresh_tickers(&self) -> StageReport {
        let start = Instant::now();
        let dest = self.config.tickers_path();
        let outcome = refresh_sp500(&dest, self.config.provider_timeout(), &self.config.provider.user_agent)
            .map(|n| format!("tickers={n} path={}", dest.display()))
            .map_err(|e| e.to_string());
        finish(None, StageKind::RefreshTickers, outcome, start)
    }

    pub fn archive(&self) -> StageReport {
        let start = Instant::now();
        let outcome = archive_output(&self.layout, self.today)
            .map(|moved| {
                format!(
                    "files={} dir={}",
                    moved.len(),
                    dated_archive_dir(&self.layout, self.today).display()
                )
            })
            .map_err(|e| e.to_string());
        finish(None, StageKind::Archive, outcome, start)
    }
}

fn finish(domain: Option<Domain>, stage: StageKind, outcome: Result<String, String>, start: Instant) -> StageReport {
    match outcome {
        Ok(detail) => StageReport::new(domain, stage, StageOutcome::Succeeded, detail),
        Err(reason) => {
            error!(%stage, "{reason}");
            StageReport::new(domain, stage, StageOutcome::Failed(reason), "")
        }
    }
    .timed(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickerflow_core::universe::write_tickers;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
    }

    fn pipeline(root: &std::path::Path) -> Pipeline {
        let mut config = PipelineConfig::default();
        config.paths.root = root.to_path_buf();
        for domain in Domain::ALL {
            let b = match domain {
                Domain::Pricing => &mut config.batching.pricing,
                Domain::FinancialStatements => &mut config.batching.financial_statements,
                Domain::Fundamentals => &mut config.batching.fundamentals,
            };
            b.pause_ms = 0;
        }
        Pipeline::synthetic(config, today())
    }

    #[test]
    fn missing_ticker_list_fails_fetch_but_run_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path());
        let report = p.run_all();
        assert_eq!(report.stages.len(), 9);
        let fetches: Vec<_> = report.stages.iter().filter(|s| s.stage == StageKind::Fetch).collect();
        assert!(fetches.iter().all(|s| s.outcome.is_failed()));
        let merges: Vec<_> = report.stages.iter().filter(|s| s.stage == StageKind::Merge).collect();
        assert!(merges.iter().all(|s| matches!(s.outcome, StageOutcome::Skipped(_))));
    }

    #[test]
    fn empty_ticker_list_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path());
        write_tickers(&p.config().tickers_path(), &[]).unwrap();
        assert_eq!(
            p.fetch(Domain::Pricing).outcome,
            StageOutcome::Skipped("no tickers".into())
        );
    }

    #[test]
    fn setup_creates_tree_and_database() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path());
        let r = p.setup();
        assert_eq!(r.outcome, StageOutcome::Succeeded);
        assert!(p.layout().merged_dir().is_dir());
        assert!(p.layout().archive_dir().is_dir());
        assert_eq!(p.store().backend(), "sqlite");
        assert!(p.config().db_path().exists());
    }

    #[test]
    fn synthetic_domain_run_loads_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path());
        write_tickers(&p.config().tickers_path(), &["AAA".to_string(), "BBB".to_string()]).unwrap();
        let mut report = RunReport::new(today());
        p.run_domain(Domain::FinancialStatements, &mut report);
        assert!(!report.any_failed(), "{report}");
        assert!(p.store().count_rows("financial_statements_bs_a").unwrap() > 0);
        assert!(p.store().count_rows("financial_statements_cf_q").unwrap() > 0);
    }
}
