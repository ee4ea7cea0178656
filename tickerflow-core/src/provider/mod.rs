//! Market data provider trait and structured error types.
//!
//! The `MarketDataProvider` trait abstracts over data sources (Yahoo Finance,
//! the deterministic synthetic source, test stubs) so fetchers never know
//! where records come from. Every call is per ticker and answers with a
//! [`ProviderResponse`]; an unknown ticker or an empty result is
//! `ProviderResponse::Empty`, not an error.
//!
//! Record shapes, keys as the provider spells them:
//! - history: one record per day with `date` (ISO), `open`, `high`, `low`,
//!   `close`, `adjclose`, `volume`, `dividends`, `splits`
//! - option chain: one record per contract with `expiration` (ISO),
//!   `optionType`, `contractSymbol`, `strike`, `lastPrice`, `bid`, `ask`,
//!   `volume`, `openInterest`, `impliedVolatility`, `inTheMoney`
//! - technical insights: one nested record, including `reports`,
//!   `sigDevs` and `secReports`
//! - statements, valuations: one record per period with `asOfDate`,
//!   `periodType`, `currencyCode` and line items
//! - fundamentals: one flat record per module
//! - officers: one record per officer

pub mod synthetic;
pub mod yahoo;

use thiserror::Error;

use crate::record::ProviderResponse;
use crate::segment::{Frequency, FundamentalsModule, StatementKind};

/// Structured provider errors. All of them are non-fatal for the pipeline:
/// fetchers log them and move on to the next ticker.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (HTTP 429)")]
    RateLimited,

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider error: {0}")]
    Other(String),
}

/// Trait for market data providers.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Full daily price history.
    fn history(&self, ticker: &str) -> Result<ProviderResponse, ProviderError>;

    /// Every listed option contract across all expirations.
    fn option_chain(&self, ticker: &str) -> Result<ProviderResponse, ProviderError>;

    /// Technical insights, including the nested reports block.
    fn technical_insights(&self, ticker: &str) -> Result<ProviderResponse, ProviderError>;

    /// One financial statement, one record per reporting period.
    fn financial_statement(
        &self,
        ticker: &str,
        kind: StatementKind,
        frequency: Frequency,
    ) -> Result<ProviderResponse, ProviderError>;

    /// One fundamentals module as a single record.
    fn fundamentals(
        &self,
        ticker: &str,
        module: FundamentalsModule,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Valuation measures, one record per period.
    fn valuation_measures(&self, ticker: &str) -> Result<ProviderResponse, ProviderError>;

    /// Company officers, one record per officer.
    fn company_officers(&self, ticker: &str) -> Result<ProviderResponse, ProviderError>;
}
