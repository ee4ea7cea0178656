//! Yahoo Finance data provider.
//!
//! Endpoints:
//! - v8 chart: daily history with dividend and split events
//! - v7 options: one page per expiration date
//! - insights v2: technical insights
//! - v10 quoteSummary: fundamentals modules and company officers
//! - fundamentals-timeseries: statements and valuation measures
//!
//! Endpoints behind Yahoo's consent wall need a session cookie plus a crumb
//! token; both are obtained lazily on first use and kept for the lifetime of
//! the provider. There are no retries: a failed call surfaces as a
//! [`ProviderError`] and the fetcher moves on.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. Parsing lives in free functions so it can be tested against
//! recorded payloads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{MarketDataProvider, ProviderError};
use crate::record::{ProviderResponse, Record};
use crate::segment::{Frequency, FundamentalsModule, StatementKind};

const QUERY1: &str = "https://query1.finance.yahoo.com";
const QUERY2: &str = "https://query2.finance.yahoo.com";
const COOKIE_URL: &str = "https://fc.yahoo.com";

/// Earliest timestamp requested from the timeseries endpoint (1985-08-23).
const TIMESERIES_START: i64 = 493_590_046;

/// Default user agent; Yahoo rejects requests without a browser-like one.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36";

// ── Chart payload ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
    #[serde(default)]
    splits: HashMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

fn local_date(ts: i64, gmtoffset: i64) -> Result<String, ProviderError> {
    chrono::DateTime::from_timestamp(ts + gmtoffset, 0)
        .map(|dt| dt.date_naive().to_string())
        .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))
}

/// Parse a chart payload into one record per trading day.
pub(crate) fn parse_chart(resp: ChartResponse) -> Result<ProviderResponse, ProviderError> {
    let Some(result) = resp.chart.result else {
        return match resp.chart.error {
            Some(err) if err.code == "Not Found" => Ok(ProviderResponse::Empty),
            Some(err) => Err(ProviderError::ResponseFormatChanged(format!(
                "{}: {}",
                err.code,
                err.description.unwrap_or_default()
            ))),
            None => Err(ProviderError::ResponseFormatChanged(
                "empty result with no error".into(),
            )),
        };
    };

    let Some(data) = result.into_iter().next() else {
        return Ok(ProviderResponse::Empty);
    };
    let Some(timestamps) = data.timestamp else {
        return Ok(ProviderResponse::Empty);
    };
    let gmtoffset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let events = data.events.unwrap_or_default();
    let mut dividends: HashMap<String, f64> = HashMap::new();
    for ev in events.dividends.values() {
        dividends.insert(local_date(ev.date, gmtoffset)?, ev.amount);
    }
    let mut splits: HashMap<String, f64> = HashMap::new();
    for ev in events.splits.values() {
        if ev.denominator != 0.0 {
            splits.insert(local_date(ev.date, gmtoffset)?, ev.numerator / ev.denominator);
        }
    }

    let mut rows = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();
        let adjclose = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten());

        // Holidays come back with every field null
        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none()
        {
            continue;
        }

        let date = local_date(ts, gmtoffset)?;
        let row = json!({
            "date": date,
            "open": open,
            "high": high,
            "low": low,
            "close": close,
            "adjclose": adjclose,
            "volume": volume,
            "dividends": dividends.get(&date).copied().unwrap_or(0.0),
            "splits": splits.get(&date).copied().unwrap_or(0.0),
        });
        if let Value::Object(map) = row {
            rows.push(map);
        }
    }

    if rows.is_empty() {
        return Ok(ProviderResponse::Empty);
    }
    Ok(ProviderResponse::Table(rows))
}

// ── Options payload ─────────────────────────────────────────────────

/// One page of the options endpoint: every expiration date the ticker has,
/// plus the contracts of the expiration the page covers.
#[derive(Debug, Default)]
pub(crate) struct OptionsPage {
    pub expirations: Vec<i64>,
    pub contracts: Vec<Record>,
}

pub(crate) fn parse_options_page(body: &Value) -> Result<OptionsPage, ProviderError> {
    let chain = body
        .get("optionChain")
        .ok_or_else(|| ProviderError::ResponseFormatChanged("missing optionChain".into()))?;
    let Some(result) = chain
        .get("result")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
    else {
        return Ok(OptionsPage::default());
    };

    let expirations = result
        .get("expirationDates")
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    let mut contracts = Vec::new();
    for block in result
        .get("options")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        for option_type in ["calls", "puts"] {
            for contract in block
                .get(option_type)
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_object)
            {
                contracts.push(option_record(contract, option_type)?);
            }
        }
    }
    Ok(OptionsPage {
        expirations,
        contracts,
    })
}

fn option_record(contract: &Map<String, Value>, option_type: &str) -> Result<Record, ProviderError> {
    let mut rec = Record::new();
    let expiration = match contract.get("expiration").and_then(Value::as_i64) {
        Some(ts) => Value::String(local_date(ts, 0)?),
        None => Value::Null,
    };
    rec.insert("expiration".into(), expiration);
    rec.insert("optionType".into(), Value::String(option_type.into()));
    for key in [
        "contractSymbol",
        "strike",
        "lastPrice",
        "bid",
        "ask",
        "volume",
        "openInterest",
        "impliedVolatility",
        "inTheMoney",
    ] {
        rec.insert(key.into(), contract.get(key).cloned().unwrap_or(Value::Null));
    }
    Ok(rec)
}

// ── Insights / quoteSummary payloads ────────────────────────────────

pub(crate) fn parse_insights(body: &Value) -> Result<ProviderResponse, ProviderError> {
    let finance = body
        .get("finance")
        .ok_or_else(|| ProviderError::ResponseFormatChanged("missing finance".into()))?;
    match finance.get("result") {
        Some(Value::Object(result)) if !result.is_empty() => {
            Ok(ProviderResponse::SingleRecord(result.clone()))
        }
        _ => Ok(ProviderResponse::Empty),
    }
}

/// Extract one module from a quoteSummary payload.
pub(crate) fn parse_quote_summary(
    body: &Value,
    module: &str,
) -> Result<Option<Record>, ProviderError> {
    let summary = body
        .get("quoteSummary")
        .ok_or_else(|| ProviderError::ResponseFormatChanged("missing quoteSummary".into()))?;
    let Some(result) = summary
        .get("result")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
    else {
        return match summary.get("error") {
            Some(Value::Object(err))
                if err.get("code").and_then(Value::as_str) == Some("Not Found") =>
            {
                Ok(None)
            }
            Some(Value::Object(err)) => Err(ProviderError::ResponseFormatChanged(
                err.get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("quoteSummary error")
                    .to_string(),
            )),
            _ => Ok(None),
        };
    };
    Ok(result.get(module).and_then(Value::as_object).cloned())
}

/// Company officers from an `assetProfile` module.
pub(crate) fn officers_from_profile(profile: &Record) -> ProviderResponse {
    let officers: Vec<Record> = profile
        .get("companyOfficers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .cloned()
        .collect();
    if officers.is_empty() {
        ProviderResponse::Empty
    } else {
        ProviderResponse::Table(officers)
    }
}

// ── Timeseries payload ──────────────────────────────────────────────

/// Pivot a fundamentals-timeseries payload into one record per
/// `asOfDate`, with the requested type names (minus `prefix`) as keys.
pub(crate) fn parse_timeseries(body: &Value, prefix: &str) -> Result<ProviderResponse, ProviderError> {
    let series = body
        .get("timeseries")
        .and_then(|t| t.get("result"))
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::ResponseFormatChanged("missing timeseries.result".into()))?;

    let mut by_date: BTreeMap<String, Record> = BTreeMap::new();
    for entry in series {
        let Some(type_name) = entry
            .get("meta")
            .and_then(|m| m.get("type"))
            .and_then(Value::as_array)
            .and_then(|t| t.first())
            .and_then(Value::as_str)
        else {
            continue;
        };
        let column = type_name.strip_prefix(prefix).unwrap_or(type_name);
        for point in entry
            .get(type_name)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
        {
            let Some(as_of) = point.get("asOfDate").and_then(Value::as_str) else {
                continue;
            };
            let row = by_date.entry(as_of.to_string()).or_insert_with(|| {
                let mut r = Record::new();
                r.insert("asOfDate".into(), Value::String(as_of.to_string()));
                r
            });
            for key in ["periodType", "currencyCode"] {
                if let Some(v) = point.get(key) {
                    row.entry(key.to_string()).or_insert_with(|| v.clone());
                }
            }
            let value = point
                .get("reportedValue")
                .and_then(|rv| rv.get("raw"))
                .cloned()
                .unwrap_or(Value::Null);
            row.insert(column.to_string(), value);
        }
    }

    if by_date.is_empty() {
        return Ok(ProviderResponse::Empty);
    }
    Ok(ProviderResponse::Table(by_date.into_values().collect()))
}

fn timeseries_prefix(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Annual => "annual",
        Frequency::Quarterly => "quarterly",
    }
}

fn statement_types(kind: StatementKind) -> &'static [&'static str] {
    match kind {
        StatementKind::BalanceSheet => BALANCE_SHEET_TYPES,
        StatementKind::IncomeStatement => INCOME_STATEMENT_TYPES,
        StatementKind::CashFlow => CASH_FLOW_TYPES,
    }
}

fn quote_summary_module(module: FundamentalsModule) -> &'static str {
    match module {
        FundamentalsModule::Summary => "summaryDetail",
        FundamentalsModule::KeyStats => "defaultKeyStatistics",
        FundamentalsModule::Financial => "financialData",
        FundamentalsModule::Price => "price",
        FundamentalsModule::Profile => "assetProfile",
    }
}

// ── Provider ────────────────────────────────────────────────────────

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    crumb: Mutex<Option<String>>,
}

impl YahooProvider {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .cookie_store(true)
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            crumb: Mutex::new(None),
        })
    }

    fn send(&self, url: &str) -> Result<reqwest::blocking::Response, ProviderError> {
        self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                ProviderError::NetworkUnreachable(format!("timeout: {e}"))
            } else {
                ProviderError::NetworkUnreachable(e.to_string())
            }
        })
    }

    /// GET a JSON document. 404 bodies are returned as-is since Yahoo
    /// reports unknown symbols that way.
    fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        let resp = self.send(url)?;
        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            self.reset_crumb();
            return Err(ProviderError::AuthenticationRequired(format!(
                "HTTP {status} from {url}"
            )));
        }
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        resp.json().map_err(|e| {
            ProviderError::ResponseFormatChanged(format!("failed to parse response from {url}: {e}"))
        })
    }

    /// Crumb token for consent-walled endpoints.
    fn crumb(&self) -> Result<String, ProviderError> {
        let mut guard = self
            .crumb
            .lock()
            .map_err(|_| ProviderError::Other("crumb lock poisoned".into()))?;
        if let Some(c) = guard.as_ref() {
            return Ok(c.clone());
        }

        // Only the Set-Cookie header matters; the status is usually 404
        let _ = self.send(COOKIE_URL)?;
        let resp = self.send(&format!("{QUERY2}/v1/test/getcrumb"))?;
        if !resp.status().is_success() {
            return Err(ProviderError::AuthenticationRequired(format!(
                "crumb request returned HTTP {}",
                resp.status()
            )));
        }
        let crumb = resp
            .text()
            .map_err(|e| ProviderError::AuthenticationRequired(e.to_string()))?
            .trim()
            .to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(ProviderError::AuthenticationRequired(
                "crumb response was not a token".into(),
            ));
        }
        *guard = Some(crumb.clone());
        Ok(crumb)
    }

    fn reset_crumb(&self) {
        if let Ok(mut guard) = self.crumb.lock() {
            *guard = None;
        }
    }

    fn quote_summary(&self, ticker: &str, module: &str) -> Result<Option<Record>, ProviderError> {
        let crumb = self.crumb()?;
        let url = format!(
            "{QUERY2}/v10/finance/quoteSummary/{ticker}?modules={module}&formatted=false&crumb={crumb}"
        );
        let body = self.get_json(&url)?;
        parse_quote_summary(&body, module)
    }

    fn timeseries(&self, ticker: &str, prefix: &str, types: &[&str]) -> Result<ProviderResponse, ProviderError> {
        let type_list = types
            .iter()
            .map(|t| format!("{prefix}{t}"))
            .collect::<Vec<_>>()
            .join(",");
        let now = chrono::Utc::now().timestamp();
        let url = format!(
            "{QUERY1}/ws/fundamentals-timeseries/v1/finance/timeseries/{ticker}\
             ?symbol={ticker}&type={type_list}&period1={TIMESERIES_START}&period2={now}&merge=false"
        );
        let body = self.get_json(&url)?;
        parse_timeseries(&body, prefix)
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn history(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        let url = format!(
            "{QUERY2}/v8/finance/chart/{ticker}\
             ?range=max&interval=1d&events=div%2Csplits&includeAdjustedClose=true"
        );
        let body = self.get_json(&url)?;
        let chart: ChartResponse = serde_json::from_value(body).map_err(|e| {
            ProviderError::ResponseFormatChanged(format!("chart payload for {ticker}: {e}"))
        })?;
        parse_chart(chart)
    }

    fn option_chain(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        let crumb = self.crumb()?;
        let base = format!("{QUERY2}/v7/finance/options/{ticker}?crumb={crumb}");
        let first = parse_options_page(&self.get_json(&base)?)?;

        let mut contracts = first.contracts;
        for ts in first.expirations.iter().skip(1) {
            let page = parse_options_page(&self.get_json(&format!("{base}&date={ts}"))?)?;
            contracts.extend(page.contracts);
        }

        if contracts.is_empty() {
            return Ok(ProviderResponse::Empty);
        }
        Ok(ProviderResponse::Table(contracts))
    }

    fn technical_insights(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{QUERY2}/ws/insights/v2/finance/insights?symbol={ticker}");
        parse_insights(&self.get_json(&url)?)
    }

    fn financial_statement(
        &self,
        ticker: &str,
        kind: StatementKind,
        frequency: Frequency,
    ) -> Result<ProviderResponse, ProviderError> {
        self.timeseries(ticker, timeseries_prefix(frequency), statement_types(kind))
    }

    fn fundamentals(
        &self,
        ticker: &str,
        module: FundamentalsModule,
    ) -> Result<ProviderResponse, ProviderError> {
        Ok(self
            .quote_summary(ticker, quote_summary_module(module))?
            .map(ProviderResponse::SingleRecord)
            .unwrap_or(ProviderResponse::Empty))
    }

    fn valuation_measures(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        self.timeseries(ticker, "quarterly", VALUATION_TYPES)
    }

    fn company_officers(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(self
            .quote_summary(ticker, "assetProfile")?
            .map(|profile| officers_from_profile(&profile))
            .unwrap_or(ProviderResponse::Empty))
    }
}

// ── Timeseries type lists ───────────────────────────────────────────

const BALANCE_SHEET_TYPES: &[&str] = &[
    "TotalAssets",
    "CurrentAssets",
    "CashAndCashEquivalents",
    "CashCashEquivalentsAndShortTermInvestments",
    "OtherShortTermInvestments",
    "AccountsReceivable",
    "Inventory",
    "OtherCurrentAssets",
    "TotalNonCurrentAssets",
    "NetPPE",
    "GrossPPE",
    "AccumulatedDepreciation",
    "Goodwill",
    "OtherIntangibleAssets",
    "GoodwillAndOtherIntangibleAssets",
    "InvestmentsAndAdvances",
    "OtherNonCurrentAssets",
    "TotalLiabilitiesNetMinorityInterest",
    "CurrentLiabilities",
    "AccountsPayable",
    "CurrentDebt",
    "OtherCurrentLiabilities",
    "TotalNonCurrentLiabilitiesNetMinorityInterest",
    "LongTermDebt",
    "TotalDebt",
    "NetDebt",
    "StockholdersEquity",
    "CommonStockEquity",
    "RetainedEarnings",
    "TotalEquityGrossMinorityInterest",
    "MinorityInterest",
    "WorkingCapital",
    "InvestedCapital",
    "TangibleBookValue",
    "ShareIssued",
    "OrdinarySharesNumber",
    "TreasurySharesNumber",
];

const INCOME_STATEMENT_TYPES: &[&str] = &[
    "TotalRevenue",
    "OperatingRevenue",
    "CostOfRevenue",
    "GrossProfit",
    "OperatingExpense",
    "SellingGeneralAndAdministration",
    "ResearchAndDevelopment",
    "OperatingIncome",
    "NetNonOperatingInterestIncomeExpense",
    "InterestIncome",
    "InterestExpense",
    "OtherIncomeExpense",
    "PretaxIncome",
    "TaxProvision",
    "NetIncome",
    "NetIncomeCommonStockholders",
    "NetIncomeContinuousOperations",
    "DilutedNIAvailtoComStockholders",
    "BasicEPS",
    "DilutedEPS",
    "BasicAverageShares",
    "DilutedAverageShares",
    "TotalExpenses",
    "EBIT",
    "EBITDA",
    "NormalizedEBITDA",
    "NormalizedIncome",
    "ReconciledCostOfRevenue",
    "ReconciledDepreciation",
    "TaxRateForCalcs",
];

const CASH_FLOW_TYPES: &[&str] = &[
    "OperatingCashFlow",
    "InvestingCashFlow",
    "FinancingCashFlow",
    "FreeCashFlow",
    "CapitalExpenditure",
    "EndCashPosition",
    "BeginningCashPosition",
    "ChangesInCash",
    "NetIncomeFromContinuingOperations",
    "DepreciationAndAmortization",
    "StockBasedCompensation",
    "DeferredIncomeTax",
    "ChangeInWorkingCapital",
    "ChangeInReceivables",
    "ChangeInInventory",
    "ChangeInPayable",
    "NetPPEPurchaseAndSale",
    "PurchaseOfInvestment",
    "SaleOfInvestment",
    "NetBusinessPurchaseAndSale",
    "IssuanceOfDebt",
    "RepaymentOfDebt",
    "RepurchaseOfCapitalStock",
    "CashDividendsPaid",
    "CommonStockIssuance",
    "IncomeTaxPaidSupplementalData",
    "InterestPaidSupplementalData",
];

const VALUATION_TYPES: &[&str] = &[
    "MarketCap",
    "EnterpriseValue",
    "PeRatio",
    "ForwardPeRatio",
    "PegRatio",
    "PsRatio",
    "PbRatio",
    "EnterprisesValueRevenueRatio",
    "EnterprisesValueEBITDARatio",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Value {
        let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
        let text = std::fs::read_to_string(&path).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn chart_rows_skip_holidays_and_attach_events() {
        let chart: ChartResponse = serde_json::from_value(fixture("chart.json")).unwrap();
        let ProviderResponse::Table(rows) = parse_chart(chart).unwrap() else {
            panic!("expected table");
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["date"], json!("2024-01-02"));
        assert_eq!(rows[1]["date"], json!("2024-01-03"));
        assert!(rows[1]["close"].is_null());
        assert!(rows[1]["volume"].is_null());
        assert_eq!(rows[1]["dividends"], json!(0.24));
        assert_eq!(rows[2]["splits"], json!(4.0));
        assert_eq!(rows[0]["dividends"], json!(0.0));
    }

    #[test]
    fn chart_not_found_is_empty() {
        let chart: ChartResponse =
            serde_json::from_value(fixture("chart_not_found.json")).unwrap();
        assert_eq!(parse_chart(chart).unwrap(), ProviderResponse::Empty);
    }

    #[test]
    fn options_page_has_calls_and_puts() {
        let page = parse_options_page(&fixture("options.json")).unwrap();
        assert_eq!(page.expirations, vec![1718928000, 1719532800]);
        assert_eq!(page.contracts.len(), 2);
        let call = &page.contracts[0];
        assert_eq!(call["optionType"], json!("calls"));
        assert_eq!(call["expiration"], json!("2024-06-21"));
        assert_eq!(call["inTheMoney"], json!(true));
        let put = &page.contracts[1];
        assert_eq!(put["optionType"], json!("puts"));
        assert!(put["volume"].is_null());
    }

    #[test]
    fn insights_single_record() {
        let resp = parse_insights(&fixture("insights.json")).unwrap();
        let ProviderResponse::SingleRecord(rec) = resp else {
            panic!("expected single record");
        };
        assert_eq!(rec["symbol"], json!("AAA"));
        assert_eq!(rec["reports"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn insights_without_result_is_empty() {
        let body = json!({"finance": {"result": null, "error": null}});
        assert_eq!(parse_insights(&body).unwrap(), ProviderResponse::Empty);
    }

    #[test]
    fn officers_extracted_from_profile() {
        let profile = parse_quote_summary(&fixture("quote_summary_profile.json"), "assetProfile")
            .unwrap()
            .unwrap();
        let ProviderResponse::Table(officers) = officers_from_profile(&profile) else {
            panic!("expected officers");
        };
        assert_eq!(officers.len(), 2);
        assert_eq!(officers[0]["name"], json!("Jane Roe"));
    }

    #[test]
    fn quote_summary_not_found_is_none() {
        let body = fixture("quote_summary_not_found.json");
        assert!(parse_quote_summary(&body, "price").unwrap().is_none());
    }

    #[test]
    fn timeseries_pivoted_by_as_of_date() {
        let ProviderResponse::Table(rows) =
            parse_timeseries(&fixture("timeseries.json"), "annual").unwrap()
        else {
            panic!("expected table");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["asOfDate"], json!("2022-12-31"));
        assert_eq!(rows[0]["TotalAssets"], json!(1000000.0));
        assert!(rows[0].get("TotalDebt").is_none());
        assert_eq!(rows[1]["TotalDebt"], json!(300000.0));
        assert_eq!(rows[1]["currencyCode"], json!("USD"));
        assert_eq!(rows[1]["periodType"], json!("12M"));
    }

    #[test]
    fn every_module_maps_to_a_quote_summary_name() {
        for m in FundamentalsModule::ALL {
            assert!(!quote_summary_module(m).is_empty());
        }
        for k in StatementKind::ALL {
            assert!(!statement_types(k).is_empty());
        }
    }
}
