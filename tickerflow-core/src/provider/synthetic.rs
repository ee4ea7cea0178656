//! Deterministic offline provider.
//!
//! Produces plausible-looking records for any ticker, seeded from a BLAKE3
//! hash of the ticker and segment so repeated runs give identical files.
//! Useful for dry runs of the whole pipeline without network access. The
//! data is clearly fake.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use super::{MarketDataProvider, ProviderError};
use crate::record::{ProviderResponse, Record};
use crate::segment::{Frequency, FundamentalsModule, StatementKind};

/// Offline provider generating deterministic data up to `as_of`.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    as_of: NaiveDate,
    history_days: i64,
}

impl SyntheticProvider {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            history_days: 60,
        }
    }

    pub fn with_history_days(mut self, days: i64) -> Self {
        self.history_days = days.max(1);
        self
    }

    fn rng(ticker: &str, segment: &str) -> StdRng {
        let seed = blake3::hash(format!("{ticker}:{segment}").as_bytes());
        StdRng::from_seed(*seed.as_bytes())
    }

    fn last_price(&self, ticker: &str) -> f64 {
        let mut rng = Self::rng(ticker, "price");
        rng.gen_range(20.0..400.0)
    }

    /// Period end dates, most recent last.
    fn period_ends(&self, frequency: Frequency, count: usize) -> Vec<NaiveDate> {
        let mut out = Vec::with_capacity(count);
        let mut year = self.as_of.year();
        let mut quarter = (self.as_of.month0() / 3) as i32;
        while out.len() < count {
            match frequency {
                Frequency::Annual => {
                    year -= 1;
                    if let Some(d) = NaiveDate::from_ymd_opt(year, 12, 31) {
                        out.push(d);
                    }
                }
                Frequency::Quarterly => {
                    if quarter == 0 {
                        quarter = 4;
                        year -= 1;
                    }
                    let (m, d) = match quarter {
                        1 => (3, 31),
                        2 => (6, 30),
                        3 => (9, 30),
                        _ => (12, 31),
                    };
                    if let Some(date) = NaiveDate::from_ymd_opt(year, m, d) {
                        out.push(date);
                    }
                    quarter -= 1;
                }
            }
        }
        out.reverse();
        out
    }
}

fn object(v: Value) -> Record {
    match v {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn history(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        let mut rng = Self::rng(ticker, "history");
        let mut price = 100.0_f64;
        let mut rows = Vec::new();
        let mut current = self.as_of - Duration::days(self.history_days);

        while current <= self.as_of {
            if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                current += Duration::days(1);
                continue;
            }
            let daily_return: f64 = rng.gen_range(-0.03..0.03);
            let open = price;
            let close = price * (1.0 + daily_return);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000..5_000_000u64);
            rows.push(object(json!({
                "date": current.to_string(),
                "open": round2(open),
                "high": round2(high),
                "low": round2(low),
                "close": round2(close),
                "adjclose": round2(close),
                "volume": volume,
                "dividends": 0.0,
                "splits": 0.0,
            })));
            price = close;
            current += Duration::days(1);
        }
        Ok(ProviderResponse::Table(rows))
    }

    fn option_chain(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        let mut rng = Self::rng(ticker, "options");
        let spot = self.last_price(ticker).round();
        let mut rows = Vec::new();
        for weeks in [1, 4] {
            let expiration = self.as_of + Duration::weeks(weeks);
            for (option_type, flag) in [("calls", 'C'), ("puts", 'P')] {
                for offset in [-5.0, 0.0, 5.0] {
                    let strike: f64 = spot + offset;
                    let itm = if flag == 'C' { strike < spot } else { strike > spot };
                    let last: f64 = rng.gen_range(0.5..8.0);
                    rows.push(object(json!({
                        "expiration": expiration.to_string(),
                        "optionType": option_type,
                        "contractSymbol": format!(
                            "{ticker}{}{flag}{:08}",
                            expiration.format("%y%m%d"),
                            (strike * 1000.0) as u64
                        ),
                        "strike": strike,
                        "lastPrice": round2(last),
                        "bid": round2(last - 0.05),
                        "ask": round2(last + 0.05),
                        "volume": rng.gen_range(0..500u32),
                        "openInterest": rng.gen_range(0..5_000u32),
                        "impliedVolatility": round2(rng.gen_range(0.1..0.9)),
                        "inTheMoney": itm,
                    })));
                }
            }
        }
        Ok(ProviderResponse::Table(rows))
    }

    fn technical_insights(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        let mut rng = Self::rng(ticker, "insights");
        let spot = self.last_price(ticker);
        let (direction, rating) = if rng.gen_bool(0.5) {
            ("Bullish", "BUY")
        } else {
            ("Bearish", "HOLD")
        };
        let published_ms = self
            .as_of
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();
        Ok(ProviderResponse::SingleRecord(object(json!({
            "symbol": ticker,
            "instrumentInfo": {
                "technicalEvents": {
                    "provider": "Synthetic",
                    "sector": "Technology",
                    "shortTermOutlook": {
                        "direction": direction,
                        "score": rng.gen_range(1..5u8),
                        "scoreDescription": format!("{direction} evidence"),
                    },
                },
                "keyTechnicals": {
                    "provider": "Synthetic",
                    "support": round2(spot * 0.9),
                    "resistance": round2(spot * 1.1),
                    "stopLoss": round2(spot * 0.85),
                },
            },
            "recommendation": {
                "targetPrice": round2(spot * rng.gen_range(0.9..1.3)),
                "provider": "Synthetic",
                "rating": rating,
            },
            "upsell": {
                "companyName": format!("{ticker} Inc."),
                "msBullishBearishSummariesPublishDate": published_ms,
            },
            "sigDevs": [{"headline": format!("{ticker} files quarterly report"), "date": self.as_of.to_string()}],
            "secReports": [],
            "reports": [{
                "id": format!("SYN_{ticker}_1"),
                "provider": "Synthetic",
                "reportDate": format!("{}T00:00:00Z", self.as_of),
                "reportTitle": format!("{ticker} outlook"),
                "tickers": [ticker],
            }],
        }))))
    }

    fn financial_statement(
        &self,
        ticker: &str,
        kind: StatementKind,
        frequency: Frequency,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut rng = Self::rng(ticker, &format!("{}_{}", kind.code(), frequency.code()));
        let period = match frequency {
            Frequency::Annual => "12M",
            Frequency::Quarterly => "3M",
        };
        let items: &[&str] = match kind {
            StatementKind::BalanceSheet => &["TotalAssets", "TotalDebt", "StockholdersEquity"],
            StatementKind::IncomeStatement => &["TotalRevenue", "GrossProfit", "NetIncome"],
            StatementKind::CashFlow => &["OperatingCashFlow", "CapitalExpenditure", "FreeCashFlow"],
        };
        let rows = self
            .period_ends(frequency, 4)
            .into_iter()
            .map(|end| {
                let mut rec = object(json!({
                    "asOfDate": end.to_string(),
                    "periodType": period,
                    "currencyCode": "USD",
                }));
                for item in items {
                    rec.insert(
                        (*item).to_string(),
                        json!((rng.gen_range(1.0e6..5.0e9_f64)).round()),
                    );
                }
                rec
            })
            .collect();
        Ok(ProviderResponse::Table(rows))
    }

    fn fundamentals(
        &self,
        ticker: &str,
        module: FundamentalsModule,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut rng = Self::rng(ticker, module.slug());
        let spot = round2(self.last_price(ticker));
        let record = match module {
            FundamentalsModule::Summary => json!({
                "previousClose": spot,
                "dividendYield": round2(rng.gen_range(0.0..0.05)),
                "beta": round2(rng.gen_range(0.5..2.0)),
                "marketCap": (spot * 1.0e9).round(),
                "currency": "USD",
            }),
            FundamentalsModule::KeyStats => json!({
                "sharesOutstanding": rng.gen_range(1.0e8..5.0e9_f64).round(),
                "forwardEps": round2(rng.gen_range(0.5..15.0)),
                "pegRatio": round2(rng.gen_range(0.5..3.0)),
                "lastFiscalYearEnd": self.period_ends(Frequency::Annual, 1)[0].to_string(),
            }),
            FundamentalsModule::Financial => json!({
                "currentPrice": spot,
                "targetMeanPrice": round2(spot * 1.1),
                "recommendationKey": "buy",
                "totalCash": rng.gen_range(1.0e8..1.0e11_f64).round(),
                "financialCurrency": "USD",
            }),
            FundamentalsModule::Price => json!({
                "symbol": ticker,
                "shortName": format!("{ticker} Inc."),
                "regularMarketPrice": spot,
                "exchangeName": "NasdaqGS",
                "currency": "USD",
            }),
            FundamentalsModule::Profile => json!({
                "industry": "Software",
                "sector": "Technology",
                "country": "United States",
                "fullTimeEmployees": rng.gen_range(100..200_000u32),
                "companyOfficers": [{"name": "Alex Synthetic", "title": "CEO"}],
            }),
        };
        Ok(ProviderResponse::SingleRecord(object(record)))
    }

    fn valuation_measures(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        let mut rng = Self::rng(ticker, "valuation");
        let rows = self
            .period_ends(Frequency::Quarterly, 4)
            .into_iter()
            .map(|end| {
                object(json!({
                    "asOfDate": end.to_string(),
                    "periodType": "3M",
                    "currencyCode": "USD",
                    "MarketCap": rng.gen_range(1.0e9..3.0e12_f64).round(),
                    "EnterpriseValue": rng.gen_range(1.0e9..3.0e12_f64).round(),
                    "PeRatio": round2(rng.gen_range(5.0..60.0)),
                    "PbRatio": round2(rng.gen_range(0.5..20.0)),
                }))
            })
            .collect();
        Ok(ProviderResponse::Table(rows))
    }

    fn company_officers(&self, ticker: &str) -> Result<ProviderResponse, ProviderError> {
        let mut rng = Self::rng(ticker, "officers");
        let rows = ["CEO", "CFO"]
            .into_iter()
            .enumerate()
            .map(|(i, title)| {
                object(json!({
                    "maxAge": 1,
                    "name": format!("Officer {} of {ticker}", i + 1),
                    "title": title,
                    "yearBorn": rng.gen_range(1950..1985u32),
                    "fiscalYear": self.as_of.year() - 1,
                    "totalPay": rng.gen_range(200_000..5_000_000u32),
                }))
            })
            .collect();
        Ok(ProviderResponse::Table(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SyntheticProvider {
        SyntheticProvider::new(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap())
    }

    #[test]
    fn history_is_deterministic() {
        let a = provider().history("AAA").unwrap();
        let b = provider().history("AAA").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, provider().history("BBB").unwrap());
    }

    #[test]
    fn history_skips_weekends() {
        let ProviderResponse::Table(rows) = provider().history("AAA").unwrap() else {
            panic!("expected table");
        };
        for row in rows {
            let d: NaiveDate = row["date"].as_str().unwrap().parse().unwrap();
            assert!(!matches!(d.weekday(), Weekday::Sat | Weekday::Sun));
        }
    }

    #[test]
    fn quarterly_periods_precede_as_of() {
        let ends = provider().period_ends(Frequency::Quarterly, 4);
        assert_eq!(
            ends,
            vec![
                NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
                NaiveDate::from_ymd_opt(2023, 9, 30).unwrap(),
                NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            ]
        );
    }

    #[test]
    fn insights_carry_reports_block() {
        let ProviderResponse::SingleRecord(rec) = provider().technical_insights("AAA").unwrap()
        else {
            panic!("expected record");
        };
        assert!(rec["reports"].is_array());
        assert_eq!(rec["instrumentInfo"]["technicalEvents"]["provider"], "Synthetic");
    }
}
