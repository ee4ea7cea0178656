//! Criterion benchmarks for the transform hot paths.
//!
//! Benchmarks:
//! 1. Flattening a technical insights record with the full rename table
//! 2. Concatenating per-ticker history tables and applying the history policy

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use tickerflow_core::flatten::{flatten_normalized, FlattenOptions, RenameTable};
use tickerflow_core::merge::policy::history;
use tickerflow_core::{Record, Table};

// ── Helpers ──────────────────────────────────────────────────────────

fn insights_record() -> Record {
    let outlook = json!({
        "stateDescription": "Recent bullish events outweigh bearish events.",
        "direction": "Bullish",
        "score": 3,
        "scoreDescription": "Strong Bullish Evidence",
        "sectorDirection": "Bearish",
        "sectorScore": 2,
        "indexDirection": "Bullish",
        "indexScore": 1
    });
    json!({
        "symbol": "AAA",
        "instrumentInfo": {
            "technicalEvents": {
                "provider": "Trading Central",
                "sector": "Technology",
                "shortTermOutlook": outlook,
                "intermediateTermOutlook": outlook,
                "longTermOutlook": outlook
            },
            "keyTechnicals": {"provider": "Trading Central", "support": 101.5, "resistance": 130.2, "stopLoss": 95.1},
            "valuation": {"color": 0, "description": "Overvalued", "discount": "-12%", "relativeValue": "Premium"}
        },
        "companySnapshot": {
            "sectorInfo": "Technology",
            "company": {"innovativeness": 0.9, "hiring": 0.4, "sustainability": 0.5, "insiderSentiments": 0.2},
            "sector": {"innovativeness": 0.5, "hiring": 0.5, "sustainability": 0.5, "insiderSentiments": 0.5}
        },
        "recommendation": {"targetPrice": 150, "provider": "Research", "rating": "BUY"},
        "sigDevs": [{"headline": "AAA announces buyback", "date": "2024-06-01"}],
        "secReports": []
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

fn history_table(ticker: &str, days: usize) -> Table {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let rows = (0..days)
        .map(|i| {
            let price = (i % 7 != 3).then(|| format!("{:.2}", 100.0 + (i as f64 * 0.1).sin() * 10.0));
            let date = base + chrono::Duration::days(i as i64);
            vec![
                Some(date.to_string()),
                Some(ticker.to_string()),
                price.clone(),
                price.clone(),
                price.clone(),
                price.clone(),
                price,
                Some("1000".into()),
                None,
                None,
            ]
        })
        .collect();
    Table::from_cells(
        ["date", "ticker", "open", "high", "low", "close", "adjclose", "volume", "dividends", "splits"],
        rows,
    )
    .unwrap()
}

// ── 1. Flatten ───────────────────────────────────────────────────────

fn bench_flatten(c: &mut Criterion) {
    let record = insights_record();
    let opts = FlattenOptions::excluding(["reports"]);
    let renames = RenameTable::technical_insights();
    c.bench_function("flatten_insights_record", |b| {
        b.iter(|| flatten_normalized(black_box(&record), &opts, &renames))
    });
}

// ── 2. Merge ─────────────────────────────────────────────────────────

fn bench_history_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_merge");
    for tickers in [10usize, 100] {
        let tables: Vec<Table> = (0..tickers)
            .map(|i| history_table(&format!("T{i:03}"), 250))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(tickers), &tables, |b, tables| {
            b.iter(|| {
                let mut merged = Table::concat(tables.iter().cloned()).unwrap();
                history(&mut merged).unwrap();
                black_box(merged.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_flatten, bench_history_merge);
criterion_main!(benches);
