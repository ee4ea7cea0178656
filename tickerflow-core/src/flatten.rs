//! Flattening of nested provider records into single-level rows.
//!
//! Nested mappings recurse with parent and child keys joined by a separator,
//! sequences are stored as compact JSON text, scalars pass through. After
//! flattening, column names go through a naming policy (lower-case,
//! punctuation to `_`) and an explicit [`RenameTable`].
//!
//! Flattening never fails: a missing key simply yields no column for that
//! row, and the merge stage reconciles column sets later.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::record::Record;
use crate::table::Cell;

/// Separator used when joining nested keys before the naming policy runs.
pub const DEFAULT_SEPARATOR: char = '.';

/// An ordered flat row with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRow {
    cells: Vec<(String, Cell)>,
}

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under `key`, or under `key_2`, `key_3`, … when `key` is taken.
    /// Returns the name actually used.
    pub fn insert_unique(&mut self, key: &str, value: Cell) -> String {
        let name = if self.contains(key) {
            (2..)
                .map(|n| format!("{key}_{n}"))
                .find(|candidate| !self.contains(candidate))
                .unwrap_or_else(|| key.to_string())
        } else {
            key.to_string()
        };
        self.cells.push((name.clone(), value));
        name
    }

    /// Insert at the front, replacing any existing entry with that key.
    pub fn prepend(&mut self, key: &str, value: Cell) {
        self.cells.retain(|(k, _)| k != key);
        self.cells.insert(0, (key.to_string(), value));
    }

    /// Set `key`, replacing in place when present, appending otherwise.
    pub fn set(&mut self, key: &str, value: Cell) {
        match self.cells.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.cells.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Cell> {
        let idx = self.cells.iter().position(|(k, _)| k == key)?;
        Some(self.cells.remove(idx).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cells.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl IntoIterator for FlatRow {
    type Item = (String, Cell);
    type IntoIter = std::vec::IntoIter<(String, Cell)>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

/// Flattening parameters.
#[derive(Debug, Clone)]
pub struct FlattenOptions {
    pub separator: char,
    /// Keys skipped at any nesting level.
    pub excluded_keys: BTreeSet<String>,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            excluded_keys: BTreeSet::new(),
        }
    }
}

impl FlattenOptions {
    pub fn excluding<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded_keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Flatten one nested record into a single row.
pub fn flatten(record: &Record, opts: &FlattenOptions) -> FlatRow {
    let mut out = FlatRow::new();
    flatten_into(None, record, opts, &mut out);
    out
}

fn flatten_into(prefix: Option<&str>, map: &Record, opts: &FlattenOptions, out: &mut FlatRow) {
    for (key, value) in map {
        if opts.excluded_keys.contains(key) {
            continue;
        }
        let name = match prefix {
            Some(p) => format!("{p}{}{key}", opts.separator),
            None => key.clone(),
        };
        match value {
            Value::Object(child) => flatten_into(Some(&name), child, opts, out),
            other => {
                out.insert_unique(&name, scalar_cell(other));
            }
        }
    }
}

/// Text form of a non-mapping JSON value. Sequences become compact JSON.
pub fn scalar_cell(value: &Value) -> Cell {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(encode_list(items)),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Compact JSON encoding of a list value.
pub fn encode_list(items: &[Value]) -> String {
    Value::Array(items.to_vec()).to_string()
}

/// Inverse of [`encode_list`].
pub fn decode_list(text: &str) -> Result<Vec<Value>, serde_json::Error> {
    serde_json::from_str(text)
}

/// Naming policy: lower-case, every non-alphanumeric character becomes `_`.
pub fn canonical_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                '_'
            }
        })
        .collect()
}

/// Explicit mapping from generated column names to canonical short names.
#[derive(Debug, Clone, Default)]
pub struct RenameTable {
    map: HashMap<String, String>,
}

impl RenameTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            map: pairs
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }

    /// Renames applied to technical insights columns.
    pub fn technical_insights() -> Self {
        Self::from_pairs(TECHNICAL_INSIGHTS_RENAMES)
    }

    /// Renames applied to financial statement columns.
    pub fn statements() -> Self {
        Self::from_pairs(&[("asofdate", "date")])
    }

    pub fn apply<'a>(&'a self, name: &'a str) -> &'a str {
        self.map.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Apply the naming policy and rename table to every key. Keys that
/// collapse onto the same name are kept apart with a numeric suffix.
pub fn normalize_names(row: FlatRow, renames: &RenameTable) -> FlatRow {
    let mut out = FlatRow::new();
    for (key, value) in row {
        let canonical = canonical_name(&key);
        out.insert_unique(renames.apply(&canonical), value);
    }
    out
}

/// Flatten then normalize names in one step.
pub fn flatten_normalized(record: &Record, opts: &FlattenOptions, renames: &RenameTable) -> FlatRow {
    normalize_names(flatten(record, opts), renames)
}

/// One row per report. The `tickers` list is joined into `tickers_str`.
pub fn flatten_reports(reports: &[Value]) -> Vec<FlatRow> {
    let opts = FlattenOptions::excluding(["tickers"]);
    reports
        .iter()
        .filter_map(Value::as_object)
        .map(|report| {
            let mut row = flatten_normalized(report, &opts, &RenameTable::empty());
            let tickers = report
                .get("tickers")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();
            row.set("tickers_str", Some(tickers));
            row
        })
        .collect()
}

/// Generated technical insights column names and their short forms.
pub const TECHNICAL_INSIGHTS_RENAMES: &[(&str, &str)] = &[
    ("instrumentinfo_technicalevents_provider", "instrument_provider"),
    ("instrumentinfo_technicalevents_sector", "sector"),
    ("instrumentinfo_technicalevents_shorttermoutlook_statedescription", "st_state_desc"),
    ("instrumentinfo_technicalevents_shorttermoutlook_direction", "st_direction"),
    ("instrumentinfo_technicalevents_shorttermoutlook_score", "st_score"),
    ("instrumentinfo_technicalevents_shorttermoutlook_scoredescription", "st_score_desc"),
    ("instrumentinfo_technicalevents_shorttermoutlook_sectordirection", "st_sector_direction"),
    ("instrumentinfo_technicalevents_shorttermoutlook_sectorscore", "st_sector_score"),
    ("instrumentinfo_technicalevents_shorttermoutlook_sectorscoredescription", "st_sector_score_desc"),
    ("instrumentinfo_technicalevents_shorttermoutlook_indexdirection", "st_index_direction"),
    ("instrumentinfo_technicalevents_shorttermoutlook_indexscore", "st_index_score"),
    ("instrumentinfo_technicalevents_shorttermoutlook_indexscoredescription", "st_index_score_desc"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_statedescription", "it_state_desc"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_direction", "it_direction"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_score", "it_score"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_scoredescription", "it_score_desc"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_sectordirection", "it_sector_direction"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_sectorscore", "it_sector_score"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_sectorscoredescription", "it_sector_score_desc"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_indexdirection", "it_index_direction"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_indexscore", "it_index_score"),
    ("instrumentinfo_technicalevents_intermediatetermoutlook_indexscoredescription", "it_index_score_desc"),
    ("instrumentinfo_technicalevents_longtermoutlook_statedescription", "lt_state_desc"),
    ("instrumentinfo_technicalevents_longtermoutlook_direction", "lt_direction"),
    ("instrumentinfo_technicalevents_longtermoutlook_score", "lt_score"),
    ("instrumentinfo_technicalevents_longtermoutlook_scoredescription", "lt_score_desc"),
    ("instrumentinfo_technicalevents_longtermoutlook_sectordirection", "lt_sector_direction"),
    ("instrumentinfo_technicalevents_longtermoutlook_sectorscore", "lt_sector_score"),
    ("instrumentinfo_technicalevents_longtermoutlook_sectorscoredescription", "lt_sector_score_desc"),
    ("instrumentinfo_technicalevents_longtermoutlook_indexdirection", "lt_index_direction"),
    ("instrumentinfo_technicalevents_longtermoutlook_indexscore", "lt_index_score"),
    ("instrumentinfo_technicalevents_longtermoutlook_indexscoredescription", "lt_index_score_desc"),
    ("instrumentinfo_keytechnicals_provider", "keytechnicals_provider"),
    ("instrumentinfo_keytechnicals_support", "support"),
    ("instrumentinfo_keytechnicals_resistance", "resistance"),
    ("instrumentinfo_keytechnicals_stoploss", "stoploss"),
    ("instrumentinfo_valuation_color", "valuation_color"),
    ("instrumentinfo_valuation_description", "valuation_desc"),
    ("instrumentinfo_valuation_discount", "valuation_discount"),
    ("instrumentinfo_valuation_relativevalue", "valuation_relative"),
    ("instrumentinfo_valuation_provider", "valuation_provider"),
    ("companysnapshot_sectorinfo", "company_sector_info"),
    ("companysnapshot_company_innovativeness", "comp_innovativeness"),
    ("companysnapshot_company_hiring", "comp_hiring"),
    ("companysnapshot_company_sustainability", "comp_sustainability"),
    ("companysnapshot_company_insidersentiments", "comp_insider_sentiments"),
    ("companysnapshot_company_earningsreports", "comp_earnings_reports"),
    ("companysnapshot_company_dividends", "comp_dividends"),
    ("companysnapshot_sector_innovativeness", "sector_innovativeness"),
    ("companysnapshot_sector_hiring", "sector_hiring"),
    ("companysnapshot_sector_sustainability", "sector_sustainability"),
    ("companysnapshot_sector_insidersentiments", "sector_insider_sentiments"),
    ("companysnapshot_sector_earningsreports", "sector_earnings_reports"),
    ("companysnapshot_sector_dividends", "sector_dividends"),
    ("recommendation_targetprice", "target_price"),
    ("recommendation_provider", "recommendation_provider"),
    ("recommendation_rating", "recommendation_rating"),
    ("upsell_msbullishsummary", "ms_bullish_summary"),
    ("upsell_msbearishsummary", "ms_bearish_summary"),
    ("upsell_companyname", "company_name"),
    ("upsell_msbullishbearishsummariespublishdate", "ms_summary_date"),
    ("upsell_upsellreporttype", "upsell_report_type"),
    ("upsellsearchdd_researchreports_reportid", "research_report_id"),
    ("upsellsearchdd_researchreports_provider", "research_provider"),
    ("upsellsearchdd_researchreports_title", "research_title"),
    ("upsellsearchdd_researchreports_reportdate", "research_date"),
    ("upsellsearchdd_researchreports_summary", "research_summary"),
    ("upsellsearchdd_researchreports_investmentrating", "research_rating"),
    ("events", "events"),
    ("sigdevs", "sig_devs"),
    ("secreports", "sec_reports"),
];
