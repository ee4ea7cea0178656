//! Provider payload types.
//!
//! Every provider call answers with a [`ProviderResponse`]: nothing, one
//! nested record, or a table of records. Consumers match on the variant
//! instead of probing the payload shape at runtime.

use serde_json::{Map, Value};

/// One nested mapping as returned by the provider.
pub type Record = Map<String, Value>;

/// Tagged provider payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    /// The ticker is unknown to the provider or has no data for the segment.
    Empty,
    /// A single nested mapping (technical insights, one fundamentals module).
    SingleRecord(Record),
    /// Row-shaped data (price history, option contracts, statements, officers).
    Table(Vec<Record>),
}

impl ProviderResponse {
    pub fn is_empty(&self) -> bool {
        match self {
            ProviderResponse::Empty => true,
            ProviderResponse::SingleRecord(r) => r.is_empty(),
            ProviderResponse::Table(rows) => rows.is_empty(),
        }
    }

    /// Number of records carried.
    pub fn len(&self) -> usize {
        match self {
            ProviderResponse::Empty => 0,
            ProviderResponse::SingleRecord(_) => 1,
            ProviderResponse::Table(rows) => rows.len(),
        }
    }

    /// Flatten the variant into a list of records. A single record becomes
    /// a one-element list.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            ProviderResponse::Empty => Vec::new(),
            ProviderResponse::SingleRecord(r) => vec![r],
            ProviderResponse::Table(rows) => rows,
        }
    }
}

/// Build a record from `(key, value)` pairs. Mostly useful in tests and in
/// the synthetic provider.
pub fn record_from<I, K>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_variants_report_empty() {
        assert!(ProviderResponse::Empty.is_empty());
        assert!(ProviderResponse::Table(vec![]).is_empty());
        assert!(ProviderResponse::SingleRecord(Record::new()).is_empty());
    }

    #[test]
    fn single_record_becomes_one_row() {
        let rec = record_from([("a", json!(1))]);
        let resp = ProviderResponse::SingleRecord(rec.clone());
        assert_eq!(resp.len(), 1);
        assert_eq!(resp.into_records(), vec![rec]);
    }
}
