//! Cell coercion from merged-file text to SQL values.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use crate::store::{SqlType, SqlValue as Value};

/// Strings treated as SQL NULL in every column.
pub const NULL_LIKE: &[&str] = &["", "nan", "NaN", "None", "null", "NaT"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y%m%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// How a destination column is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Calendar date, stored as `YYYY-MM-DD`.
    Date,
    /// Epoch milliseconds, stored as `YYYY-MM-DD HH:MM:SS`.
    EpochMs,
    Bool,
    Json,
    Real,
    Text,
}

impl ColumnKind {
    /// Declared column type used in `CREATE TABLE`. JSON is kept as text.
    pub fn sql_type(self) -> SqlType {
        match self {
            ColumnKind::Date => SqlType::Date,
            ColumnKind::EpochMs => SqlType::Timestamp,
            ColumnKind::Json | ColumnKind::Text => SqlType::Text,
            ColumnKind::Bool => SqlType::Boolean,
            ColumnKind::Real => SqlType::Real,
        }
    }

    /// Coerce one cell. Unparseable values become NULL.
    pub fn coerce(self, cell: Option<&str>) -> Value {
        let Some(text) = cell.map(str::trim).filter(|s| !is_null_like(s)) else {
            return Value::Null;
        };
        let coerced = match self {
            ColumnKind::Date => parse_date(text).map(|d| Value::Text(d.format("%Y-%m-%d").to_string())),
            ColumnKind::EpochMs => parse_epoch_ms(text)
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string())),
            ColumnKind::Bool => parse_bool(text).map(|b| Value::Integer(i64::from(b))),
            ColumnKind::Json => canonical_json(text).map(Value::Text),
            ColumnKind::Real => parse_real(text).map(Value::Real),
            ColumnKind::Text => Some(Value::Text(text.to_string())),
        };
        coerced.unwrap_or(Value::Null)
    }
}

pub fn is_null_like(text: &str) -> bool {
    NULL_LIKE.contains(&text)
}

/// ISO date, ISO datetime, RFC 3339, `dd/mm/YYYY`, `YYYYMMDD` or epoch
/// milliseconds.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d);
        }
    }
    parse_datetime(text)
        .or_else(|| parse_epoch_ms(text))
        .map(|dt| dt.date())
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Milliseconds since the Unix epoch, UTC. Accepts integer or float text
/// (`1717243200000`, `1.7172432E12`) of at least 11 digits' magnitude.
pub fn parse_epoch_ms(text: &str) -> Option<NaiveDateTime> {
    let ms = text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.round() as i64)
    })?;
    if ms.unsigned_abs() < 10_000_000_000 {
        return None;
    }
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "True" | "TRUE" | "1" | "1.0" => Some(true),
        "false" | "False" | "FALSE" | "0" | "0.0" => Some(false),
        _ => None,
    }
}

/// Finite floating-point value.
pub fn parse_real(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Decode JSON text and re-encode it compactly.
pub fn canonical_json(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .map(|v| v.to_string())
}

/// Whether every non-null cell reads as a number. Values with a leading
/// zero (`02139`) are identifiers, not numbers.
pub fn looks_numeric<'a>(cells: impl IntoIterator<Item = Option<&'a str>>) -> bool {
    let mut any = false;
    for cell in cells {
        let Some(text) = cell.map(str::trim).filter(|s| !is_null_like(s)) else {
            continue;
        };
        let digits = text.trim_start_matches('-');
        if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
            return false;
        }
        if parse_real(text).is_none() {
            return false;
        }
        any = true;
    }
    any
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_likes_become_null() {
        for s in NULL_LIKE {
            assert_eq!(ColumnKind::Text.coerce(Some(*s)), Value::Null, "{s}");
        }
        assert_eq!(ColumnKind::Real.coerce(None), Value::Null);
    }

    #[test]
    fn dates_in_every_supported_form() {
        let expected = Value::Text("2024-06-14".into());
        for s in [
            "2024-06-14",
            "14/06/2024",
            "2024-06-14 00:00:00",
            "2024-06-14T09:30:00",
            "2024-06-14T13:30:00Z",
            "1718370000000",
        ] {
            assert_eq!(ColumnKind::Date.coerce(Some(s)), expected, "{s}");
        }
        assert_eq!(ColumnKind::Date.coerce(Some("next week")), Value::Null);
    }

    #[test]
    fn epoch_ms_to_datetime() {
        assert_eq!(
            ColumnKind::EpochMs.coerce(Some("1718366400000")),
            Value::Text("2024-06-14 12:00:00".into())
        );
        assert_eq!(
            ColumnKind::EpochMs.coerce(Some("1.7183664E12")),
            Value::Text("2024-06-14 12:00:00".into())
        );
        assert_eq!(ColumnKind::EpochMs.coerce(Some("2024")), Value::Null);
    }

    #[test]
    fn numbers_bools_and_json() {
        assert_eq!(ColumnKind::Real.coerce(Some("1.5")), Value::Real(1.5));
        assert_eq!(ColumnKind::Real.coerce(Some("n/a")), Value::Null);
        assert_eq!(ColumnKind::Real.coerce(Some("inf")), Value::Null);
        assert_eq!(ColumnKind::Bool.coerce(Some("True")), Value::Integer(1));
        assert_eq!(ColumnKind::Bool.coerce(Some("false")), Value::Integer(0));
        assert_eq!(ColumnKind::Bool.coerce(Some("maybe")), Value::Null);
        assert_eq!(
            ColumnKind::Json.coerce(Some(r#"[ {"name": "A",  "age": 50} ]"#)),
            Value::Text(r#"[{"age":50,"name":"A"}]"#.into())
        );
        assert_eq!(ColumnKind::Json.coerce(Some("[{'name': 'A'}]")), Value::Null);
    }

    #[test]
    fn kinds_map_to_declared_types() {
        assert_eq!(ColumnKind::Date.sql_type(), SqlType::Date);
        assert_eq!(ColumnKind::EpochMs.sql_type(), SqlType::Timestamp);
        assert_eq!(ColumnKind::Json.sql_type(), SqlType::Text);
        assert_eq!(ColumnKind::Bool.sql_type().postgres_name(), "BOOLEAN");
        assert_eq!(ColumnKind::Bool.sql_type().sqlite_name(), "INTEGER");
    }

    #[test]
    fn numeric_detection() {
        assert!(looks_numeric([Some("1"), None, Some("-2.5"), Some("0.3")]));
        assert!(!looks_numeric([Some("1"), Some("AAA")]));
        assert!(!looks_numeric([Some("02139")]));
        assert!(!looks_numeric([None, Some("nan")]));
    }
}
