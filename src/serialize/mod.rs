//! Defaults, input sanitization (purify) and output hydration (crystalize).

mod crystal;
mod default;
mod purify;

pub use crystal::{Crystal, CrystalModel};
pub use default::{DefaultOptions, primitive_default};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Canonical text form of a date value.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse RFC 3339 timestamps, bare `YYYY-MM-DD` dates or epoch milliseconds.
pub fn parse_date(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|date| date.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc())
            }),
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Default date value: the unix epoch.
pub fn epoch_marker() -> String {
    format_date(&DateTime::<Utc>::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_date_forms() {
        let canonical = "2024-03-01T12:30:00.000Z";
        let from_rfc = parse_date(&json!("2024-03-01T12:30:00Z")).unwrap();
        assert_eq!(format_date(&from_rfc), canonical);

        let from_day = parse_date(&json!("2024-03-01")).unwrap();
        assert_eq!(format_date(&from_day), "2024-03-01T00:00:00.000Z");

        let from_millis = parse_date(&json!(0)).unwrap();
        assert_eq!(format_date(&from_millis), epoch_marker());

        assert!(parse_date(&json!("yesterday")).is_none());
        assert!(parse_date(&json!(true)).is_none());
    }
}
