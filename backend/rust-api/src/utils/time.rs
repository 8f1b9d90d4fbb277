use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical attempt timestamp: `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// Strings in this form sort lexicographically in chronological order, which
/// the lookback scans depend on.
pub fn to_iso_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses `value` as RFC 3339 and accepts it only if it is already in
/// canonical form.
pub fn parse_iso_millis(value: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value).ok()?.with_timezone(&Utc);
    (to_iso_millis(parsed) == value).then_some(parsed)
}
