use chrono::{DateTime, NaiveDateTime, Utc};

pub const SECONDS_PER_DAY: f64 = 86_400.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 timestamp. Offsets are honoured; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `later - earlier` in fractional days.
pub fn days_between(earlier: &DateTime<Utc>, later: &DateTime<Utc>) -> f64 {
    (*later - *earlier).num_milliseconds() as f64 / MILLIS_PER_DAY
}

pub fn days_to_seconds(days: f64) -> f64 {
    days * SECONDS_PER_DAY
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}
