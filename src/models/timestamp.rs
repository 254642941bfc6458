//! Timestamp parsing and stamping for project records.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Current time as an ISO-8601 string with millisecond precision.
pub fn now() -> String {
    format(Utc::now())
}

pub fn format(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a stored timestamp as epoch milliseconds.
///
/// Accepts RFC 3339 strings, epoch-millisecond numbers and
/// `{seconds, nanoseconds}` objects. Anything else, including values whose
/// millisecond count overflows, is `None`.
pub fn to_millis(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::Object(obj) => {
            let seconds = obj.get("seconds").and_then(Value::as_i64)?;
            let nanos = obj
                .get("nanoseconds")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            seconds.checked_mul(1000)?.checked_add(nanos / 1_000_000)
        }
        _ => None,
    }
}

/// Stamp for an update that must sort strictly after `previous`.
///
/// Uses the wall clock unless it has not advanced past the previous stamp, in
/// which case the previous stamp plus one millisecond is used.
pub fn next_after(previous: Option<&Value>) -> String {
    let now = Utc::now();
    let Some(prev) = previous.and_then(to_millis) else {
        return format(now);
    };

    if now.timestamp_millis() > prev {
        return format(now);
    }

    match prev
        .checked_add(1)
        .and_then(|bumped| Utc.timestamp_millis_opt(bumped).single())
    {
        Some(bumped) => format(bumped),
        None => format(now),
    }
}
