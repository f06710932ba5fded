// Date and time functions
//
// Both read the timestamp captured when the top-level evaluation started,
// so every call within one evaluation agrees.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::value::JValue;

/// Format a timestamp as ISO 8601 with millisecond precision, e.g.
/// `2025-01-31T12:00:00.000Z`.
pub fn format_iso8601(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// $now() - Evaluation timestamp as an ISO 8601 string
pub fn now(timestamp: DateTime<Utc>) -> JValue {
    JValue::from(format_iso8601(&timestamp))
}

/// $millis() - Evaluation timestamp in milliseconds since the epoch
pub fn millis(timestamp: DateTime<Utc>) -> JValue {
    JValue::from(timestamp.timestamp_millis())
}
