use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use thiserror::Error;

use podalert_types::LogRecord;

/// Timestamp layout of the `time="..."` field (UTC). Fractional seconds are
/// optional.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// `time="<ts>" level=<token> msg="<text>"`.
///
/// Every group is greedy, so a message containing quotes is captured through
/// the last quote on the line, including any trailing `key="value"` fields.
static STRUCTURED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"time="(.*)"\s+level=(.*)\s+msg="(.*)""#).expect("structured log pattern is valid")
});

/// A line had the structured shape but a field could not be decoded
#[derive(Debug, Error)]
pub enum LogParseError {
    #[error("invalid timestamp {value:?}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Extract a [`LogRecord`] from one raw log line.
///
/// Returns `Ok(None)` when the line is not structured, which is the normal
/// case for free-form output.
pub fn parse_line(line: &str) -> Result<Option<LogRecord>, LogParseError> {
    let Some(caps) = STRUCTURED_LINE.captures(line) else {
        return Ok(None);
    };

    let raw_time = &caps[1];
    let timestamp = NaiveDateTime::parse_from_str(raw_time, TIMESTAMP_FORMAT)
        .map_err(|source| LogParseError::Timestamp {
            value: raw_time.to_string(),
            source,
        })?
        .and_utc();

    Ok(Some(LogRecord {
        timestamp,
        level: caps[2].to_string(),
        message: caps[3].to_string(),
    }))
}
