// External crates
use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Optional leading ISO-8601 timestamp (date, `T` or space separator,
    // time with optional fractional seconds, `Z`), remainder is the message.
    static ref LINE_RE: Regex = Regex::new(
        r"^(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?[Zz])?\s*(.*)$"
    )
    .unwrap();
}

#[derive(Debug, thiserror::Error)]
pub enum LineFormatError {
    #[error("empty log line")]
    Empty,
    #[error("log line has a timestamp but no message")]
    MissingMessage,
    #[error("unparseable timestamp '{value}': {source}")]
    BadTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// A raw log line reduced to its shipped form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// Milliseconds since the Unix epoch, truncated (never rounded up).
    pub timestamp_ms: i64,
    pub message: String,
}

/// Extracts a `(timestamp, message)` pair from one raw log line of unknown
/// format.
///
/// Policy for lines without a recognizable leading timestamp: the whole line
/// becomes the message and the event takes the wall-clock arrival time of
/// the line (`received_at_ms`). A line whose timestamp prefix matches the
/// shape but fails date parsing, an empty line, and a timestamp with no
/// message behind it are all hard errors; the pipeline does not skip lines.
#[derive(Debug, Default, Clone)]
pub struct LineParser;

impl LineParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, line: &str, received_at_ms: i64) -> Result<ParsedLine, LineFormatError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(LineFormatError::Empty);
        }

        // The pattern matches any non-empty input; both parts are optional.
        let captures = match LINE_RE.captures(line) {
            Some(captures) => captures,
            None => return Err(LineFormatError::Empty),
        };

        let Some(stamp) = captures.get(1) else {
            return Ok(ParsedLine {
                timestamp_ms: received_at_ms,
                message: line.to_string(),
            });
        };

        let message = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        if message.is_empty() {
            return Err(LineFormatError::MissingMessage);
        }

        Ok(ParsedLine {
            timestamp_ms: parse_timestamp_ms(stamp.as_str())?,
            message: message.to_string(),
        })
    }
}

/// `floor(seconds-since-epoch × 1000)`; fractional digits beyond
/// milliseconds are truncated.
fn parse_timestamp_ms(stamp: &str) -> Result<i64, LineFormatError> {
    let mut normalized = stamp.replace(' ', "T");
    if normalized.ends_with('z') {
        normalized.pop();
        normalized.push('Z');
    }

    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.timestamp_millis())
        .map_err(|source| LineFormatError::BadTimestamp {
            value: stamp.to_string(),
            source,
        })
}
