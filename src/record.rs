use crate::error::{LogsError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// Origin stream of a captured log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    /// The literal stream tag used in persisted records
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One captured chunk of container output, before persistence
#[derive(Debug, Clone)]
pub struct LogMessage {
    /// Raw line bytes as read from the container pipe
    pub line: Vec<u8>,
    /// Which stream produced the line
    pub source: StreamSource,
    /// When the line was captured
    pub timestamp: DateTime<Utc>,
}

impl LogMessage {
    /// Create a message stamped with the current time
    pub fn new(line: impl Into<Vec<u8>>, source: StreamSource) -> Self {
        Self {
            line: line.into(),
            source,
            timestamp: Utc::now(),
        }
    }

    /// Create a message with an explicit capture time
    pub fn with_timestamp(
        line: impl Into<Vec<u8>>,
        source: StreamSource,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            line: line.into(),
            source,
            timestamp,
        }
    }
}

/// RFC 3339 with fixed 9-digit nanoseconds, so the textual form sorts
/// the same way the instants do.
mod rfc3339_nanos {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// On-disk form of a [`LogMessage`]: one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// The line content, newline-terminated
    pub log: String,
    /// Stream tag, `"stdout"` or `"stderr"`
    pub stream: String,
    /// Capture time
    #[serde(with = "rfc3339_nanos")]
    pub created: DateTime<Utc>,
}

impl PersistedRecord {
    /// Build the persisted form of a message, ensuring the trailing newline
    pub fn from_message(msg: &LogMessage) -> Self {
        let mut log = String::from_utf8_lossy(&msg.line).into_owned();
        if !log.ends_with('\n') {
            log.push('\n');
        }
        Self {
            log,
            stream: msg.source.as_str().to_string(),
            created: msg.timestamp,
        }
    }

    /// Parse a single newline-stripped record line
    pub fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| LogsError::Decode(e.to_string()))
    }

    /// The bytes to emit for this record, optionally prefixed with its
    /// capture timestamp.
    pub fn format(&self, with_timestamp: bool) -> Vec<u8> {
        if with_timestamp {
            format!(
                "{} {}",
                self.created.to_rfc3339_opts(SecondsFormat::Nanos, true),
                self.log
            )
            .into_bytes()
        } else {
            self.log.clone().into_bytes()
        }
    }
}

/// Encode a message as exactly one newline-terminated record
pub fn encode(msg: &LogMessage) -> Result<Vec<u8>> {
    let record = PersistedRecord::from_message(msg);
    let mut buf = serde_json::to_vec(&record).map_err(|e| LogsError::Write(e.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

/// Read the next record from a line-delimited stream.
///
/// Returns `Ok(None)` at end of stream. A trailing partial line (no
/// newline yet) is also end of stream, not an error: the writer flushes
/// atomically per record, so the only torn record is the one still being
/// appended.
pub fn read_record<R: BufRead>(reader: &mut R) -> Result<Option<PersistedRecord>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 || !line.ends_with('\n') {
        return Ok(None);
    }
    PersistedRecord::decode(line.trim_end_matches('\n')).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_round_trip() {
        let msg = LogMessage::new(b"hello world".to_vec(), StreamSource::Stdout);
        let bytes = encode(&msg).unwrap();
        assert!(bytes.ends_with(b"\n"));

        let text = String::from_utf8(bytes).unwrap();
        let record = PersistedRecord::decode(text.trim_end()).unwrap();
        assert_eq!(record.log, "hello world\n");
        assert_eq!(record.stream, "stdout");
        assert_eq!(record.created, msg.timestamp);
    }

    #[test]
    fn test_stream_tags() {
        assert_eq!(StreamSource::Stdout.to_string(), "stdout");
        assert_eq!(StreamSource::Stderr.to_string(), "stderr");
    }

    #[test]
    fn test_existing_newline_not_doubled() {
        let msg = LogMessage::new(b"line\n".to_vec(), StreamSource::Stderr);
        let record = PersistedRecord::from_message(&msg);
        assert_eq!(record.log, "line\n");
    }

    #[test]
    fn test_read_record_stops_at_partial_trailing_line() {
        let msg = LogMessage::new(b"complete".to_vec(), StreamSource::Stdout);
        let mut data = encode(&msg).unwrap();
        // Simulate a writer caught mid-append
        data.extend_from_slice(b"{\"log\":\"trunc");

        let mut cursor = Cursor::new(data);
        let first = read_record(&mut cursor).unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().log, "complete\n");

        let second = read_record(&mut cursor).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_read_record_empty_stream() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_record(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_malformed_complete_line_is_an_error() {
        let mut cursor = Cursor::new(b"not json\n".to_vec());
        assert!(read_record(&mut cursor).is_err());
    }

    #[test]
    fn test_format_with_timestamp() {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T10:00:00.000000001Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = PersistedRecord {
            log: "payload\n".to_string(),
            stream: "stdout".to_string(),
            created: ts,
        };

        let plain = record.format(false);
        assert_eq!(plain, b"payload\n");

        let stamped = String::from_utf8(record.format(true)).unwrap();
        assert_eq!(stamped, "2024-01-01T10:00:00.000000001Z payload\n");
    }

    #[test]
    fn test_timestamp_precision_survives_round_trip() {
        let ts = DateTime::parse_from_rfc3339("2024-06-15T08:30:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let msg = LogMessage::with_timestamp(b"x".to_vec(), StreamSource::Stdout, ts);
        let bytes = encode(&msg).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let record = PersistedRecord::decode(text.trim_end()).unwrap();
        assert_eq!(record.created, ts);
    }
}
