use crate::error::Result;
use crate::record::{LogMessage, StreamSource};
use crate::sink::LogSink;

/// Write-only sink relaying records to the host logging facility.
///
/// Each record is forwarded as a tracing event under the `container`
/// target, prefixed with the configured tag; stderr lines go out at error
/// severity, everything else informational. There is no read-back, so
/// historical retrieval is rejected for containers using this driver.
pub struct RelaySink {
    tag: String,
}

impl RelaySink {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl LogSink for RelaySink {
    fn record(&self, msg: &LogMessage) -> Result<()> {
        let line = String::from_utf8_lossy(&msg.line);
        let line = line.trim_end_matches('\n');
        match msg.source {
            StreamSource::Stderr => {
                tracing::error!(target: "container", "{} {}", self.tag, line);
            }
            StreamSource::Stdout => {
                tracing::info!(target: "container", "{} {}", self.tag, line);
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // Nothing to release; double close is fine
        Ok(())
    }

    fn name(&self) -> &'static str {
        "relay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_records_both_streams() {
        let sink = RelaySink::new("web-1");

        sink.record(&LogMessage::new(b"ready\n".to_vec(), StreamSource::Stdout))
            .unwrap();
        sink.record(&LogMessage::new(b"boom\n".to_vec(), StreamSource::Stderr))
            .unwrap();
    }

    #[test]
    fn test_relay_has_no_read_back() {
        let sink = RelaySink::new("web-1");
        assert!(sink.as_readable().is_none());
        assert_eq!(sink.name(), "relay");
    }

    #[test]
    fn test_relay_close_is_idempotent() {
        let sink = RelaySink::new("web-1");
        sink.close().unwrap();
        sink.close().unwrap();
    }
}
