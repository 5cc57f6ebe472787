// Capturing log sinks - persistence and relay endpoints for container output

mod file;
mod relay;

pub use file::RotatingFileSink;
pub use relay::RelaySink;

use crate::config::{LogDriverConfig, LogDriverKind};
use crate::error::Result;
use crate::record::LogMessage;
use std::fs::File;
use std::path::Path;

/// Capture endpoint for a container's output streams.
///
/// `record` must be safe to call from the supervisor's capture tasks;
/// implementations serialize writes internally.
pub trait LogSink: Send + Sync {
    /// Persist or relay one message
    fn record(&self, msg: &LogMessage) -> Result<()>;

    /// Flush and release the backing resource
    fn close(&self) -> Result<()>;

    /// Constant driver name, e.g. "json-file"
    fn name(&self) -> &'static str;

    /// Read-back capability, if this sink keeps history.
    ///
    /// Callers check this before attempting historical retrieval instead
    /// of assuming every driver can replay.
    fn as_readable(&self) -> Option<&dyn ReadableSink> {
        None
    }
}

/// Read-back capability over a sink's rotation generations.
///
/// Generation 0 is the active file; increasing indices are older. Handles
/// returned here are independent of the write path, so a concurrent
/// rotation cannot disturb an in-progress read.
pub trait ReadableSink: Sync {
    /// Upper bound on generations this sink keeps
    fn generation_count(&self) -> usize;

    /// Open an independent read handle to one generation
    fn open_generation(&self, index: usize) -> Result<File>;
}

/// Build the sink a container's log-driver configuration asks for
pub fn new_sink(
    config: &LogDriverConfig,
    base_path: &Path,
    tag: &str,
) -> Result<Box<dyn LogSink>> {
    match config.kind {
        LogDriverKind::JsonFile => {
            let max_files = config.max_files()?;
            let sink = match config.max_size()? {
                Some(capacity) => RotatingFileSink::with_capacity(base_path, capacity, max_files)?,
                None => RotatingFileSink::new(base_path)?,
            };
            Ok(Box::new(sink))
        }
        LogDriverKind::Relay => Ok(Box::new(RelaySink::new(tag))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_factory_builds_json_file_sink() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("container.log");

        let config = LogDriverConfig::new(LogDriverKind::JsonFile)
            .with_option("max-file", "3")
            .with_option("max-size", "1M");
        let sink = new_sink(&config, &path, "web-1").unwrap();

        assert_eq!(sink.name(), "json-file");
        assert!(sink.as_readable().is_some());
        assert_eq!(sink.as_readable().unwrap().generation_count(), 3);
    }

    #[test]
    fn test_factory_builds_relay_sink() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("unused.log");

        let config = LogDriverConfig::new(LogDriverKind::Relay);
        let sink = new_sink(&config, &path, "web-1").unwrap();

        assert_eq!(sink.name(), "relay");
        assert!(sink.as_readable().is_none());
    }
}
