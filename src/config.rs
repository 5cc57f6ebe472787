use crate::error::{LogsError, Result};
use std::collections::HashMap;

/// Log driver selected for a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDriverKind {
    /// Rotating JSON-per-line file driver, supports read-back
    JsonFile,
    /// Relay to the host logging facility, write-only
    Relay,
}

impl LogDriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogDriverKind::JsonFile => "json-file",
            LogDriverKind::Relay => "relay",
        }
    }
}

impl std::str::FromStr for LogDriverKind {
    type Err = LogsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json-file" => Ok(LogDriverKind::JsonFile),
            "relay" => Ok(LogDriverKind::Relay),
            other => Err(LogsError::Config(format!("unknown log driver: {}", other))),
        }
    }
}

/// Per-container log driver configuration, as handed down by the daemon
#[derive(Debug, Clone)]
pub struct LogDriverConfig {
    pub kind: LogDriverKind,
    /// Driver options, e.g. "max-file" and "max-size" for json-file
    pub options: HashMap<String, String>,
}

impl LogDriverConfig {
    pub fn new(kind: LogDriverKind) -> Self {
        Self {
            kind,
            options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    /// Number of rotation generations to keep ("max-file", default 1)
    pub fn max_files(&self) -> Result<usize> {
        match self.options.get("max-file") {
            None => Ok(1),
            Some(raw) => {
                let n: usize = raw.parse().map_err(|e| {
                    LogsError::Config(format!("error reading max-file value: {}", e))
                })?;
                if n == 0 {
                    return Err(LogsError::Config(
                        "max-file must be at least 1".to_string(),
                    ));
                }
                Ok(n)
            }
        }
    }

    /// Total capacity across all generations ("max-size"), if bounded
    pub fn max_size(&self) -> Result<Option<u64>> {
        match self.options.get("max-size") {
            None => Ok(None),
            Some(raw) => parse_byte_size(raw).map(Some),
        }
    }
}

/// Parse a byte size with an optional K/M/G suffix, e.g. "10M"
pub fn parse_byte_size(raw: &str) -> Result<u64> {
    if raw.is_empty() {
        return Err(LogsError::Config("empty size value".to_string()));
    }
    let (digits, multiplier) = match raw.as_bytes()[raw.len() - 1] {
        b'k' | b'K' => (&raw[..raw.len() - 1], 1024),
        b'm' | b'M' => (&raw[..raw.len() - 1], 1024 * 1024),
        b'g' | b'G' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => (raw, 1),
    };
    let value: u64 = digits
        .parse()
        .map_err(|e| LogsError::Config(format!("invalid size {:?}: {}", raw, e)))?;
    Ok(value * multiplier)
}
