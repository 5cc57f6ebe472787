use thiserror::Error;

/// Main error type for the stevedore log subsystem
#[derive(Debug, Error)]
pub enum LogsError {
    // Sink construction and write path
    #[error("Failed to open log storage: {0}")]
    SinkConstruct(String),

    #[error("Failed to write log record: {0}")]
    Write(String),

    #[error("Failed to relay log record: {0}")]
    Relay(String),

    #[error("Log rotation failed: {0}")]
    Rotation(String),

    #[error("Log sink is closed")]
    SinkClosed,

    // Historical read path
    #[error("Failed to read log history: {0}")]
    Read(String),

    #[error("Malformed log record: {0}")]
    Decode(String),

    #[error("Log generation {0} not found")]
    GenerationNotFound(usize),

    // Retrieval request validation
    #[error("You must choose at least one stream")]
    NoStreamSelected,

    #[error("Log retrieval is supported only for the \"json-file\" logging driver, got {0:?}")]
    UnsupportedDriver(String),

    // Driver configuration
    #[error("Invalid log driver configuration: {0}")]
    Config(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for log subsystem operations
pub type Result<T> = std::result::Result<T, LogsError>;
