// Library exports for the stevedore log subsystem

pub mod config;
pub mod engine;
pub mod error;
pub mod record;
pub mod sink;
pub mod tail;

pub use engine::{container_logs, ContainerLogSource, LivePipe, LogFrame, LogsRequest, TailSpec};
pub use error::{LogsError, Result};
pub use record::{LogMessage, PersistedRecord, StreamSource};
pub use sink::{LogSink, ReadableSink, RelaySink, RotatingFileSink};
