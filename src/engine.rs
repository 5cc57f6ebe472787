use crate::error::{LogsError, Result};
use crate::record::{self, PersistedRecord, StreamSource};
use crate::sink::{LogSink, ReadableSink};
use crate::tail;
use chrono::{DateTime, Utc};
use std::io::BufReader as StdBufReader;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// How much history a retrieval request wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailSpec {
    /// Everything across the whole generation window
    All,
    /// The most recent segment: the whole active generation when no
    /// `since` filter narrows it, else the full window
    Latest,
    /// At most this many lines across the generation window
    Lines(usize),
}

impl TailSpec {
    /// Parse the wire form: "all", "latest" (or empty), or a line count.
    /// An unparsable value falls back to showing all logs.
    pub fn parse(raw: &str) -> TailSpec {
        match raw {
            "" | "latest" => TailSpec::Latest,
            "all" => TailSpec::All,
            other => match other.parse::<usize>() {
                Ok(n) => TailSpec::Lines(n),
                Err(e) => {
                    warn!(tail = other, error = %e, "failed to parse tail value, showing all logs");
                    TailSpec::All
                }
            },
        }
    }
}

/// A log retrieval request as it arrives from the API layer
#[derive(Debug, Clone)]
pub struct LogsRequest {
    /// Include stdout records
    pub stdout: bool,
    /// Include stderr records
    pub stderr: bool,
    /// How much history to replay before any live phase
    pub tail: TailSpec,
    /// Drop records captured before this instant
    pub since: Option<DateTime<Utc>>,
    /// Prefix every emitted line with its capture timestamp
    pub timestamps: bool,
    /// Keep streaming live output after the historical replay
    pub follow: bool,
}

impl Default for LogsRequest {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
            tail: TailSpec::Latest,
            since: None,
            timestamps: false,
            follow: false,
        }
    }
}

/// One multiplexed output unit: a formatted chunk tagged with the stream
/// it came from. The embedding layer decides the final framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub stream: StreamSource,
    pub data: Vec<u8>,
}

/// A live read handle onto one of a running container's output streams,
/// carrying encoded records
pub struct LivePipe {
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl LivePipe {
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }
}

/// What the engine needs from a container: its sink, whether it is still
/// running, and live pipes onto its output. The container supervisor
/// implements this; the engine never touches lifecycle state directly.
pub trait ContainerLogSource: Send + Sync {
    fn is_running(&self) -> bool;

    fn sink(&self) -> &dyn LogSink;

    /// Open a fresh live pipe for one stream. Only called for streams the
    /// request actually selected, and only while the container is running.
    fn open_live_pipe(&self, stream: StreamSource) -> LivePipe;
}

/// Serve a container's logs: bounded historical replay, then an optional
/// live-follow phase, streaming frames to `out` as they become available.
///
/// Fails fast, before any I/O, when no stream is selected or the
/// container's log driver keeps no readable history.
pub async fn container_logs(
    source: &dyn ContainerLogSource,
    request: &LogsRequest,
    out: &mpsc::Sender<LogFrame>,
) -> Result<()> {
    if !request.stdout && !request.stderr {
        return Err(LogsError::NoStreamSelected);
    }

    let sink = source.sink();
    let readable = sink
        .as_readable()
        .ok_or_else(|| LogsError::UnsupportedDriver(sink.name().to_string()))?;

    if request.tail != TailSpec::Lines(0) {
        let window = match request.tail {
            // "latest" without a since filter only needs the active file
            TailSpec::Latest if request.since.is_none() => 1,
            _ => readable.generation_count(),
        };
        replay_history(readable, request, window, out).await;
    }

    if request.follow && source.is_running() {
        follow_live(source, request, out).await;
    }

    Ok(())
}

/// Phase 1: decode persisted records oldest first and emit the ones the
/// request selects. A generation that cannot be opened or decoded is
/// logged and skipped; the remaining generations are still replayed.
async fn replay_history(
    readable: &dyn ReadableSink,
    request: &LogsRequest,
    window: usize,
    out: &mpsc::Sender<LogFrame>,
) {
    match request.tail {
        TailSpec::Lines(limit) => {
            for raw in tail::tail_lines(readable, window, limit) {
                let line = String::from_utf8_lossy(&raw);
                match PersistedRecord::decode(&line) {
                    Ok(record) => {
                        if emit_record(&record, request, out).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "skipping malformed log record"),
                }
            }
        }
        TailSpec::All | TailSpec::Latest => {
            // Oldest generation first, so output stays chronological
            for index in (0..window).rev() {
                let file = match tail::generation_reader(readable, index) {
                    Ok(file) => file,
                    Err(LogsError::GenerationNotFound(_)) => {
                        debug!(generation = index, "log generation not present");
                        continue;
                    }
                    Err(e) => {
                        warn!(generation = index, error = %e, "skipping unreadable log generation");
                        continue;
                    }
                };
                let mut reader = StdBufReader::new(file);
                loop {
                    match record::read_record(&mut reader) {
                        Ok(Some(record)) => {
                            if emit_record(&record, request, out).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(generation = index, error = %e, "error streaming logs");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Filter, route, and format one record. `Err` means the receiver is gone
/// and the replay should stop quietly.
async fn emit_record(
    record: &PersistedRecord,
    request: &LogsRequest,
    out: &mpsc::Sender<LogFrame>,
) -> std::result::Result<(), ()> {
    if let Some(since) = request.since {
        if record.created < since {
            return Ok(());
        }
    }
    let stream = match record.stream.as_str() {
        "stdout" if request.stdout => StreamSource::Stdout,
        "stderr" if request.stderr => StreamSource::Stderr,
        _ => return Ok(()),
    };
    let data = record.format(request.timestamps);
    out.send(LogFrame { stream, data }).await.map_err(|_| ())
}

/// Phase 2: one pump task per requested stream, multiplexed by arrival.
///
/// The engine waits for the first pump to finish, closes both pipes so
/// the other pump unblocks, then waits for it too. Returning before both
/// pumps have stopped would let a task write to the caller's output after
/// control has already been handed back.
async fn follow_live(
    source: &dyn ContainerLogSource,
    request: &LogsRequest,
    out: &mpsc::Sender<LogFrame>,
) {
    // Empty frame first, so an intermediate transport flushes its response
    // headers before the container produces anything.
    let flush = LogFrame {
        stream: StreamSource::Stdout,
        data: Vec::new(),
    };
    if out.send(flush).await.is_err() {
        return;
    }

    let (done_tx, mut done_rx) = mpsc::channel::<Result<()>>(2);
    let (close_tx, close_rx) = watch::channel(false);

    let mut pumps = 0;
    for stream in [StreamSource::Stdout, StreamSource::Stderr] {
        let wanted = match stream {
            StreamSource::Stdout => request.stdout,
            StreamSource::Stderr => request.stderr,
        };
        if !wanted {
            continue;
        }

        let pipe = source.open_live_pipe(stream);
        let pump_out = out.clone();
        let pump_done = done_tx.clone();
        let closed = close_rx.clone();
        let since = request.since;
        let timestamps = request.timestamps;
        tokio::spawn(async move {
            debug!(stream = %stream, "logs: live stream begin");
            let outcome = pump(pipe, stream, since, timestamps, pump_out, closed).await;
            let _ = pump_done.send(outcome).await;
            debug!(stream = %stream, "logs: live stream end");
        });
        pumps += 1;
    }
    drop(done_tx);

    let first = done_rx.recv().await;
    let _ = close_tx.send(true);
    for _ in 1..pumps {
        let _ = done_rx.recv().await;
    }

    // The response is already in flight; a pump failure is only a warning
    if let Some(Err(e)) = first {
        warn!(error = %e, "error streaming logs");
    }
}

/// Drain one live pipe into the multiplexed output until end-of-stream,
/// pipe close, or the receiver going away. All three are normal
/// termination; only real decode/read failures are reported.
async fn pump(
    pipe: LivePipe,
    stream: StreamSource,
    since: Option<DateTime<Utc>>,
    timestamps: bool,
    out: mpsc::Sender<LogFrame>,
    mut closed: watch::Receiver<bool>,
) -> Result<()> {
    let mut lines = BufReader::new(pipe.reader).lines();
    loop {
        let next = tokio::select! {
            _ = closed.changed() => return Ok(()),
            next = lines.next_line() => next,
        };
        match next {
            Ok(Some(line)) => {
                let record = PersistedRecord::decode(&line)?;
                if let Some(since) = since {
                    if record.created < since {
                        continue;
                    }
                }
                let data = record.format(timestamps);
                if out.send(LogFrame { stream, data }).await.is_err() {
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                return match e.kind() {
                    std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => Ok(()),
                    _ => Err(e.into()),
                };
            }
        }
    }
}
