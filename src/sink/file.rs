use crate::error::{LogsError, Result};
use crate::record::{self, LogMessage};
use crate::sink::{LogSink, ReadableSink};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Writer-side state, a single-writer critical section: rotation swaps the
/// file handle out from under anything not holding the lock.
struct Inner {
    /// Active generation handle; None once the sink is closed
    file: Option<File>,
    /// Pending encoded records, flushed to the file every `record` call
    buf: Vec<u8>,
}

/// File-backed log sink with size-bounded rotation.
///
/// Records are appended to `<base>` as one JSON object per line. When a
/// capacity is configured, the active file is rotated through numbered
/// backups `<base>-1` (newest) through `<base>-<max_files-1>` (oldest)
/// once it reaches the per-generation ceiling `capacity / max_files`.
pub struct RotatingFileSink {
    path: PathBuf,
    /// Total capacity across all generations; None disables rotation
    capacity: Option<u64>,
    max_files: usize,
    inner: Mutex<Inner>,
}

impl RotatingFileSink {
    /// Open an unbounded sink: pure append, no rotation logic
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path.as_ref(), None, 1)
    }

    /// Open a capacity-bounded sink keeping at most `max_files` generations.
    ///
    /// `max_files < 2` disables rotation: no backups are kept and the
    /// single file grows unbounded.
    pub fn with_capacity(
        path: impl AsRef<Path>,
        capacity_bytes: u64,
        max_files: usize,
    ) -> Result<Self> {
        Self::open(path.as_ref(), Some(capacity_bytes), max_files.max(1))
    }

    fn open(path: &Path, capacity: Option<u64>, max_files: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                LogsError::SinkConstruct(format!("failed to open {}: {}", path.display(), e))
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            capacity,
            max_files,
            inner: Mutex::new(Inner {
                file: Some(file),
                buf: Vec::new(),
            }),
        })
    }

    /// Path of one generation: `<base>` for 0, `<base>-<index>` otherwise
    fn generation_path(&self, index: usize) -> PathBuf {
        if index == 0 {
            self.path.clone()
        } else {
            let mut name = self.path.clone().into_os_string();
            name.push(format!("-{}", index));
            PathBuf::from(name)
        }
    }

    /// Shift every generation down one index and truncate a fresh active
    /// file.
    ///
    /// The close/reopen gap is not crash-atomic; a crash in between leaves
    /// the sink unusable until the daemon reconstructs it at restart. That
    /// is the accepted contract, not something to mask here.
    fn rotate(&self, inner: &mut Inner) -> Result<()> {
        if let Some(file) = inner.file.take() {
            file.sync_all()
                .map_err(|e| LogsError::Rotation(format!("sync before rotate: {}", e)))?;
        }

        let oldest = self.generation_path(self.max_files - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)
                .map_err(|e| LogsError::Rotation(format!("discard oldest generation: {}", e)))?;
        }
        for i in (1..self.max_files - 1).rev() {
            let from = self.generation_path(i);
            if from.exists() {
                fs::rename(&from, self.generation_path(i + 1)).map_err(|e| {
                    LogsError::Rotation(format!("shift generation {}: {}", i, e))
                })?;
            }
        }
        fs::rename(&self.path, self.generation_path(1))
            .map_err(|e| LogsError::Rotation(format!("retire active file: {}", e)))?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| LogsError::Rotation(format!("reopen active file: {}", e)))?;
        inner.file = Some(file);

        tracing::debug!(path = %self.path.display(), "rotated container log");
        Ok(())
    }
}

impl LogSink for RotatingFileSink {
    fn record(&self, msg: &LogMessage) -> Result<()> {
        let encoded = record::encode(msg)?;

        let mut inner = self
            .inner
            .lock()
            .map_err(|_| LogsError::Write("log writer lock poisoned".to_string()))?;
        inner.buf.extend_from_slice(&encoded);

        if let Some(capacity) = self.capacity {
            if self.max_files >= 2 {
                let file = inner.file.as_ref().ok_or(LogsError::SinkClosed)?;
                let size = file
                    .metadata()
                    .map_err(|e| LogsError::Write(format!("stat active log: {}", e)))?
                    .len();
                if size >= capacity / self.max_files as u64 {
                    self.rotate(&mut inner)?;
                }
            }
        }

        let Inner { file, buf } = &mut *inner;
        let file = file.as_mut().ok_or(LogsError::SinkClosed)?;
        file.write_all(buf)
            .map_err(|e| LogsError::Write(format!("append log record: {}", e)))?;
        file.flush()
            .map_err(|e| LogsError::Write(format!("flush log record: {}", e)))?;
        buf.clear();

        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| LogsError::Write("log writer lock poisoned".to_string()))?;

        // Second close is a deterministic no-op
        let Inner { file, buf } = &mut *inner;
        if let Some(mut file) = file.take() {
            if !buf.is_empty() {
                file.write_all(buf)
                    .map_err(|e| LogsError::Write(format!("flush on close: {}", e)))?;
                buf.clear();
            }
            file.sync_all()
                .map_err(|e| LogsError::Write(format!("sync on close: {}", e)))?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json-file"
    }

    fn as_readable(&self) -> Option<&dyn ReadableSink> {
        Some(self)
    }
}

impl ReadableSink for RotatingFileSink {
    fn generation_count(&self) -> usize {
        self.max_files
    }

    fn open_generation(&self, index: usize) -> Result<File> {
        let path = self.generation_path(index);
        File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogsError::GenerationNotFound(index)
            } else {
                LogsError::Read(format!("open {}: {}", path.display(), e))
            }
        })
    }
}
