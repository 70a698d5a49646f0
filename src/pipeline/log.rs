use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Append-only log for one run. Clones share the same sink, so the command
/// executor's reader threads and the orchestrator can interleave writes.
/// Writes are best-effort: a failing sink never aborts the pipeline.
#[derive(Clone)]
pub struct RunLog {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl RunLog {
    /// Open (append mode) the run's log file, creating parent directories.
    pub fn to_file(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(Box::new(file)))
    }

    /// In-memory sink plus a readable handle on its contents.
    pub fn buffered() -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        let log = Self::from_writer(Box::new(buffer.clone()));
        (log, buffer)
    }

    fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(writer)),
        }
    }

    /// One line to both the process log and the run's own log.
    pub fn info(&self, line: &str) {
        info!("{line}");
        self.write_raw(format!("{line}\n").as_bytes());
    }

    /// Raw bytes (command output) to the run's log only.
    pub fn write_raw(&self, bytes: &[u8]) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = sink.write_all(bytes);
        let _ = sink.flush();
    }
}

/// Shared in-memory byte buffer behind [`RunLog::buffered`].
#[derive(Clone, Default)]
pub struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(bytes.as_slice()).to_string()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SummaryWriteError {
    #[error("failed to create summary parent directory '{path}': {message}")]
    CreateParent { path: String, message: String },
    #[error("failed to serialize summary JSON: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write summary '{path}': {message}")]
    WriteFile { path: String, message: String },
}

/// Write `value` as pretty JSON with a trailing newline, the format the
/// run summary file uses.
pub fn write_pretty_json_with_newline<T>(path: &Path, value: &T) -> Result<(), SummaryWriteError>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| SummaryWriteError::CreateParent {
            path: parent.display().to_string(),
            message: error.to_string(),
        })?;
    }

    let mut bytes = serde_json::to_vec_pretty(value).map_err(SummaryWriteError::Serialize)?;
    bytes.push(b'\n');
    fs::write(path, bytes).map_err(|error| SummaryWriteError::WriteFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    Ok(())
}
