//! Output capture strategies and scratch-directory lifecycle.
//!
//! Two interchangeable stdout sinks satisfy one contract: after the run,
//! [`OutputSink::drain`] returns everything the guest wrote.
//!
//! - **Buffered** (default): a fresh in-memory pipe per invocation; no
//!   state is shared between calls.
//! - **File-redirected**: stdout writes through to a scratch file. The
//!   file name is unique to the invocation (a per-processor counter), so
//!   concurrent calls never share a path, and the file is removed when
//!   the sink is dropped. [`ScratchState`] owns the directory the files
//!   live in and its end-of-life cleanup.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;
use wasmtime_wasi::pipe::MemoryOutputPipe;
use wasmtime_wasi::{HostOutputStream, StdoutStream, StreamError, StreamResult, Subscribe};

use wasi_proc_common::{CaptureConfig, CaptureMode, ProcessorError};

/// Capture strategy resolved at processor construction.
#[derive(Clone)]
pub(crate) enum CaptureBackend {
    Buffered,
    File(Arc<ScratchState>),
}

impl CaptureBackend {
    pub fn from_config(config: &CaptureConfig) -> Result<Self, ProcessorError> {
        match config.mode {
            CaptureMode::Buffered => Ok(Self::Buffered),
            CaptureMode::File => Ok(Self::File(Arc::new(ScratchState::new(
                config.io_dir.as_deref(),
            )?))),
        }
    }

    pub fn close(&self) -> Result<(), ProcessorError> {
        match self {
            Self::Buffered => Ok(()),
            Self::File(state) => state.close(),
        }
    }
}

/// Per-invocation stdout sink.
///
/// Owned by exactly one invocation; `drain` is called at most once,
/// after the guest has terminated.
pub(crate) enum OutputSink {
    Buffered(MemoryOutputPipe),
    File(ScratchFile),
}

impl OutputSink {
    /// Read back everything the guest wrote to stdout during the run.
    pub fn drain(&self) -> Result<Vec<u8>, ProcessorError> {
        match self {
            Self::Buffered(pipe) => Ok(pipe.contents().to_vec()),
            Self::File(scratch) => Ok(fs::read(scratch.path())?),
        }
    }
}

/// Scratch-directory state for the file-redirected strategy.
///
/// Created once per processor. Every invocation allocates its own file
/// inside the directory; the directory itself is removed at close only
/// when the processor created it.
pub struct ScratchState {
    dir: PathBuf,
    owned: bool,
    seq: AtomicU64,
}

impl ScratchState {
    /// Use `io_dir` when supplied (the caller keeps ownership of it and
    /// must keep it valid for the processor's lifetime), otherwise
    /// create a fresh directory under the system temp dir.
    pub fn new(io_dir: Option<&Path>) -> Result<Self, ProcessorError> {
        match io_dir {
            Some(dir) => Ok(Self {
                dir: dir.to_path_buf(),
                owned: false,
                seq: AtomicU64::new(0),
            }),
            None => {
                let dir =
                    std::env::temp_dir().join(format!("wasi-proc-{}", Uuid::new_v4().simple()));
                fs::create_dir_all(&dir)?;
                debug!(dir = %dir.display(), "Created scratch directory");
                Ok(Self {
                    dir,
                    owned: true,
                    seq: AtomicU64::new(0),
                })
            }
        }
    }

    /// Allocate a fresh scratch file path for one invocation.
    pub(crate) fn allocate(&self) -> ScratchFile {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        ScratchFile {
            path: self.dir.join(format!("stdout-{n:06}.out")),
        }
    }

    /// Remove the scratch directory if this processor created it.
    ///
    /// Caller-supplied directories are left untouched; per-invocation
    /// files are already removed by their guards. A path that is
    /// already absent is not an error, so calling this twice is a no-op
    /// the second time.
    pub fn close(&self) -> Result<(), ProcessorError> {
        if !self.owned {
            return Ok(());
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProcessorError::Io(e)),
        }
    }
}

impl Drop for ScratchState {
    fn drop(&mut self) {
        if self.owned {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

impl std::fmt::Debug for ScratchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchState")
            .field("dir", &self.dir)
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

/// One invocation's scratch file, removed on drop on every exit path.
pub(crate) struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the file, creating it if absent, and hand back the
    /// handle the guest's stdout writes through.
    pub fn truncate(&self) -> Result<File, ProcessorError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(file)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

/// Bytes accepted per `check_write` round when writing to the file.
const WRITE_BUDGET: usize = 64 * 1024;

/// Stdout stream that writes through to a scratch file.
pub(crate) struct FileCapture {
    file: Arc<File>,
}

impl FileCapture {
    pub fn new(file: File) -> Self {
        Self {
            file: Arc::new(file),
        }
    }
}

impl StdoutStream for FileCapture {
    fn stream(&self) -> Box<dyn HostOutputStream> {
        Box::new(FileCaptureStream {
            file: self.file.clone(),
        })
    }

    fn isatty(&self) -> bool {
        false
    }
}

struct FileCaptureStream {
    file: Arc<File>,
}

#[async_trait::async_trait]
impl Subscribe for FileCaptureStream {
    async fn ready(&mut self) {}
}

impl HostOutputStream for FileCaptureStream {
    fn write(&mut self, bytes: Bytes) -> StreamResult<()> {
        (&*self.file)
            .write_all(&bytes)
            .map_err(|e| StreamError::LastOperationFailed(e.into()))
    }

    fn flush(&mut self) -> StreamResult<()> {
        (&*self.file)
            .flush()
            .map_err(|e| StreamError::LastOperationFailed(e.into()))
    }

    fn check_write(&mut self) -> StreamResult<usize> {
        Ok(WRITE_BUDGET)
    }
}
