use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Dual-destination writer for one test run.
///
/// Every write goes to the log file first (and is flushed immediately), then
/// to the in-memory buffer. A write that fails on the file never reaches the
/// buffer, so the two stay byte-identical for the life of the run.
///
/// # Failures
/// The first failed write or flush is recorded and returned by every later
/// write. Bytes it left in the write buffer are discarded and the file is
/// truncated back to the last complete write.
///
/// # Locking
/// The log file is held under an exclusive advisory lock (`fs2`) from `open`
/// until `close`. A second run targeting the same log fails to open.
pub struct CaptureSink {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    buffer: Vec<u8>,
    /// 文件中已完整写入的长度（头部 + buffer）
    committed: u64,
    failure: Option<(io::ErrorKind, String)>,
}

impl CaptureSink {
    /// Open `path` in append mode with a write buffer of `buffer_size` bytes.
    pub fn open<P: AsRef<Path>>(path: P, buffer_size: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        file.try_lock_exclusive().map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("log file {} is locked by another run: {}", path.display(), e),
            )
        })?;
        let committed = file.metadata()?.len();

        Ok(Self {
            path,
            file: Some(BufWriter::with_capacity(buffer_size.max(1), file)),
            buffer: Vec::new(),
            committed,
            failure: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Everything captured so far, lossily decoded.
    pub fn captured(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// The first log write error of this run, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.as_ref().map(|(_, msg)| msg.clone())
    }

    /// Flush, unlock and drop the file handle. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(mut writer) = self.file.take() else {
            return Ok(());
        };

        let flushed = writer.flush();
        let unlocked = FileExt::unlock(writer.get_ref());
        drop(writer);

        flushed.and(unlocked)
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "capture sink is closed")
        })
    }

    fn check_failed(&self) -> io::Result<()> {
        match &self.failure {
            Some((kind, msg)) => Err(io::Error::new(*kind, msg.clone())),
            None => Ok(()),
        }
    }

    /// Record `err`, drop unflushed bytes and cut the file back to `committed`.
    fn fail(&mut self, err: &io::Error) {
        if self.failure.is_none() {
            self.failure = Some((err.kind(), err.to_string()));
        }

        if let Some(writer) = self.file.take() {
            let capacity = writer.capacity();
            let (file, _unflushed) = writer.into_parts();
            if let Err(e) = file.set_len(self.committed) {
                tracing::warn!("Cannot roll back {}: {}", self.path.display(), e);
            }
            self.file = Some(BufWriter::with_capacity(capacity, file));
        }
    }
}

impl Write for CaptureSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_failed()?;
        let writer = self.writer()?;

        match writer.write_all(buf).and_then(|()| writer.flush()) {
            Ok(()) => {
                self.committed += buf.len() as u64;
                self.buffer.extend_from_slice(buf);
                Ok(buf.len())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_failed()?;
        if let Err(e) = self.writer()?.flush() {
            self.fail(&e);
            return Err(e);
        }
        Ok(())
    }
}

impl Drop for CaptureSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close capture sink {}: {}", self.path.display(), e);
        }
    }
}

/// Shared handle to a [`CaptureSink`].
///
/// The executor keeps one clone so it can close the sink even while a test
/// unit still holds another (e.g. after a timeout).
#[derive(Clone)]
pub struct CaptureHandle {
    inner: Arc<Mutex<CaptureSink>>,
}

impl CaptureHandle {
    pub fn new(sink: CaptureSink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// 关闭底层文件；之后的写入都会失败
    pub fn close(&self) -> io::Result<()> {
        self.lock_ignoring_poison().close()
    }

    pub fn is_closed(&self) -> bool {
        self.lock_ignoring_poison().is_closed()
    }

    pub fn captured(&self) -> String {
        self.lock_ignoring_poison().captured()
    }

    pub fn failure(&self) -> Option<String> {
        self.lock_ignoring_poison().failure()
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, CaptureSink>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("capture sink lock poisoned"))
    }

    // The sink's state is valid even if a writer panicked mid-call, since a
    // write only touches the buffer after the file write succeeded.
    fn lock_ignoring_poison(&self) -> MutexGuard<'_, CaptureSink> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Write for CaptureHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}
