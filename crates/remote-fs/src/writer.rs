//! Write coalescing over a remote handle.
//!
//! Small writes are collected in a fixed-capacity buffer and sent as one
//! remote `write` call when the buffer would overflow. Writes at least as
//! large as the buffer bypass it after any pending bytes are flushed, so
//! bytes always reach the service in the order they were written.

use std::io;
use std::sync::Mutex;

use rhfs_protocol::RemoteDataService;
use tracing::{debug, warn};

use crate::error::FsError;
use crate::handle::OpenHandle;
use crate::status::StatusCache;

/// Default buffer capacity (2,000,000 bytes).
pub const DEFAULT_WRITE_BUFFER: usize = 2_000_000;

/// Buffered writer for one remote file.
pub struct BufferedRemoteWriter<'a, S: RemoteDataService + ?Sized> {
    handle: OpenHandle<'a, S>,
    buf: Vec<u8>,
    capacity: usize,
    closed: bool,
    /// Listing snapshots that go stale once this file's length changes.
    cache: Option<&'a Mutex<StatusCache>>,
}

impl<'a, S: RemoteDataService + ?Sized> BufferedRemoteWriter<'a, S> {
    pub fn new(handle: OpenHandle<'a, S>) -> Self {
        Self::with_capacity(handle, DEFAULT_WRITE_BUFFER)
    }

    /// A capacity of 0 is treated as 1.
    pub fn with_capacity(handle: OpenHandle<'a, S>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            handle,
            buf: Vec::with_capacity(capacity),
            capacity,
            closed: false,
            cache: None,
        }
    }

    /// Clears `cache` when the writer is closed or dropped.
    pub(crate) fn invalidating(mut self, cache: Option<&'a Mutex<StatusCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn path(&self) -> &str {
        self.handle.path()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Queues `data` for the remote file.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), FsError> {
        self.ensure_open()?;

        if data.len() >= self.capacity {
            self.flush_buffer()?;
            debug!(path = %self.path(), bytes = data.len(), "remote write (direct)");
            return self.handle.write(data);
        }

        if self.buf.len() + data.len() > self.capacity {
            self.flush_buffer()?;
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Sends buffered bytes, if any, as one remote write.
    pub fn flush_remote(&mut self) -> Result<(), FsError> {
        self.ensure_open()?;
        self.flush_buffer()
    }

    /// Flushes and closes the remote handle. Closing twice is a no-op.
    ///
    /// The handle is released even when the final flush fails; the flush
    /// error is the one reported.
    pub fn close(&mut self) -> Result<(), FsError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let flushed = self.flush_buffer();
        self.buf.clear();
        let closed = self.handle.close();
        self.invalidate_cache();
        flushed.and(closed)
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = self.cache {
            cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }

    fn flush_buffer(&mut self) -> Result<(), FsError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        debug!(path = %self.path(), bytes = self.buf.len(), "remote write (flush)");
        // The buffer is emptied even on failure; nothing is retried.
        let result = self.handle.write(&self.buf);
        self.buf.clear();
        result
    }

    fn ensure_open(&self) -> Result<(), FsError> {
        if self.closed {
            return Err(FsError::UseAfterClose {
                path: self.path().to_string(),
            });
        }
        Ok(())
    }
}

impl<S: RemoteDataService + ?Sized> io::Write for BufferedRemoteWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_remote()?;
        Ok(())
    }
}

impl<S: RemoteDataService + ?Sized> Drop for BufferedRemoteWriter<'_, S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if !self.buf.is_empty() {
            warn!(path = %self.path(), bytes = self.buf.len(), "flushing unclosed remote writer on drop");
            if let Err(e) = self.flush_buffer() {
                warn!(path = %self.path(), error = %e, "flush on drop failed");
            }
        }
        self.invalidate_cache();
        // The handle field closes itself when dropped.
    }
}
