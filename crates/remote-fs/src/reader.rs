//! Sequential chunked reads over a remote handle.

use std::io;

use rhfs_protocol::RemoteDataService;
use tracing::debug;

use crate::error::FsError;
use crate::handle::OpenHandle;

/// Streams one remote file into caller-supplied buffers.
///
/// The service decides how many bytes a `read` call returns. Bytes of a
/// chunk that do not fit the caller's buffer are kept and handed out by the
/// following reads before the service is asked for more.
pub struct ChunkedRemoteReader<'a, S: RemoteDataService + ?Sized> {
    handle: OpenHandle<'a, S>,
    pending: Vec<u8>,
    pos: usize,
    exhausted: bool,
    closed: bool,
}

impl<'a, S: RemoteDataService + ?Sized> ChunkedRemoteReader<'a, S> {
    pub fn new(handle: OpenHandle<'a, S>) -> Self {
        Self {
            handle,
            pending: Vec::new(),
            pos: 0,
            exhausted: false,
            closed: false,
        }
    }

    pub fn path(&self) -> &str {
        self.handle.path()
    }

    /// True once the service has reported end of file.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Copies the next bytes of the file into `buf`.
    ///
    /// Returns `None` at end of stream. After that, no further remote calls
    /// are made.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>, FsError> {
        if self.closed {
            return Err(FsError::UseAfterClose {
                path: self.path().to_string(),
            });
        }

        if self.pos < self.pending.len() {
            return Ok(Some(self.drain_pending(buf)));
        }
        if self.exhausted {
            return Ok(None);
        }
        if buf.is_empty() {
            return Ok(Some(0));
        }

        let chunk = self.handle.read()?;
        debug!(path = %self.path(), bytes = chunk.len(), "remote read");
        if chunk.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        self.pending = chunk;
        self.pos = 0;
        Ok(Some(self.drain_pending(buf)))
    }

    /// Closes the remote handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), FsError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending = Vec::new();
        self.pos = 0;
        self.handle.close()
    }

    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.pending[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        n
    }
}

impl<S: RemoteDataService + ?Sized> io::Read for ChunkedRemoteReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_chunk(buf)?.unwrap_or(0))
    }
}
