//! Scoped ownership of a remote file session.

use rhfs_protocol::{AuthContext, Handle, RemoteDataService};
use tracing::{info, warn};

use crate::error::FsError;

/// A live remote handle, closed exactly once.
///
/// Only [`open`](Self::open) and [`create`](Self::create) produce one. The
/// handle is closed by [`close`](Self::close) or, failing that, on drop.
pub struct OpenHandle<'a, S: RemoteDataService + ?Sized> {
    service: &'a S,
    auth: &'a AuthContext,
    path: String,
    handle: Option<Handle>,
}

impl<'a, S: RemoteDataService + ?Sized> OpenHandle<'a, S> {
    /// Opens an existing remote file for reading.
    pub fn open(service: &'a S, auth: &'a AuthContext, path: &str) -> Result<Self, FsError> {
        let handle = service
            .open(path, auth)
            .map_err(|e| FsError::io("open", path, e))?;
        info!(path, %handle, "remote file opened");
        Ok(Self::wrap(service, auth, path, handle))
    }

    /// Creates (or truncates) a remote file for writing.
    pub fn create(service: &'a S, auth: &'a AuthContext, path: &str) -> Result<Self, FsError> {
        let handle = service
            .create(path, auth)
            .map_err(|e| FsError::io("create", path, e))?;
        info!(path, %handle, "remote file created");
        Ok(Self::wrap(service, auth, path, handle))
    }

    fn wrap(service: &'a S, auth: &'a AuthContext, path: &str, handle: Handle) -> Self {
        Self {
            service,
            auth,
            path: path.to_string(),
            handle: Some(handle),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Reads the next chunk; empty means end of file.
    pub(crate) fn read(&self) -> Result<Vec<u8>, FsError> {
        let handle = self.live()?;
        self.service
            .read(handle, self.auth)
            .map_err(|e| FsError::io("read", &self.path, e))
    }

    pub(crate) fn write(&self, data: &[u8]) -> Result<(), FsError> {
        let handle = self.live()?;
        self.service
            .write(handle, data, self.auth)
            .map_err(|e| FsError::io("write", &self.path, e))
    }

    /// Closes the remote session. Later calls are no-ops.
    ///
    /// The handle counts as released even if the service reports an error.
    pub fn close(&mut self) -> Result<(), FsError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.service
            .close(&handle, self.auth)
            .map_err(|e| FsError::io("close", &self.path, e))?;
        info!(path = %self.path, %handle, "remote file closed");
        Ok(())
    }

    fn live(&self) -> Result<&Handle, FsError> {
        self.handle.as_ref().ok_or_else(|| FsError::UseAfterClose {
            path: self.path.clone(),
        })
    }
}

impl<S: RemoteDataService + ?Sized> Drop for OpenHandle<'_, S> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        warn!(path = %self.path, %handle, "remote handle released on drop");
        if let Err(e) = self.service.close(&handle, self.auth) {
            warn!(path = %self.path, %handle, error = %e, "failed to close remote handle");
        }
    }
}
