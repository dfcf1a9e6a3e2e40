//! The remote data service contract.
//!
//! Every call is authenticated by the [`AuthContext`] passed alongside it and
//! blocks until the service answers. Implementations exist for a TCP
//! connection and for an in-process store (see `rhfs-data-channel`).

use crate::types::{AuthContext, FileStatusRecord, Handle};

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Connection refused, reset, timed out, or the frame stream broke.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered with an error (missing path, permission, internal).
    #[error("{op} failed: {message}")]
    Remote { op: &'static str, message: String },
}

impl ServiceError {
    pub fn remote(op: &'static str, message: impl Into<String>) -> Self {
        Self::Remote {
            op,
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Stateful, chunked remote file service.
///
/// `read` returns at most one service-defined chunk per call; an empty
/// result means end of file.
pub trait RemoteDataService: Send + Sync {
    fn open(&self, path: &str, auth: &AuthContext) -> Result<Handle, ServiceError>;

    fn create(&self, path: &str, auth: &AuthContext) -> Result<Handle, ServiceError>;

    fn read(&self, handle: &Handle, auth: &AuthContext) -> Result<Vec<u8>, ServiceError>;

    fn write(&self, handle: &Handle, data: &[u8], auth: &AuthContext)
    -> Result<(), ServiceError>;

    fn close(&self, handle: &Handle, auth: &AuthContext) -> Result<(), ServiceError>;

    fn remove(&self, path: &str, recursive: bool, auth: &AuthContext)
    -> Result<bool, ServiceError>;

    fn mkdir(&self, path: &str, auth: &AuthContext) -> Result<bool, ServiceError>;

    fn list_status(
        &self,
        path: &str,
        auth: &AuthContext,
    ) -> Result<Vec<FileStatusRecord>, ServiceError>;
}

impl<S: RemoteDataService + ?Sized> RemoteDataService for std::sync::Arc<S> {
    fn open(&self, path: &str, auth: &AuthContext) -> Result<Handle, ServiceError> {
        (**self).open(path, auth)
    }

    fn create(&self, path: &str, auth: &AuthContext) -> Result<Handle, ServiceError> {
        (**self).create(path, auth)
    }

    fn read(&self, handle: &Handle, auth: &AuthContext) -> Result<Vec<u8>, ServiceError> {
        (**self).read(handle, auth)
    }

    fn write(
        &self,
        handle: &Handle,
        data: &[u8],
        auth: &AuthContext,
    ) -> Result<(), ServiceError> {
        (**self).write(handle, data, auth)
    }

    fn close(&self, handle: &Handle, auth: &AuthContext) -> Result<(), ServiceError> {
        (**self).close(handle, auth)
    }

    fn remove(
        &self,
        path: &str,
        recursive: bool,
        auth: &AuthContext,
    ) -> Result<bool, ServiceError> {
        (**self).remove(path, recursive, auth)
    }

    fn mkdir(&self, path: &str, auth: &AuthContext) -> Result<bool, ServiceError> {
        (**self).mkdir(path, auth)
    }

    fn list_status(
        &self,
        path: &str,
        auth: &AuthContext,
    ) -> Result<Vec<FileStatusRecord>, ServiceError> {
        (**self).list_status(path, auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_message_names_operation() {
        let err = ServiceError::remote("open", "File does not exist: /x");
        assert_eq!(err.to_string(), "open failed: File does not exist: /x");
        assert!(!err.is_transport());
    }

    #[test]
    fn transport_error_is_flagged() {
        let err = ServiceError::Transport("connection reset".into());
        assert!(err.is_transport());
        assert!(err.to_string().contains("connection reset"));
    }
}
