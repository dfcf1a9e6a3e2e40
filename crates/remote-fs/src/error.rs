use rhfs_protocol::ServiceError;

/// Errors produced by the remote file system.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// A remote call failed, either in transport or on the service side.
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: ServiceError,
    },

    #[error("expected exactly one entry at {path}, found {found}")]
    AmbiguousOrMissingPath { path: String, found: usize },

    #[error("{op} is not supported by the remote data service")]
    NotSupported { op: &'static str },

    #[error("stream for {path} is already closed")]
    UseAfterClose { path: String },
}

impl FsError {
    pub(crate) fn io(op: &'static str, path: &str, source: ServiceError) -> Self {
        Self::Io {
            op,
            path: path.to_string(),
            source,
        }
    }

    /// The operation is outside what the backing service can do.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }

    /// The failure came from the connection rather than the service.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.is_transport())
    }
}

impl From<FsError> for std::io::Error {
    fn from(err: FsError) -> Self {
        std::io::Error::other(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_operation_and_path() {
        let err = FsError::io("open", "/data/a.bam", ServiceError::remote("open", "denied"));
        assert_eq!(err.to_string(), "open /data/a.bam: open failed: denied");
        assert!(!err.is_transport());
    }

    #[test]
    fn not_supported_is_distinguishable() {
        let err = FsError::NotSupported { op: "rename" };
        assert!(err.is_not_supported());
        assert!(!FsError::UseAfterClose { path: "x".into() }.is_not_supported());
    }

    #[test]
    fn converts_into_io_error() {
        let err: std::io::Error = FsError::UseAfterClose { path: "x".into() }.into();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);
        assert!(err.to_string().contains("already closed"));
    }
}
