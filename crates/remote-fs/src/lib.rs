//! Generic file system access over the rhfs remote data service.
//!
//! A remote file is reached through a service-assigned handle. This crate
//! wraps that handle in [`OpenHandle`], which closes it exactly once, and
//! builds streams on top: [`BufferedRemoteWriter`] coalesces small writes
//! into large remote calls and [`ChunkedRemoteReader`] copies service chunks
//! into caller buffers. [`RemoteFileSystem`] puts both behind the
//! [`FileSystem`] trait.

mod error;
mod fs;
mod handle;
mod reader;
mod status;
mod writer;

pub use error::FsError;
pub use fs::{DEFAULT_URI, FileSystem, RemoteFileSystem};
pub use handle::OpenHandle;
pub use reader::ChunkedRemoteReader;
pub use status::{FileStatus, StatusCache};
pub use writer::{BufferedRemoteWriter, DEFAULT_WRITE_BUFFER};
