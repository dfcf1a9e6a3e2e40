//! Bounded-memory file transfer against the remote data service.
//!
//! [`TransferClient`] uploads and downloads whole files in fixed-size blocks
//! with progress callbacks, lists remote paths and deletes them. Local files
//! are never overwritten by a download.

mod client;
mod names;
mod progress;

use std::path::PathBuf;

use rhfs_remote_fs::FsError;

pub use client::{RemoveOutcome, TransferClient, format_status};
pub use names::{download_target, remote_base_name, remote_parent, upload_target};
pub use progress::{SpeedCalculator, TransferProgress, format_rate};

/// Default local block size: 1,000,000 bytes.
///
/// Two blocks fill one default remote write buffer.
pub const DEFAULT_BLOCK_SIZE: usize = 1_000_000;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("local file not found: {}", .0.display())]
    LocalFileNotFound(PathBuf),

    #[error("local file already exists: {}", .0.display())]
    ExistingLocalFile(PathBuf),

    #[error("{path} is not a single file ({entries} entries)")]
    AmbiguousOrNotAFile { path: String, entries: usize },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("{}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
