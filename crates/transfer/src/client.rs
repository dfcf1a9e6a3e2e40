use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use rhfs_protocol::{AuthContext, RemoteDataService};
use rhfs_remote_fs::{
    BufferedRemoteWriter, ChunkedRemoteReader, DEFAULT_WRITE_BUFFER, FileStatus, FsError,
    OpenHandle,
};
use tracing::{info, warn};

use crate::names::{download_target, remote_base_name, remote_parent, upload_target};
use crate::progress::TransferProgress;
use crate::{DEFAULT_BLOCK_SIZE, TransferError};

/// Result of deleting one path.
#[derive(Debug)]
pub struct RemoveOutcome {
    pub path: String,
    pub result: Result<bool, FsError>,
}

impl RemoveOutcome {
    /// The service confirmed the deletion.
    pub fn deleted(&self) -> bool {
        matches!(self.result, Ok(true))
    }
}

/// Uploads, downloads, lists and deletes against a remote data service.
///
/// Files are streamed in fixed-size blocks; memory use does not depend on
/// file size.
pub struct TransferClient<S> {
    service: S,
    auth: AuthContext,
    write_buffer: usize,
    block_size: usize,
}

impl<S: RemoteDataService> TransferClient<S> {
    pub fn new(service: S, auth: AuthContext) -> Self {
        Self {
            service,
            auth,
            write_buffer: DEFAULT_WRITE_BUFFER,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Capacity of the remote write buffer used by `put`.
    pub fn with_write_buffer(mut self, capacity: usize) -> Self {
        self.write_buffer = capacity;
        self
    }

    /// Size of the blocks read from the local file by `put` and requested
    /// per local write by `get`. A size of 0 is treated as 1.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Gives back the service, e.g. to shut its connection down.
    pub fn into_service(self) -> S {
        self.service
    }

    /// Uploads `local` and returns the remote path written.
    ///
    /// Without `remote` (or with `"."`) the local file name is used. A
    /// failure part way leaves a truncated remote file.
    pub fn put(
        &self,
        local: &Path,
        remote: Option<&str>,
        mut progress: impl FnMut(TransferProgress),
    ) -> Result<String, TransferError> {
        if !local.is_file() {
            return Err(TransferError::LocalFileNotFound(local.to_path_buf()));
        }
        let target = upload_target(local, remote)?;

        let mut file = File::open(local).map_err(|e| local_io(local, e))?;
        let total = file.metadata().map_err(|e| local_io(local, e))?.len();
        info!(local = %local.display(), remote = %target, bytes = total, "put");

        let handle = OpenHandle::create(&self.service, &self.auth, &target)?;
        let mut writer = BufferedRemoteWriter::with_capacity(handle, self.write_buffer);

        let mut block = vec![0u8; self.block_size];
        let mut transferred = 0u64;
        loop {
            let n = fill_block(&mut file, &mut block).map_err(|e| local_io(local, e))?;
            if n == 0 {
                break;
            }
            writer.write_bytes(&block[..n])?;
            transferred += n as u64;
            progress(TransferProgress::new(transferred, total));
        }
        writer.close()?;

        if total == 0 {
            progress(TransferProgress::new(0, 0));
        }
        Ok(target)
    }

    /// Downloads the single file at `remote` and returns the local path
    /// written.
    ///
    /// Without `local` the remote base name is used in the working
    /// directory. An existing local file is never overwritten.
    pub fn get(
        &self,
        remote: &str,
        local: Option<&Path>,
        mut progress: impl FnMut(TransferProgress),
    ) -> Result<PathBuf, TransferError> {
        let status = self.single_file(remote)?;
        let target = download_target(remote, local)?;
        info!(remote, local = %target.display(), bytes = status.length, "get");

        let handle = OpenHandle::open(&self.service, &self.auth, remote)?;
        let mut reader = ChunkedRemoteReader::new(handle);

        let mut file = match create_new(&target) {
            Ok(file) => file,
            Err(e) => {
                if let Err(close_err) = reader.close() {
                    warn!(remote, error = %close_err, "failed to close remote file");
                }
                return Err(e);
            }
        };

        let total = status.length;
        let mut block = vec![0u8; self.block_size];
        let mut transferred = 0u64;
        while let Some(n) = reader.read_chunk(&mut block)? {
            file.write_all(&block[..n])
                .map_err(|e| local_io(&target, e))?;
            transferred += n as u64;
            progress(TransferProgress::new(transferred, total));
        }
        reader.close()?;
        file.flush().map_err(|e| local_io(&target, e))?;

        if transferred == 0 {
            progress(TransferProgress::new(0, total));
        }
        Ok(target)
    }

    /// Lists a directory's children, or the entry for a file.
    pub fn ls(&self, path: &str) -> Result<Vec<FileStatus>, TransferError> {
        let records = self
            .service
            .list_status(path, &self.auth)
            .map_err(|e| FsError::Io {
                op: "list_status",
                path: path.to_string(),
                source: e,
            })?;
        Ok(records.into_iter().map(FileStatus::from).collect())
    }

    /// Deletes each path independently; a failure does not stop the rest.
    pub fn rm(&self, paths: &[String], recursive: bool) -> Vec<RemoveOutcome> {
        paths
            .iter()
            .map(|path| {
                let result = self
                    .service
                    .remove(path, recursive, &self.auth)
                    .map_err(|e| FsError::Io {
                        op: "delete",
                        path: path.clone(),
                        source: e,
                    });
                if let Err(e) = &result {
                    warn!(path = %path, error = %e, "delete failed");
                }
                RemoveOutcome {
                    path: path.clone(),
                    result,
                }
            })
            .collect()
    }

    /// Status of `remote`, which must be exactly one plain file named like
    /// the requested path.
    ///
    /// A directory holding a single same-named file lists exactly like that
    /// file, so the entry is confirmed in the parent's listing as well.
    fn single_file(&self, remote: &str) -> Result<FileStatus, TransferError> {
        let mut entries = self.ls(remote)?;
        let wanted = remote_base_name(remote);
        let mut is_that_file = entries.len() == 1
            && !entries[0].is_dir
            && remote_base_name(&entries[0].path) == wanted;
        if is_that_file {
            let found = &entries[0].path;
            is_that_file = self
                .ls(remote_parent(remote))?
                .iter()
                .any(|sibling| !sibling.is_dir && sibling.path == *found);
        }
        if !is_that_file {
            return Err(TransferError::AmbiguousOrNotAFile {
                path: remote.to_string(),
                entries: entries.len(),
            });
        }
        Ok(entries.remove(0))
    }
}

/// One `ls` line: permission, replication, owner, group, length, path.
pub fn format_status(status: &FileStatus) -> String {
    format!(
        "{}\t{:>2}\t{}\t{}\t{:>14}\t{}",
        status.permission,
        status.replication,
        status.owner,
        status.group,
        status.length,
        status.path
    )
}

/// Reads until `buf` is full or the reader is exhausted.
fn fill_block(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn create_new(path: &Path) -> Result<File, TransferError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => TransferError::ExistingLocalFile(path.to_path_buf()),
            _ => local_io(path, e),
        })
}

fn local_io(path: &Path, source: io::Error) -> TransferError {
    TransferError::LocalIo {
        path: path.to_path_buf(),
        source,
    }
}
