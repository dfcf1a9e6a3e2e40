//! The generic file system interface and its remote implementation.

use std::io;
use std::sync::{Mutex, MutexGuard};

use rhfs_protocol::{AuthContext, RemoteDataService, ServiceError};
use tracing::debug;

use crate::error::FsError;
use crate::handle::OpenHandle;
use crate::reader::ChunkedRemoteReader;
use crate::status::{FileStatus, StatusCache};
use crate::writer::{BufferedRemoteWriter, DEFAULT_WRITE_BUFFER};

/// URI reported by a [`RemoteFileSystem`] built without one.
pub const DEFAULT_URI: &str = "rhfs://";

/// Hierarchical storage as seen by record readers and writers.
///
/// Streams borrow the file system that opened them and release their remote
/// resources when closed or dropped.
pub trait FileSystem {
    type Reader<'a>: io::Read
    where
        Self: 'a;
    type Writer<'a>: io::Write
    where
        Self: 'a;

    /// Identifies the storage this instance talks to.
    fn uri(&self) -> &str;

    /// Status of a single path. Fails unless exactly one entry is found.
    fn status(&self, path: &str) -> Result<FileStatus, FsError>;

    /// The entry for a file, or the children of a directory.
    fn list_status(&self, path: &str) -> Result<Vec<FileStatus>, FsError>;

    fn open(&self, path: &str) -> Result<Self::Reader<'_>, FsError>;

    /// Creates or truncates `path`. Existing files are not protected.
    fn create(&self, path: &str) -> Result<Self::Writer<'_>, FsError>;

    fn append(&self, path: &str) -> Result<Self::Writer<'_>, FsError>;

    fn rename(&self, from: &str, to: &str) -> Result<bool, FsError>;

    fn delete(&self, path: &str, recursive: bool) -> Result<bool, FsError>;

    fn mkdirs(&self, path: &str) -> Result<bool, FsError>;

    fn delete_path(&self, path: &str) -> Result<bool, FsError> {
        self.delete(path, false)
    }

    fn exists(&self, path: &str) -> Result<bool, FsError>;
}

/// [`FileSystem`] backed by a [`RemoteDataService`].
///
/// Every remote call carries the credentials given at construction.
/// Listing snapshots are only cached when
/// [`with_status_cache`](Self::with_status_cache) is used.
pub struct RemoteFileSystem<S> {
    service: S,
    auth: AuthContext,
    uri: String,
    write_buffer: usize,
    cache: Option<Mutex<StatusCache>>,
}

impl<S: RemoteDataService> RemoteFileSystem<S> {
    pub fn new(service: S, auth: AuthContext) -> Self {
        Self {
            service,
            auth,
            uri: DEFAULT_URI.to_string(),
            write_buffer: DEFAULT_WRITE_BUFFER,
            cache: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Buffer capacity for writers returned by [`FileSystem::create`].
    pub fn with_write_buffer(mut self, capacity: usize) -> Self {
        self.write_buffer = capacity;
        self
    }

    /// Keeps listing snapshots. `create`, `delete` and `mkdirs` clear them,
    /// as does closing or dropping a writer from `create`.
    pub fn with_status_cache(mut self) -> Self {
        self.cache = Some(Mutex::new(StatusCache::new()));
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Drops every cached snapshot.
    pub fn invalidate_status_cache(&self) {
        if let Some(mut cache) = self.cache() {
            cache.clear();
        }
    }

    fn cache(&self) -> Option<MutexGuard<'_, StatusCache>> {
        self.cache
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn fetch_statuses(&self, path: &str) -> Result<Vec<FileStatus>, ServiceError> {
        let records = self.service.list_status(path, &self.auth)?;
        debug!(path, entries = records.len(), "list_status");
        Ok(records.into_iter().map(FileStatus::from).collect())
    }
}

impl<S: RemoteDataService> FileSystem for RemoteFileSystem<S> {
    type Reader<'a>
        = ChunkedRemoteReader<'a, S>
    where
        Self: 'a;
    type Writer<'a>
        = BufferedRemoteWriter<'a, S>
    where
        Self: 'a;

    fn uri(&self) -> &str {
        &self.uri
    }

    fn status(&self, path: &str) -> Result<FileStatus, FsError> {
        let mut statuses = self.list_status(path)?;
        if statuses.len() != 1 {
            return Err(FsError::AmbiguousOrMissingPath {
                path: path.to_string(),
                found: statuses.len(),
            });
        }
        Ok(statuses.remove(0))
    }

    fn list_status(&self, path: &str) -> Result<Vec<FileStatus>, FsError> {
        if let Some(cache) = self.cache() {
            if let Some(hit) = cache.get(path) {
                debug!(path, "list_status served from cache");
                return Ok(hit.to_vec());
            }
        }

        let statuses = self
            .fetch_statuses(path)
            .map_err(|e| FsError::io("list_status", path, e))?;
        if let Some(mut cache) = self.cache() {
            cache.insert(path, statuses.clone());
        }
        Ok(statuses)
    }

    fn open(&self, path: &str) -> Result<Self::Reader<'_>, FsError> {
        let handle = OpenHandle::open(&self.service, &self.auth, path)?;
        Ok(ChunkedRemoteReader::new(handle))
    }

    fn create(&self, path: &str) -> Result<Self::Writer<'_>, FsError> {
        self.invalidate_status_cache();
        let handle = OpenHandle::create(&self.service, &self.auth, path)?;
        Ok(BufferedRemoteWriter::with_capacity(handle, self.write_buffer)
            .invalidating(self.cache.as_ref()))
    }

    fn append(&self, _path: &str) -> Result<Self::Writer<'_>, FsError> {
        Err(FsError::NotSupported { op: "append" })
    }

    fn rename(&self, _from: &str, _to: &str) -> Result<bool, FsError> {
        Err(FsError::NotSupported { op: "rename" })
    }

    fn delete(&self, path: &str, recursive: bool) -> Result<bool, FsError> {
        self.invalidate_status_cache();
        self.service
            .remove(path, recursive, &self.auth)
            .map_err(|e| FsError::io("delete", path, e))
    }

    fn mkdirs(&self, path: &str) -> Result<bool, FsError> {
        self.invalidate_status_cache();
        self.service
            .mkdir(path, &self.auth)
            .map_err(|e| FsError::io("mkdirs", path, e))
    }

    /// A service-reported failure (missing path, permission) means `false`;
    /// transport failures are errors.
    fn exists(&self, path: &str) -> Result<bool, FsError> {
        match self.list_status(path) {
            Ok(statuses) => Ok(!statuses.is_empty()),
            Err(FsError::Io {
                source: ServiceError::Remote { .. },
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhfs_data_channel::MemoryDataService;
    use std::io::{Read, Write};
    use std::sync::Arc;

    fn auth() -> AuthContext {
        AuthContext::new("james", "secret")
    }

    fn remote_fs() -> (Arc<MemoryDataService>, RemoteFileSystem<Arc<MemoryDataService>>) {
        let service = Arc::new(MemoryDataService::new());
        let fs = RemoteFileSystem::new(Arc::clone(&service), auth());
        (service, fs)
    }

    #[test]
    fn create_then_open_roundtrip() {
        let (_, fs) = remote_fs();
        let mut writer = fs.create("reads/r1.fq").unwrap();
        writer.write_all(b"@r1\nACGT\n+\nIIII\n").unwrap();
        writer.close().unwrap();

        let mut reader = fs.open("reads/r1.fq").unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        reader.close().unwrap();
        assert_eq!(out, "@r1\nACGT\n+\nIIII\n");
    }

    #[test]
    fn list_status_maps_every_record() {
        let (service, fs) = remote_fs();
        for name in ["a.bam", "b.bam", "c.bam"] {
            service.put_file(&format!("run/{name}"), "james", b"xx");
        }

        let remote = service.list_status("run", &auth()).unwrap();
        let statuses = fs.list_status("run").unwrap();
        assert_eq!(statuses.len(), 3);
        for (status, record) in statuses.iter().zip(remote) {
            assert_eq!(*status, FileStatus::from(record));
        }
    }

    #[test]
    fn status_requires_exactly_one_entry() {
        let (service, fs) = remote_fs();
        service.put_file("run/a.bam", "james", b"abc");
        service.put_file("run/b.bam", "james", b"abc");

        let status = fs.status("run/a.bam").unwrap();
        assert_eq!(status.length, 3);
        assert!(!status.is_dir);

        assert!(matches!(
            fs.status("run"),
            Err(FsError::AmbiguousOrMissingPath { found: 2, .. })
        ));
        fs.mkdirs("empty").unwrap();
        assert!(matches!(
            fs.status("empty"),
            Err(FsError::AmbiguousOrMissingPath { found: 0, .. })
        ));
    }

    #[test]
    fn append_and_rename_fail_fast() {
        let (service, fs) = remote_fs();
        service.reset_calls();

        let err = fs.append("x").err().unwrap();
        assert!(err.is_not_supported());
        let err = fs.rename("x", "y").unwrap_err();
        assert!(err.is_not_supported());
        assert_eq!(service.calls().total(), 0);
    }

    #[test]
    fn delete_and_mkdirs_pass_through() {
        let (service, fs) = remote_fs();
        assert!(fs.mkdirs("a/b/c").unwrap());
        assert!(service.exists("a/b/c", "james"));

        assert!(fs.delete("a", true).unwrap());
        assert!(!fs.delete_path("a").unwrap());
        assert!(!service.exists("a", "james"));
    }

    #[test]
    fn remote_failures_carry_op_and_path() {
        let (service, fs) = remote_fs();
        service.deny_path("locked", "james");

        match fs.mkdirs("locked").unwrap_err() {
            FsError::Io { op, path, source } => {
                assert_eq!(op, "mkdirs");
                assert_eq!(path, "locked");
                assert!(!source.is_transport());
            }
            other => panic!("expected Io, got {other:?}"),
        }
        assert!(fs.open("nowhere").is_err());
    }

    #[test]
    fn exists_reports_missing_as_false() {
        let (service, fs) = remote_fs();
        service.put_file("present.txt", "james", b"1");
        assert!(fs.exists("present.txt").unwrap());
        assert!(!fs.exists("absent.txt").unwrap());
    }

    #[test]
    fn uri_defaults_and_overrides() {
        let (_, fs) = remote_fs();
        assert_eq!(fs.uri(), DEFAULT_URI);
        let fs = fs.with_uri("rhfs://10.0.0.5:9091");
        assert_eq!(fs.uri(), "rhfs://10.0.0.5:9091");
    }

    #[test]
    fn writer_uses_configured_buffer() {
        let service = Arc::new(MemoryDataService::new());
        let fs = RemoteFileSystem::new(Arc::clone(&service), auth()).with_write_buffer(4);
        let mut writer = fs.create("out").unwrap();
        for _ in 0..5 {
            writer.write_all(b"ab").unwrap();
        }
        writer.close().unwrap();
        assert_eq!(service.calls().writes, vec![4, 4, 2]);
    }

    #[test]
    fn status_cache_serves_repeats_until_mutation() {
        let service = Arc::new(MemoryDataService::new());
        let fs = RemoteFileSystem::new(Arc::clone(&service), auth()).with_status_cache();
        service.put_file("d/one", "james", b"1");

        assert_eq!(fs.list_status("d").unwrap().len(), 1);
        assert_eq!(fs.list_status("d").unwrap().len(), 1);
        assert_eq!(service.calls().list_status, 1);

        let mut writer = fs.create("d/two").unwrap();
        writer.close().unwrap();
        assert_eq!(fs.list_status("d").unwrap().len(), 2);
        assert_eq!(service.calls().list_status, 2);

        fs.invalidate_status_cache();
        fs.list_status("d").unwrap();
        assert_eq!(service.calls().list_status, 3);
    }

    #[test]
    fn closing_a_writer_refreshes_cached_lengths() {
        let service = Arc::new(MemoryDataService::new());
        let fs = RemoteFileSystem::new(Arc::clone(&service), auth()).with_status_cache();

        let mut writer = fs.create("d/grow").unwrap();
        assert_eq!(fs.status("d/grow").unwrap().length, 0);
        writer.write_all(b"ACGT").unwrap();
        writer.close().unwrap();
        assert_eq!(fs.status("d/grow").unwrap().length, 4);

        let mut writer = fs.create("d/dropped").unwrap();
        assert_eq!(fs.status("d/dropped").unwrap().length, 0);
        writer.write_all(b"AC").unwrap();
        drop(writer);
        assert_eq!(fs.status("d/dropped").unwrap().length, 2);
    }

    #[test]
    fn uncached_file_system_always_asks_the_service() {
        let (service, fs) = remote_fs();
        fs.list_status(".").unwrap();
        fs.list_status(".").unwrap();
        assert_eq!(service.calls().list_status, 2);
    }
}
