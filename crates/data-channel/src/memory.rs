//! In-process implementation of the data service.
//!
//! Backs local development and tests. Mirrors the behaviour of the
//! production service closely enough that the adapter and transfer code can
//! be exercised without a network: per-user home directories, chunked reads,
//! handle sessions, and remote-side failures for missing paths and denied
//! mutations. Every call is counted so tests can assert on round trips.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use rhfs_protocol::{AuthContext, FileStatusRecord, Handle, RemoteDataService, ServiceError};
use tracing::debug;

/// Default read chunk size, matching the production service buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 2_000_000;

const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;
const DEFAULT_REPLICATION: u16 = 3;
const DEFAULT_GROUP: &str = "supergroup";

/// Number of calls received per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    pub open: usize,
    pub create: usize,
    pub read: usize,
    /// Byte length of every write call, in arrival order.
    pub writes: Vec<usize>,
    pub close: usize,
    pub remove: usize,
    pub mkdir: usize,
    pub list_status: usize,
}

impl CallStats {
    /// Total number of calls of any kind.
    pub fn total(&self) -> usize {
        self.open
            + self.create
            + self.read
            + self.writes.len()
            + self.close
            + self.remove
            + self.mkdir
            + self.list_status
    }
}

#[derive(Debug)]
enum Node {
    File {
        data: Vec<u8>,
        owner: String,
        mod_time: u64,
    },
    Dir {
        owner: String,
        mod_time: u64,
    },
}

#[derive(Debug)]
enum Session {
    Reader { path: String, pos: usize },
    Writer { path: String },
}

#[derive(Debug, Default)]
struct Store {
    nodes: BTreeMap<String, Node>,
    sessions: HashMap<String, Session>,
    denied: HashSet<String>,
    /// Remaining successful writes before every write fails.
    write_allowance: Option<usize>,
    read_allowance: Option<usize>,
    calls: CallStats,
}

/// Thread-safe in-memory data service.
#[derive(Debug)]
pub struct MemoryDataService {
    store: Mutex<Store>,
    chunk_size: usize,
    credential: Option<AuthContext>,
}

impl Default for MemoryDataService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDataService {
    pub fn new() -> Self {
        let mut store = Store::default();
        store.nodes.insert(
            "/".into(),
            Node::Dir {
                owner: "root".into(),
                mod_time: now_millis(),
            },
        );
        Self {
            store: Mutex::new(store),
            chunk_size: DEFAULT_CHUNK_SIZE,
            credential: None,
        }
    }

    /// Sets the maximum number of bytes returned by one `read` call.
    ///
    /// A size of 0 is treated as 1.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Only accept calls carrying exactly this username and credential.
    pub fn with_credential(mut self, auth: AuthContext) -> Self {
        self.credential = Some(auth);
        self
    }

    /// Makes every mutation of `path` (create, remove, mkdir) fail with a
    /// permission error. Relative paths resolve against the user's home.
    pub fn deny_path(&self, path: &str, username: &str) {
        let resolved = resolve(path, username);
        self.lock().denied.insert(resolved);
    }

    /// Lets `n` more writes succeed, then fails every write with a remote
    /// error.
    pub fn fail_after_writes(&self, n: usize) {
        self.lock().write_allowance = Some(n);
    }

    /// Lets `n` more reads succeed, then fails every read with a remote
    /// error.
    pub fn fail_after_reads(&self, n: usize) {
        self.lock().read_allowance = Some(n);
    }

    /// Seeds a file without counting any calls.
    pub fn put_file(&self, path: &str, username: &str, data: &[u8]) {
        let resolved = resolve(path, username);
        let mut store = self.lock();
        store.ensure_dirs(parent(&resolved), username);
        store.nodes.insert(
            resolved,
            Node::File {
                data: data.to_vec(),
                owner: username.into(),
                mod_time: now_millis(),
            },
        );
    }

    /// Returns the bytes stored at `path`, if it is a file.
    pub fn file_contents(&self, path: &str, username: &str) -> Option<Vec<u8>> {
        let resolved = resolve(path, username);
        match self.lock().nodes.get(&resolved) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Returns `true` if anything exists at `path`.
    pub fn exists(&self, path: &str, username: &str) -> bool {
        let resolved = resolve(path, username);
        self.lock().nodes.contains_key(&resolved)
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> CallStats {
        self.lock().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.lock().calls = CallStats::default();
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.lock().sessions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // A panic while holding the lock cannot leave the tree half-updated
        // in a way later calls care about, so recover the guard.
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn authorize(&self, op: &'static str, auth: &AuthContext) -> Result<(), ServiceError> {
        match &self.credential {
            Some(expected) if expected != auth => {
                Err(ServiceError::remote(op, "Permission Denied"))
            }
            _ => Ok(()),
        }
    }
}

impl Store {
    fn ensure_dirs(&mut self, dir: &str, owner: &str) {
        let mut current = String::new();
        for part in dir.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            self.nodes.entry(current.clone()).or_insert_with(|| Node::Dir {
                owner: owner.into(),
                mod_time: now_millis(),
            });
        }
    }

    fn ensure_home(&mut self, username: &str) {
        let home = home_dir(username);
        self.ensure_dirs(&home, username);
    }

    fn check_denied(&self, op: &'static str, path: &str) -> Result<(), ServiceError> {
        if self.denied.contains(path) {
            return Err(ServiceError::remote(
                op,
                format!("Permission denied: {path}"),
            ));
        }
        Ok(())
    }

    fn take_allowance(
        allowance: &mut Option<usize>,
        op: &'static str,
        path: &str,
    ) -> Result<(), ServiceError> {
        match allowance {
            Some(0) => Err(ServiceError::remote(op, format!("I/O error on {path}"))),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn status_of(&self, path: &str) -> Option<FileStatusRecord> {
        let node = self.nodes.get(path)?;
        let record = match node {
            Node::File {
                data,
                owner,
                mod_time,
            } => FileStatusRecord {
                is_dir: false,
                path: path.to_string(),
                owner: owner.clone(),
                group: DEFAULT_GROUP.into(),
                permission: "rw-r--r--".into(),
                replication: DEFAULT_REPLICATION,
                mod_time: *mod_time,
                block_size: DEFAULT_BLOCK_SIZE,
                length: data.len() as u64,
            },
            Node::Dir { owner, mod_time } => FileStatusRecord {
                is_dir: true,
                path: path.to_string(),
                owner: owner.clone(),
                group: DEFAULT_GROUP.into(),
                permission: "rwxr-xr-x".into(),
                replication: 0,
                mod_time: *mod_time,
                block_size: 0,
                length: 0,
            },
        };
        Some(record)
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(&prefix))
            .filter(|k| k.len() > prefix.len() && !k[prefix.len()..].contains('/'))
            .cloned()
            .collect()
    }

    fn descendants(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{dir}/");
        self.nodes
            .range(prefix.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

impl RemoteDataService for MemoryDataService {
    fn open(&self, path: &str, auth: &AuthContext) -> Result<Handle, ServiceError> {
        self.lock().calls.open += 1;
        self.authorize("open", auth)?;

        let resolved = resolve(path, &auth.username);
        let mut store = self.lock();
        store.ensure_home(&auth.username);
        match store.nodes.get(&resolved) {
            Some(Node::File { .. }) => {}
            Some(Node::Dir { .. }) => {
                return Err(ServiceError::remote(
                    "open",
                    format!("{resolved} is a directory"),
                ));
            }
            None => {
                return Err(ServiceError::remote(
                    "open",
                    format!("File does not exist: {resolved}"),
                ));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        debug!(path = %resolved, handle = %id, "memory service: opened");
        store.sessions.insert(
            id.clone(),
            Session::Reader {
                path: resolved,
                pos: 0,
            },
        );
        Ok(Handle::new(id))
    }

    fn create(&self, path: &str, auth: &AuthContext) -> Result<Handle, ServiceError> {
        self.lock().calls.create += 1;
        self.authorize("create", auth)?;

        let resolved = resolve(path, &auth.username);
        let mut store = self.lock();
        store.ensure_home(&auth.username);
        store.check_denied("create", &resolved)?;
        if let Some(Node::Dir { .. }) = store.nodes.get(&resolved) {
            return Err(ServiceError::remote(
                "create",
                format!("{resolved} already exists as a directory"),
            ));
        }

        store.ensure_dirs(parent(&resolved), &auth.username);
        store.nodes.insert(
            resolved.clone(),
            Node::File {
                data: Vec::new(),
                owner: auth.username.clone(),
                mod_time: now_millis(),
            },
        );

        let id = uuid::Uuid::new_v4().to_string();
        debug!(path = %resolved, handle = %id, "memory service: created");
        store
            .sessions
            .insert(id.clone(), Session::Writer { path: resolved });
        Ok(Handle::new(id))
    }

    fn read(&self, handle: &Handle, auth: &AuthContext) -> Result<Vec<u8>, ServiceError> {
        self.lock().calls.read += 1;
        self.authorize("read", auth)?;

        let chunk_size = self.chunk_size;
        let mut guard = self.lock();
        let store = &mut *guard;
        let (path, pos) = match store.sessions.get_mut(handle.id()) {
            Some(Session::Reader { path, pos }) => (path.clone(), pos),
            Some(Session::Writer { .. }) => {
                return Err(ServiceError::remote(
                    "read",
                    format!("handle {handle} is not open for reading"),
                ));
            }
            None => {
                return Err(ServiceError::remote(
                    "read",
                    format!("unknown handle {handle}"),
                ));
            }
        };

        Store::take_allowance(&mut store.read_allowance, "read", &path)?;
        let Some(Node::File { data, .. }) = store.nodes.get(&path) else {
            return Err(ServiceError::remote(
                "read",
                format!("File does not exist: {path}"),
            ));
        };

        let start = (*pos).min(data.len());
        let end = (start + chunk_size).min(data.len());
        *pos = end;
        Ok(data[start..end].to_vec())
    }

    fn write(
        &self,
        handle: &Handle,
        data: &[u8],
        auth: &AuthContext,
    ) -> Result<(), ServiceError> {
        self.lock().calls.writes.push(data.len());
        self.authorize("write", auth)?;

        let mut guard = self.lock();
        let store = &mut *guard;
        let path = match store.sessions.get(handle.id()) {
            Some(Session::Writer { path }) => path.clone(),
            Some(Session::Reader { .. }) => {
                return Err(ServiceError::remote(
                    "write",
                    format!("handle {handle} is not open for writing"),
                ));
            }
            None => {
                return Err(ServiceError::remote(
                    "write",
                    format!("unknown handle {handle}"),
                ));
            }
        };

        Store::take_allowance(&mut store.write_allowance, "write", &path)?;
        match store.nodes.get_mut(&path) {
            Some(Node::File {
                data: contents,
                mod_time,
                ..
            }) => {
                contents.extend_from_slice(data);
                *mod_time = now_millis();
                Ok(())
            }
            _ => Err(ServiceError::remote(
                "write",
                format!("File does not exist: {path}"),
            )),
        }
    }

    fn close(&self, handle: &Handle, auth: &AuthContext) -> Result<(), ServiceError> {
        self.lock().calls.close += 1;
        self.authorize("close", auth)?;

        match self.lock().sessions.remove(handle.id()) {
            Some(_) => {
                debug!(handle = %handle, "memory service: closed");
                Ok(())
            }
            None => Err(ServiceError::remote(
                "close",
                format!("unknown handle {handle}"),
            )),
        }
    }

    fn remove(
        &self,
        path: &str,
        recursive: bool,
        auth: &AuthContext,
    ) -> Result<bool, ServiceError> {
        self.lock().calls.remove += 1;
        self.authorize("remove", auth)?;

        let resolved = resolve(path, &auth.username);
        let mut store = self.lock();
        store.ensure_home(&auth.username);
        store.check_denied("remove", &resolved)?;

        match store.nodes.get(&resolved) {
            None => return Ok(false),
            Some(Node::File { .. }) => {}
            Some(Node::Dir { .. }) => {
                let descendants = store.descendants(&resolved);
                if !descendants.is_empty() && !recursive {
                    return Err(ServiceError::remote(
                        "remove",
                        format!("{resolved} is non empty"),
                    ));
                }
                for key in descendants {
                    store.nodes.remove(&key);
                }
            }
        }
        store.nodes.remove(&resolved);
        Ok(true)
    }

    fn mkdir(&self, path: &str, auth: &AuthContext) -> Result<bool, ServiceError> {
        self.lock().calls.mkdir += 1;
        self.authorize("mkdir", auth)?;

        let resolved = resolve(path, &auth.username);
        let mut store = self.lock();
        store.ensure_home(&auth.username);
        store.check_denied("mkdir", &resolved)?;
        if let Some(Node::File { .. }) = store.nodes.get(&resolved) {
            return Err(ServiceError::remote(
                "mkdir",
                format!("{resolved} exists as a file"),
            ));
        }
        store.ensure_dirs(&resolved, &auth.username);
        Ok(true)
    }

    fn list_status(
        &self,
        path: &str,
        auth: &AuthContext,
    ) -> Result<Vec<FileStatusRecord>, ServiceError> {
        self.lock().calls.list_status += 1;
        self.authorize("list_status", auth)?;

        let resolved = resolve(path, &auth.username);
        let mut store = self.lock();
        store.ensure_home(&auth.username);
        match store.nodes.get(&resolved) {
            None => Err(ServiceError::remote(
                "list_status",
                format!("File {resolved} does not exist."),
            )),
            Some(Node::File { .. }) => Ok(store.status_of(&resolved).into_iter().collect()),
            Some(Node::Dir { .. }) => Ok(store
                .children(&resolved)
                .iter()
                .filter_map(|child| store.status_of(child))
                .collect()),
        }
    }
}

fn home_dir(username: &str) -> String {
    format!("/user/{username}")
}

/// Resolves `path` to a normalised absolute path; relative paths are taken
/// from the user's home directory.
fn resolve(path: &str, username: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{path}", home_dir(username))
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthContext {
        AuthContext::new("james", "secret")
    }

    #[test]
    fn resolve_relative_and_absolute() {
        assert_eq!(resolve(".", "james"), "/user/james");
        assert_eq!(resolve("", "james"), "/user/james");
        assert_eq!(resolve("reads.fq", "james"), "/user/james/reads.fq");
        assert_eq!(resolve("/tmp/../data//x", "james"), "/data/x");
        assert_eq!(resolve("/", "james"), "/");
    }

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent("/user/james/x"), "/user/james");
        assert_eq!(parent("/x"), "/");
        assert_eq!(parent("/"), "/");
    }

    #[test]
    fn create_write_read_roundtrip() {
        let svc = MemoryDataService::new().with_chunk_size(4);
        let h = svc.create("data/out.bin", &auth()).unwrap();
        svc.write(&h, b"hello ", &auth()).unwrap();
        svc.write(&h, b"world", &auth()).unwrap();
        svc.close(&h, &auth()).unwrap();

        let h = svc.open("data/out.bin", &auth()).unwrap();
        let mut out = Vec::new();
        loop {
            let chunk = svc.read(&h, &auth()).unwrap();
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= 4);
            out.extend_from_slice(&chunk);
        }
        svc.close(&h, &auth()).unwrap();

        assert_eq!(out, b"hello world");
        assert_eq!(svc.calls().writes, vec![6, 5]);
        assert_eq!(svc.open_handles(), 0);
    }

    #[test]
    fn open_missing_file_fails_remotely() {
        let svc = MemoryDataService::new();
        let err = svc.open("nope", &auth()).unwrap_err();
        assert!(!err.is_transport());
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn open_directory_fails() {
        let svc = MemoryDataService::new();
        svc.mkdir("d", &auth()).unwrap();
        assert!(svc.open("d", &auth()).is_err());
    }

    #[test]
    fn close_twice_fails_remotely() {
        let svc = MemoryDataService::new();
        let h = svc.create("x", &auth()).unwrap();
        svc.close(&h, &auth()).unwrap();
        assert!(svc.close(&h, &auth()).is_err());
    }

    #[test]
    fn create_truncates_existing_file() {
        let svc = MemoryDataService::new();
        svc.put_file("x", "james", b"old contents");
        let h = svc.create("x", &auth()).unwrap();
        svc.close(&h, &auth()).unwrap();
        assert_eq!(svc.file_contents("x", "james").unwrap(), b"");
    }

    #[test]
    fn list_status_file_and_directory() {
        let svc = MemoryDataService::new();
        svc.put_file("d/b.txt", "james", b"bb");
        svc.put_file("d/a.txt", "james", b"a");
        svc.put_file("d/sub/c.txt", "james", b"ccc");

        let file = svc.list_status("d/a.txt", &auth()).unwrap();
        assert_eq!(file.len(), 1);
        assert_eq!(file[0].path, "/user/james/d/a.txt");
        assert_eq!(file[0].length, 1);
        assert!(!file[0].is_dir);

        let dir = svc.list_status("d", &auth()).unwrap();
        let paths: Vec<&str> = dir.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/user/james/d/a.txt", "/user/james/d/b.txt", "/user/james/d/sub"]
        );
        assert!(dir[2].is_dir);
        assert_eq!(dir[2].permission, "rwxr-xr-x");
    }

    #[test]
    fn list_status_missing_path_fails() {
        let svc = MemoryDataService::new();
        assert!(svc.list_status("ghost", &auth()).is_err());
    }

    #[test]
    fn home_directory_exists_for_new_user() {
        let svc = MemoryDataService::new();
        let entries = svc.list_status(".", &auth()).unwrap();
        assert!(entries.is_empty());
        assert!(svc.exists(".", "james"));
    }

    #[test]
    fn remove_semantics() {
        let svc = MemoryDataService::new();
        svc.put_file("d/f", "james", b"x");

        assert!(!svc.remove("missing", false, &auth()).unwrap());
        assert!(svc.remove("d", false, &auth()).is_err());
        assert!(svc.remove("d", true, &auth()).unwrap());
        assert!(!svc.exists("d/f", "james"));
    }

    #[test]
    fn denied_path_rejects_mutation() {
        let svc = MemoryDataService::new();
        svc.put_file("locked", "james", b"x");
        svc.deny_path("locked", "james");
        let err = svc.remove("locked", false, &auth()).unwrap_err();
        assert!(err.to_string().contains("Permission denied"));
        assert!(svc.exists("locked", "james"));
    }

    #[test]
    fn credential_mismatch_is_rejected() {
        let svc = MemoryDataService::new().with_credential(auth());
        let wrong = AuthContext::new("james", "wrong");
        let err = svc.mkdir("x", &wrong).unwrap_err();
        assert!(err.to_string().contains("Permission Denied"));
        assert!(svc.mkdir("x", &auth()).unwrap());
    }

    #[test]
    fn mkdir_creates_parents() {
        let svc = MemoryDataService::new();
        assert!(svc.mkdir("/a/b/c", &auth()).unwrap());
        assert!(svc.exists("/a/b", "james"));
        svc.put_file("/a/file", "james", b"");
        assert!(svc.mkdir("/a/file", &auth()).is_err());
    }

    #[test]
    fn read_on_write_handle_fails() {
        let svc = MemoryDataService::new();
        let h = svc.create("x", &auth()).unwrap();
        assert!(svc.read(&h, &auth()).is_err());
        svc.close(&h, &auth()).unwrap();
    }

    #[test]
    fn injected_failures_start_after_allowance() {
        let svc = MemoryDataService::new().with_chunk_size(2);
        svc.fail_after_writes(1);
        let h = svc.create("x", &auth()).unwrap();
        svc.write(&h, b"ab", &auth()).unwrap();
        let err = svc.write(&h, b"cd", &auth()).unwrap_err();
        assert!(!err.is_transport());
        svc.close(&h, &auth()).unwrap();
        assert_eq!(svc.file_contents("x", "james").unwrap(), b"ab");

        svc.put_file("y", "james", b"0123");
        svc.fail_after_reads(1);
        let h = svc.open("y", &auth()).unwrap();
        assert_eq!(svc.read(&h, &auth()).unwrap(), b"01");
        assert!(svc.read(&h, &auth()).is_err());
        svc.close(&h, &auth()).unwrap();
        assert_eq!(svc.open_handles(), 0);
    }

    #[test]
    fn calls_are_counted() {
        let svc = MemoryDataService::new();
        svc.mkdir("a", &auth()).unwrap();
        let _ = svc.list_status("a", &auth());
        let calls = svc.calls();
        assert_eq!(calls.mkdir, 1);
        assert_eq!(calls.list_status, 1);
        assert_eq!(calls.total(), 2);

        svc.reset_calls();
        assert_eq!(svc.calls().total(), 0);
    }
}
