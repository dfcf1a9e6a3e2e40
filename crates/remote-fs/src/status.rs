use std::collections::HashMap;

use rhfs_protocol::FileStatusRecord;

/// Metadata snapshot of one path in the generic file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: String,
    pub length: u64,
    pub is_dir: bool,
    pub permission: String,
    pub replication: u16,
    pub block_size: u64,
    /// Milliseconds since the Unix epoch.
    pub modification_time: u64,
    pub owner: String,
    pub group: String,
}

impl From<FileStatusRecord> for FileStatus {
    fn from(record: FileStatusRecord) -> Self {
        Self {
            path: record.path,
            length: record.length,
            is_dir: record.is_dir,
            permission: record.permission,
            replication: record.replication,
            block_size: record.block_size,
            modification_time: record.mod_time,
            owner: record.owner,
            group: record.group,
        }
    }
}

/// Listing snapshots keyed by the path they were requested for.
///
/// Entries are never refreshed; the owner clears the cache after any call
/// that can change a listing.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: HashMap<String, Vec<FileStatus>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&[FileStatus]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    pub fn insert(&mut self, path: &str, statuses: Vec<FileStatus>) {
        self.entries.insert(path.to_string(), statuses);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
