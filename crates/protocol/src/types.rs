use std::fmt;

use serde::{Deserialize, Serialize};

/// Credential pair forwarded on every remote call.
///
/// Carries no session state; the service authenticates each call on its own.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub username: String,
    pub credential: String,
}

impl AuthContext {
    pub fn new(username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            credential: credential.into(),
        }
    }
}

// Keep credentials out of logs.
impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("username", &self.username)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Opaque token identifying one live remote file session.
///
/// Deliberately not `Clone`: a handle is owned by exactly one stream.
#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    uuid: String,
}

impl Handle {
    /// Wraps a service-assigned identifier.
    pub fn new(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into() }
    }

    pub fn id(&self) -> &str {
        &self.uuid
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uuid)
    }
}

/// Status record for one remote path, as reported by `list_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatusRecord {
    pub is_dir: bool,
    pub path: String,
    pub owner: String,
    pub group: String,
    pub permission: String,
    pub replication: u16,
    /// Last modification time in milliseconds since the Unix epoch.
    pub mod_time: u64,
    pub block_size: u64,
    pub length: u64,
}
