use serde::{Deserialize, Serialize};

use crate::types::{AuthContext, FileStatusRecord, Handle};

/// One remote operation. Bulk bytes for `Write` travel in the frame payload.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Call {
    Open { path: String },
    Create { path: String },
    Read { handle: Handle },
    Write { handle: Handle },
    Close { handle: Handle },
    Remove { path: String, recursive: bool },
    Mkdir { path: String },
    ListStatus { path: String },
}

impl Call {
    /// Operation name used in logs and error messages.
    pub fn op(&self) -> &'static str {
        match self {
            Call::Open { .. } => "open",
            Call::Create { .. } => "create",
            Call::Read { .. } => "read",
            Call::Write { .. } => "write",
            Call::Close { .. } => "close",
            Call::Remove { .. } => "remove",
            Call::Mkdir { .. } => "mkdir",
            Call::ListStatus { .. } => "list_status",
        }
    }
}

/// Header of a client -> service frame.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub auth: AuthContext,
    pub call: Call,
}

/// Outcome of a call. `Data` bytes travel in the frame payload.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Handle { handle: Handle },
    Data,
    Done,
    Flag { value: bool },
    Statuses { entries: Vec<FileStatusRecord> },
    Error { message: String },
}

/// Header of a service -> client frame.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub reply: Reply,
}

impl Response {
    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            reply: Reply::Error {
                message: message.into(),
            },
        }
    }
}
