//! Wire protocol types for the rhfs remote data service.
//!
//! Defines the authenticated call contract ([`RemoteDataService`]), the
//! values it exchanges, and the frame codec used on a TCP connection.

pub mod envelope;
pub mod service;
pub mod types;
pub mod wire;

pub use envelope::{Call, Reply, Request, Response};
pub use service::{RemoteDataService, ServiceError};
pub use types::{AuthContext, FileStatusRecord, Handle};
pub use wire::{
    MAX_FRAME_LEN, MAX_PAYLOAD_LEN, WireError, encode_frame, read_frame, write_frame,
};
