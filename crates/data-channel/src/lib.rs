//! Transports for the remote data service.
//!
//! [`DataClient`] speaks the frame protocol from `rhfs-protocol` over TCP
//! and exposes it as a blocking [`RemoteDataService`](rhfs_protocol::RemoteDataService).
//! [`DataServer`] hosts any service implementation on a listener, and
//! [`MemoryDataService`] is an in-process store for development and tests.

pub mod client;
pub mod error;
pub mod memory;
pub mod server;

pub use client::{ClientOptions, DataClient};
pub use error::DataChannelError;
pub use memory::{CallStats, MemoryDataService};
pub use server::DataServer;

use std::time::Duration;

/// TCP read/write buffer size (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Timeout for the TCP connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for a single remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Port the data service listens on by default.
pub const DEFAULT_PORT: u16 = 9091;
