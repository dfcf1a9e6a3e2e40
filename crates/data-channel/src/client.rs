//! TCP data client.
//!
//! A blocking [`RemoteDataService`] over one TCP connection. The connection
//! is driven by a private single-threaded tokio runtime; each call is one
//! request/response round trip bounded by the configured call timeout.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rhfs_protocol::{
    AuthContext, Call, FileStatusRecord, Handle, MAX_PAYLOAD_LEN, RemoteDataService, Reply,
    Request, Response, ServiceError, WireError, encode_frame, read_frame,
};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::error::DataChannelError;
use crate::{DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, TCP_BUFFER_SIZE};

/// Connection settings for [`DataClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    /// Upper bound for one remote call; expiry is a transport failure.
    pub call_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    /// Set after a timeout or framing failure; the stream position is unknown.
    broken: bool,
}

impl Connection {
    async fn round_trip(
        &mut self,
        frame: &[u8],
    ) -> Result<Option<(Response, Vec<u8>)>, WireError> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        read_frame(&mut self.reader).await
    }
}

/// Blocking client for the remote data service.
pub struct DataClient {
    runtime: Runtime,
    conn: Mutex<Connection>,
    call_timeout: Duration,
    next_id: AtomicU64,
    peer: String,
}

impl DataClient {
    /// Connects to `addr` (`host:port`).
    ///
    /// Must not be called from within an async context.
    pub fn connect(addr: &str, options: ClientOptions) -> Result<Self, DataChannelError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let stream = runtime.block_on(async {
            match tokio::time::timeout(options.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(s)) => Ok(s),
                Ok(Err(e)) => Err(DataChannelError::Io(e)),
                Err(_) => Err(DataChannelError::Timeout),
            }
        })?;
        stream.set_nodelay(true)?;
        info!(%addr, "data service connected");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            runtime,
            conn: Mutex::new(Connection {
                reader: BufReader::with_capacity(TCP_BUFFER_SIZE, reader),
                writer: BufWriter::with_capacity(TCP_BUFFER_SIZE, writer),
                broken: false,
            }),
            call_timeout: options.call_timeout,
            next_id: AtomicU64::new(1),
            peer: addr.to_string(),
        })
    }

    /// Closes the transport. The service releases any handles this
    /// connection left open.
    pub fn shutdown(self) -> Result<(), DataChannelError> {
        let mut conn = self
            .conn
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        self.runtime.block_on(conn.writer.shutdown())?;
        info!(peer = %self.peer, "data service connection closed");
        Ok(())
    }

    fn call(
        &self,
        call: Call,
        auth: &AuthContext,
        payload: &[u8],
    ) -> Result<(Reply, Vec<u8>), ServiceError> {
        let op = call.op();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            id,
            auth: auth.clone(),
            call,
        };

        // Nothing has been sent if encoding fails, so the connection stays usable.
        let frame = encode_frame(&request, payload)?;

        let mut guard = self
            .conn
            .lock()
            .map_err(|_| ServiceError::Transport("connection lock poisoned".into()))?;
        let conn = &mut *guard;
        if conn.broken {
            return Err(ServiceError::Transport(format!(
                "connection to {} is broken by an earlier failure",
                self.peer
            )));
        }

        debug!(op, id, bytes = payload.len(), "data service call");
        let outcome = self.runtime.block_on(async {
            tokio::time::timeout(self.call_timeout, conn.round_trip(&frame)).await
        });

        let (response, body) = match outcome {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                conn.broken = true;
                return Err(ServiceError::Transport(format!(
                    "{op}: connection closed by {}",
                    self.peer
                )));
            }
            Ok(Err(e)) => {
                conn.broken = true;
                warn!(op, error = %e, "data service transport failure");
                return Err(e.into());
            }
            Err(_) => {
                conn.broken = true;
                warn!(op, timeout = ?self.call_timeout, "data service call timed out");
                return Err(ServiceError::Transport(format!(
                    "{op} timed out after {:?}",
                    self.call_timeout
                )));
            }
        };

        if response.id != id {
            conn.broken = true;
            return Err(ServiceError::Transport(format!(
                "{op}: response id {} does not match request id {id}",
                response.id
            )));
        }

        match response.reply {
            Reply::Error { message } => Err(ServiceError::remote(op, message)),
            reply => Ok((reply, body)),
        }
    }

    fn write_frame_sized(
        &self,
        handle: &Handle,
        data: &[u8],
        auth: &AuthContext,
    ) -> Result<(), ServiceError> {
        let call = Call::Write {
            handle: Handle::new(handle.id()),
        };
        match self.call(call, auth, data)? {
            (Reply::Done, _) => Ok(()),
            (other, _) => Err(unexpected("write", &other)),
        }
    }
}

fn unexpected(op: &'static str, reply: &Reply) -> ServiceError {
    ServiceError::Transport(format!("unexpected reply to {op}: {reply:?}"))
}

impl RemoteDataService for DataClient {
    fn open(&self, path: &str, auth: &AuthContext) -> Result<Handle, ServiceError> {
        let call = Call::Open { path: path.into() };
        match self.call(call, auth, &[])? {
            (Reply::Handle { handle }, _) => Ok(handle),
            (other, _) => Err(unexpected("open", &other)),
        }
    }

    fn create(&self, path: &str, auth: &AuthContext) -> Result<Handle, ServiceError> {
        let call = Call::Create { path: path.into() };
        match self.call(call, auth, &[])? {
            (Reply::Handle { handle }, _) => Ok(handle),
            (other, _) => Err(unexpected("create", &other)),
        }
    }

    fn read(&self, handle: &Handle, auth: &AuthContext) -> Result<Vec<u8>, ServiceError> {
        let call = Call::Read {
            handle: Handle::new(handle.id()),
        };
        match self.call(call, auth, &[])? {
            (Reply::Data, body) => Ok(body),
            (other, _) => Err(unexpected("read", &other)),
        }
    }

    /// Payloads larger than one frame are sent as consecutive write calls;
    /// the service appends them in order.
    fn write(
        &self,
        handle: &Handle,
        data: &[u8],
        auth: &AuthContext,
    ) -> Result<(), ServiceError> {
        if data.len() <= MAX_PAYLOAD_LEN {
            return self.write_frame_sized(handle, data, auth);
        }
        for part in data.chunks(MAX_PAYLOAD_LEN) {
            self.write_frame_sized(handle, part, auth)?;
        }
        Ok(())
    }

    fn close(&self, handle: &Handle, auth: &AuthContext) -> Result<(), ServiceError> {
        let call = Call::Close {
            handle: Handle::new(handle.id()),
        };
        match self.call(call, auth, &[])? {
            (Reply::Done, _) => Ok(()),
            (other, _) => Err(unexpected("close", &other)),
        }
    }

    fn remove(
        &self,
        path: &str,
        recursive: bool,
        auth: &AuthContext,
    ) -> Result<bool, ServiceError> {
        let call = Call::Remove {
            path: path.into(),
            recursive,
        };
        match self.call(call, auth, &[])? {
            (Reply::Flag { value }, _) => Ok(value),
            (other, _) => Err(unexpected("remove", &other)),
        }
    }

    fn mkdir(&self, path: &str, auth: &AuthContext) -> Result<bool, ServiceError> {
        let call = Call::Mkdir { path: path.into() };
        match self.call(call, auth, &[])? {
            (Reply::Flag { value }, _) => Ok(value),
            (other, _) => Err(unexpected("mkdir", &other)),
        }
    }

    fn list_status(
        &self,
        path: &str,
        auth: &AuthContext,
    ) -> Result<Vec<FileStatusRecord>, ServiceError> {
        let call = Call::ListStatus { path: path.into() };
        match self.call(call, auth, &[])? {
            (Reply::Statuses { entries }, _) => Ok(entries),
            (other, _) => Err(unexpected("list_status", &other)),
        }
    }
}
