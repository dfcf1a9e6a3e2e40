//! TCP data server.
//!
//! Hosts any [`RemoteDataService`] implementation on a TCP listener. Each
//! connection is served by its own task; service calls run on the blocking
//! pool. Handles a connection leaves open are closed when it ends.

use std::collections::HashMap;
use std::sync::Arc;

use rhfs_protocol::{
    AuthContext, Call, Handle, RemoteDataService, Reply, Request, Response, ServiceError,
    read_frame, write_frame,
};
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TCP_BUFFER_SIZE;
use crate::error::DataChannelError;

/// Handles opened on one connection, with the credentials that opened them.
type OpenHandles = HashMap<String, AuthContext>;

/// TCP server for a data service.
pub struct DataServer<S> {
    service: Arc<S>,
    cancel: CancellationToken,
}

impl<S: RemoteDataService + 'static> DataServer<S> {
    pub fn new(service: Arc<S>, cancel: CancellationToken) -> Self {
        Self { service, cancel }
    }

    /// Binds a listener on `addr` (`host:port`, port 0 for ephemeral).
    pub async fn listen(addr: &str) -> Result<TcpListener, DataChannelError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "data service listener bound");
        Ok(listener)
    }

    /// Accepts connections until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), DataChannelError> {
        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("data service shutting down");
                    return Ok(());
                }
                result = listener.accept() => result?,
            };

            info!(%peer, "data service connection accepted");
            let service = Arc::clone(&self.service);
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(service, stream, cancel).await {
                    warn!(%peer, error = %e, "data service connection failed");
                }
                debug!(%peer, "data service connection finished");
            });
        }
    }
}

async fn serve_connection<S: RemoteDataService + 'static>(
    service: Arc<S>,
    stream: TcpStream,
    cancel: CancellationToken,
) -> Result<(), DataChannelError> {
    let mut open = OpenHandles::new();
    let result = answer_requests(&service, stream, &cancel, &mut open).await;
    release_handles(service, open).await;
    result
}

async fn answer_requests<S: RemoteDataService + 'static>(
    service: &Arc<S>,
    stream: TcpStream,
    cancel: &CancellationToken,
    open: &mut OpenHandles,
) -> Result<(), DataChannelError> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::with_capacity(TCP_BUFFER_SIZE, reader);
    let mut writer = BufWriter::with_capacity(TCP_BUFFER_SIZE, writer);

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read_frame::<_, Request>(&mut reader) => frame?,
        };
        let Some((request, payload)) = frame else {
            return Ok(());
        };

        let id = request.id;
        let auth = request.auth.clone();
        let closing = match &request.call {
            Call::Close { handle } => Some(handle.id().to_string()),
            _ => None,
        };

        let svc = Arc::clone(service);
        let (reply, body) =
            match tokio::task::spawn_blocking(move || execute(&*svc, request, payload)).await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(id, error = %e, "service call panicked");
                    (
                        Reply::Error {
                            message: format!("internal error: {e}"),
                        },
                        Vec::new(),
                    )
                }
            };

        if let Some(handle) = closing {
            open.remove(&handle);
        }
        if let Reply::Handle { handle } = &reply {
            open.insert(handle.id().to_string(), auth);
        }

        write_frame(&mut writer, &Response { id, reply }, &body).await?;
    }
}

/// Runs one request against the service.
fn execute<S: RemoteDataService + ?Sized>(
    service: &S,
    request: Request,
    payload: Vec<u8>,
) -> (Reply, Vec<u8>) {
    let auth = &request.auth;
    let result = match request.call {
        Call::Open { path } => service
            .open(&path, auth)
            .map(|handle| (Reply::Handle { handle }, Vec::new())),
        Call::Create { path } => service
            .create(&path, auth)
            .map(|handle| (Reply::Handle { handle }, Vec::new())),
        Call::Read { handle } => service.read(&handle, auth).map(|data| (Reply::Data, data)),
        Call::Write { handle } => service
            .write(&handle, &payload, auth)
            .map(|()| (Reply::Done, Vec::new())),
        Call::Close { handle } => service
            .close(&handle, auth)
            .map(|()| (Reply::Done, Vec::new())),
        Call::Remove { path, recursive } => service
            .remove(&path, recursive, auth)
            .map(|value| (Reply::Flag { value }, Vec::new())),
        Call::Mkdir { path } => service
            .mkdir(&path, auth)
            .map(|value| (Reply::Flag { value }, Vec::new())),
        Call::ListStatus { path } => service
            .list_status(&path, auth)
            .map(|entries| (Reply::Statuses { entries }, Vec::new())),
    };

    result.unwrap_or_else(|e| {
        let message = match e {
            ServiceError::Remote { message, .. } => message,
            other => other.to_string(),
        };
        (Reply::Error { message }, Vec::new())
    })
}

/// Closes every handle a finished connection left open.
async fn release_handles<S: RemoteDataService + 'static>(service: Arc<S>, open: OpenHandles) {
    if open.is_empty() {
        return;
    }
    warn!(count = open.len(), "connection ended with open handles; releasing");

    let released = tokio::task::spawn_blocking(move || {
        for (id, auth) in open {
            let handle = Handle::new(id);
            if let Err(e) = service.close(&handle, &auth) {
                warn!(%handle, error = %e, "failed to release handle");
            }
        }
    })
    .await;
    if let Err(e) = released {
        warn!(error = %e, "handle release task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDataService;

    fn auth() -> AuthContext {
        AuthContext::new("james", "secret")
    }

    #[test]
    fn execute_maps_success_replies() {
        let service = MemoryDataService::new();
        let request = Request {
            id: 1,
            auth: auth(),
            call: Call::Mkdir { path: "d".into() },
        };
        let (reply, body) = execute(&service, request, Vec::new());
        assert_eq!(reply, Reply::Flag { value: true });
        assert!(body.is_empty());
    }

    #[test]
    fn execute_carries_write_payload() {
        let service = MemoryDataService::new();
        let handle = service.create("f", &auth()).unwrap();
        let request = Request {
            id: 2,
            auth: auth(),
            call: Call::Write {
                handle: Handle::new(handle.id()),
            },
        };
        let (reply, _) = execute(&service, request, b"payload".to_vec());
        assert_eq!(reply, Reply::Done);
        assert_eq!(service.file_contents("f", "james").unwrap(), b"payload");
    }

    #[test]
    fn execute_reports_remote_message_only() {
        let service = MemoryDataService::new();
        let request = Request {
            id: 3,
            auth: auth(),
            call: Call::Open {
                path: "missing".into(),
            },
        };
        let (reply, _) = execute(&service, request, Vec::new());
        match reply {
            Reply::Error { message } => {
                assert!(message.starts_with("File does not exist"));
            }
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let server = DataServer::new(Arc::new(MemoryDataService::new()), cancel.clone());
        let listener = DataServer::<MemoryDataService>::listen("127.0.0.1:0")
            .await
            .unwrap();
        cancel.cancel();
        server.serve(listener).await.unwrap();
    }

    #[tokio::test]
    async fn raw_frames_over_tcp() {
        let cancel = CancellationToken::new();
        let service = Arc::new(MemoryDataService::new());
        let listener = DataServer::<MemoryDataService>::listen("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let server = DataServer::new(Arc::clone(&service), cancel.clone());
        let task = tokio::spawn(async move { server.serve(listener).await });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = Request {
            id: 41,
            auth: auth(),
            call: Call::ListStatus { path: ".".into() },
        };
        write_frame(&mut stream, &request, b"").await.unwrap();
        let (response, body): (Response, Vec<u8>) =
            read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(response.id, 41);
        assert_eq!(response.reply, Reply::Statuses { entries: vec![] });
        assert!(body.is_empty());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
