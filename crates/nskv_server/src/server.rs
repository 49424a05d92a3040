//! TCP server for the key/value service.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::service::KvService;
use crate::transport::{read_frame, write_frame};
use nskv_protocol::{
    ProtocolError, ProtocolResult, RequestFrame, ResponseFrame, Status, StatusCode,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// The key/value server.
///
/// Accepts TCP connections and answers framed requests through a
/// [`KvService`]. Requests on one connection are handled in order;
/// separate connections run concurrently.
///
/// # Example
///
/// ```no_run
/// use nskv_server::{KvServer, ServerConfig};
///
/// # async fn run() -> nskv_server::ServerResult<()> {
/// let server = KvServer::new(ServerConfig::default())?;
/// server.serve().await
/// # }
/// ```
pub struct KvServer {
    config: ServerConfig,
    service: KvService,
}

impl KvServer {
    /// Creates a server, opening the configured backend.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let service = KvService::from_config(&config.backend)?;
        Ok(Self { config, service })
    }

    /// Creates a server on an existing service.
    pub fn with_service(config: ServerConfig, service: KvService) -> Self {
        Self { config, service }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the service requests are dispatched to.
    pub fn service(&self) -> &KvService {
        &self.service
    }

    /// Decodes one request payload, runs it and builds the response.
    ///
    /// Undecodable payloads are answered with `InvalidRequest` under id 0.
    pub async fn handle_frame(&self, payload: &[u8]) -> ResponseFrame {
        respond(&self.service, self.config.request_timeout, payload).await
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> ServerResult<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            backend = self.config.backend.kind(),
            "listening"
        );
        Ok(listener)
    }

    /// Binds the configured address and serves until the task is cancelled.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = self.bind().await?;
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serves connections from `listener` until `shutdown` resolves.
    ///
    /// Open connections are aborted on shutdown.
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let limit = Arc::new(Semaphore::new(self.config.max_connections));
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
                        tracing::warn!(
                            %peer,
                            max = self.config.max_connections,
                            "connection limit reached, refusing"
                        );
                        continue;
                    };
                    let service = self.service.clone();
                    let timeout = self.config.request_timeout;
                    let max_frame = self.config.max_frame_size;
                    connections.spawn(async move {
                        let _permit = permit;
                        tracing::debug!(%peer, "connection opened");
                        match serve_connection(stream, service, timeout, max_frame).await {
                            Ok(()) => tracing::debug!(%peer, "connection closed"),
                            Err(e) => tracing::warn!(%peer, error = %e, "connection dropped"),
                        }
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "connection task panicked");
                        }
                    }
                }
            }
        }

        tracing::info!(open = connections.len(), "shutting down");
        connections.shutdown().await;
        Ok(())
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    service: KvService,
    timeout: Duration,
    max_frame: usize,
) -> ProtocolResult<()> {
    stream.set_nodelay(true)?;
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    while let Some(payload) = read_frame(&mut reader, max_frame).await? {
        let response = respond(&service, timeout, &payload).await;
        let encoded = encode_response(&response, max_frame)?;
        write_frame(&mut writer, &encoded, max_frame).await?;
    }
    Ok(())
}

async fn respond(service: &KvService, timeout: Duration, payload: &[u8]) -> ResponseFrame {
    let frame = match RequestFrame::decode(payload) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable request");
            return ResponseFrame::new(0, Err(Status::invalid_request(e.to_string())));
        }
    };

    let id = frame.id;
    let op = frame.request.name();
    tracing::debug!(id, op, namespace = frame.request.namespace(), "request");

    let result = match tokio::time::timeout(timeout, service.call(frame.request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(id, op, ?timeout, "request timed out");
            Err(Status::new(
                StatusCode::DeadlineExceeded,
                format!("{op} did not complete within {timeout:?}"),
            ))
        }
    };
    if let Err(status) = &result {
        tracing::debug!(id, op, code = %status.code, "request failed");
    }
    ResponseFrame::new(id, result)
}

/// Encodes a response, replacing it with an `Internal` status if it would
/// not fit in one frame.
fn encode_response(response: &ResponseFrame, max_frame: usize) -> ProtocolResult<Vec<u8>> {
    let encoded = response.encode()?;
    if encoded.len() <= max_frame {
        return Ok(encoded);
    }
    let size = encoded.len();
    tracing::warn!(id = response.id, size, max = max_frame, "response exceeds frame limit");
    let fallback = ResponseFrame::new(
        response.id,
        Err(Status::internal(
            ProtocolError::FrameTooLarge {
                size,
                max: max_frame,
            }
            .to_string(),
        )),
    );
    fallback.encode()
}
