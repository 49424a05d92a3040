//! Server configuration.

use nskv_protocol::DEFAULT_MAX_FRAME_SIZE;
use std::net::SocketAddr;
use std::time::Duration;

/// Which storage backend the service runs on.
///
/// Selected once at startup; there is no switching between backends while
/// the server runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Process-local ordered map. Entries are lost on restart.
    Memory,
    /// Durable backend driven by the in-process hash store, for
    /// single-node setups and tests.
    Loopback,
    /// Durable backend on a Redis-compatible store.
    Durable {
        /// Store address, `host:port`.
        store_addr: String,
        /// Connect timeout, also applied to every read and write.
        connect_timeout: Duration,
    },
}

impl BackendConfig {
    /// Creates a durable backend configuration with a 5 second timeout.
    pub fn durable(store_addr: impl Into<String>) -> Self {
        BackendConfig::Durable {
            store_addr: store_addr.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Returns a short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::Loopback => "loopback",
            BackendConfig::Durable { .. } => "durable",
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory
    }
}

/// Configuration for the key/value server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Storage backend.
    pub backend: BackendConfig,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Maximum frame payload size in bytes.
    pub max_frame_size: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            backend: BackendConfig::default(),
            max_connections: 1000,
            request_timeout: Duration::from_secs(30),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Sets the storage backend.
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum frame payload size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 7420)))
    }
}
