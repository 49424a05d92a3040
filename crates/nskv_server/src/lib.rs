//! # nskv Server
//!
//! RPC adapter, TCP server and client for the namespaced key/value service.
//!
//! This crate provides:
//! - [`KvService`], which turns wire requests into backend calls
//! - [`KvServer`], a framed TCP server over the service
//! - [`KvClient`], the matching client
//!
//! # Architecture
//!
//! One storage backend is chosen at startup from [`BackendConfig`]: the
//! in-memory map, or the durable backend on a Redis-compatible store (or
//! its in-process loopback). All namespaces share that backend; keys are
//! kept apart by the namespace encoding in `nskv_storage::key`.
//!
//! # Protocol
//!
//! Every request and response is a CBOR message in a length-prefixed
//! frame. Responses echo the request id. A failed call carries a status
//! code; `Get` on a missing key is `NotFound`, and every other call
//! succeeds whether or not it changed anything.
//!
//! ```rust,ignore
//! use nskv_server::{KvClient, KvServer, ServerConfig};
//!
//! let server = KvServer::new(ServerConfig::default())?;
//! tokio::spawn(server.serve());
//!
//! let mut client = KvClient::connect("127.0.0.1:7420").await?;
//! client.put("jobs", b"job/1", b"queued", true).await?;
//! assert_eq!(client.get("jobs", b"job/1").await?, Some(b"queued".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod client;
mod config;
mod error;
mod server;
mod service;
pub mod transport;

pub use client::KvClient;
pub use config::{BackendConfig, ServerConfig};
pub use error::{storage_status, ServerError, ServerResult};
pub use server::KvServer;
pub use service::{open_backend, KvService, SendReply};
