//! # nskv Storage
//!
//! Namespaced key/value storage backends.
//!
//! This crate provides the storage layer of the internal key/value
//! service: the key codec that multiplexes many logical namespaces onto
//! one flat keyspace, and two interchangeable backends behind the
//! [`InternalKv`] trait.
//!
//! ## Design Principles
//!
//! - Every operation is asynchronous and completes through a callback
//!   invoked exactly once
//! - Callbacks run on a thread owned by the backend, never on the caller's
//! - Both backends give identical results for the same sequence of calls
//! - Backends are chosen once at startup; there is no migration between them
//!
//! ## Available Backends
//!
//! - [`InMemoryKv`] - Ordered map behind a reader/writer lock
//! - [`DurableKv`] - Remote hash store driven through a [`CommandExecutor`]
//!
//! ## Available Executors
//!
//! - [`RespExecutor`] - RESP2 over TCP, for Redis-compatible stores
//! - [`HashStore`] - In-process loopback store with the same replies
//!
//! ## Example
//!
//! ```rust
//! use nskv_storage::{InMemoryKv, InternalKv};
//! use std::sync::mpsc;
//!
//! let kv = InMemoryKv::new().unwrap();
//! let (tx, rx) = mpsc::channel();
//! kv.put("cluster", b"id", b"c-42", true, Box::new(move |r| tx.send(r).unwrap()));
//! assert!(rx.recv().unwrap().unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod backend;
mod durable;
mod error;
mod executor;
mod hash_store;
pub mod key;
mod memory;
pub mod resp;
mod worker;

pub use backend::{Callback, InternalKv};
pub use durable::{prefix_pattern, DurableKv, VALUE_FIELD};
pub use error::{StorageError, StorageResult};
pub use executor::{CommandExecutor, CommandReply, ReplyHandler};
pub use hash_store::{glob_match, HashStore};
pub use memory::InMemoryKv;
pub use resp::RespExecutor;
