//! # nskv Protocol
//!
//! Wire types and CBOR codecs for the key/value RPC interface.
//!
//! This crate provides:
//! - Request and reply messages for Get, Put, Del, Exists and Keys
//! - [`Status`] codes for failed calls (notably `NotFound` for `Get`)
//! - CBOR encoding via `ciborium`
//! - Length-prefixed framing
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bytes;
mod error;
pub mod frame;
mod messages;
mod status;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{decode_header, encode_frame, DEFAULT_MAX_FRAME_SIZE, HEADER_LEN};
pub use messages::{
    DelReply, DelRequest, ExistsReply, ExistsRequest, GetReply, GetRequest, KeysReply, KeysRequest,
    KvReply, KvRequest, PutReply, PutRequest, RequestFrame, ResponseFrame,
};
pub use status::{Status, StatusCode};
