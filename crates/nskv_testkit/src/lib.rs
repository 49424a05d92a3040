//! # nskv Testkit
//!
//! Test utilities for the nskv storage backends.
//!
//! This crate provides:
//! - Blocking wrappers over the callback API and backend fixtures
//! - Property-based generators for namespaces, keys, values and operations
//! - A conformance suite run against every backend, with a reference model
//! - Concurrent stress tests
//!
//! ## Usage
//!
//! ```rust
//! use nskv_testkit::prelude::*;
//!
//! with_each_backend(|backend| {
//!     run_all(backend.kv.as_ref());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conformance;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conformance::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use conformance::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
