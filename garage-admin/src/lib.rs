//! Garage Admin
//!
//! Typed client for the Garage admin API v2 (buckets, access keys and
//! bucket permissions).

mod client;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{AdminClient, DEFAULT_TIMEOUT, normalize_endpoint};
pub use error::{AdminError, AdminResult};
