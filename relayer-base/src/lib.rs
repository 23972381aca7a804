//! Shared machinery for relayer agents: settings loading, tracing, metrics,
//! the HTTP server and the rocksdb backed job store.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(missing_docs)]

/// Settings and configuration loading
pub mod settings;

mod agent;
pub use agent::*;

mod metrics;
pub use metrics::*;

/// Durable storage
pub mod db;

/// HTTP server with the metrics route
pub mod server;

#[cfg(feature = "oneline-eyre")]
pub mod oneline_eyre;
