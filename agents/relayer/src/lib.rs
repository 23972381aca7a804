//! Relays signed token bridge VAAs to their recipient chains.
//!
//! VAAs arrive from the guardian spy, from the missed VAA sweeper or through
//! the HTTP endpoint. Each is verified, filtered and stored as a job in the
//! durable queue, whose workers run it through the relay pipeline.

pub mod chains;
pub mod executor;
pub mod guardian;
pub mod ingest;
pub mod missed_vaas;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod server;
pub mod settings;
pub mod spy;

mod relayer;

pub use relayer::*;

#[cfg(test)]
mod test_utils;
