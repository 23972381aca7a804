//! This crate contains the core primitives shared by the relayer agent: the
//! VAA wire format and its payload variants, guardian quorum verification,
//! the chain table and the traits through which chain contracts are consumed.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use chain::*;
pub use error::*;
pub use guardian::*;
pub use traits::*;
pub use types::*;

/// Known chains and the family each belongs to
pub mod chain;
/// Helpers for turning raw configuration into typed settings
pub mod config;
/// Governance, token bridge, nft bridge and extension payloads
pub mod payload;
/// The VAA envelope, its identity and signing
pub mod vaa;

mod error;
mod guardian;
mod traits;
mod types;

/// Deterministic keys and VAAs for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
