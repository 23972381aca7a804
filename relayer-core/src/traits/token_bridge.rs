use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ChainId, ChainResult, H256};

/// Result of a submitted and confirmed redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    /// Chain native transaction identifier, rendered the way explorers of
    /// that chain expect it
    pub transaction_id: String,
}

/// Read side of a token bridge deployment, served by a provider handle.
#[async_trait]
pub trait TokenBridgeReader: Send + Sync + Debug {
    /// The chain this bridge is deployed on
    fn chain(&self) -> ChainId;

    /// Whether the transfer with the given signable hash has already been
    /// redeemed on this chain.
    async fn is_transfer_completed(&self, vaa_bytes: &[u8], signable_hash: H256)
        -> ChainResult<bool>;
}

/// Write side of a token bridge deployment. Implementations are bound to a
/// single signing key and are only ever driven by that key's wallet worker.
#[async_trait]
pub trait TokenBridgeWriter: Send + Sync + Debug {
    /// The chain this bridge is deployed on
    fn chain(&self) -> ChainId;

    /// Redeem a transfer of any token.
    async fn complete_transfer(&self, vaa_bytes: &[u8]) -> ChainResult<TxOutcome>;

    /// Redeem a transfer of the chain's wrapped native asset and unwrap it
    /// for the recipient.
    async fn complete_transfer_and_unwrap_native(&self, vaa_bytes: &[u8])
        -> ChainResult<TxOutcome>;

    /// Redeem a transfer and collect the relayer reward, for bridges that pay
    /// one out on redemption.
    async fn complete_transfer_with_reward(&self, vaa_bytes: &[u8]) -> ChainResult<TxOutcome>;
}
