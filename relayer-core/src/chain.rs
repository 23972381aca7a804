#![allow(missing_docs)]

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

use crate::RelayerError;

/// Wormhole chain id as it appears on the wire.
pub type ChainId = u16;

/// Target chain used by governance messages that apply to every chain.
pub const CHAIN_ID_UNSET: ChainId = 0;

/// All chains the relayer knows how to classify.
#[derive(
    FromPrimitive,
    EnumString,
    strum::Display,
    EnumIter,
    PartialEq,
    Eq,
    Debug,
    Clone,
    Copy,
    Hash,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum KnownChain {
    Solana = 1,
    Ethereum = 2,
    #[strum(serialize = "bsc")]
    #[serde(rename = "bsc")]
    BinanceSmartChain = 4,
    Polygon = 5,
    Avalanche = 6,
    Alephium = 255,
}

/// The virtual machine a chain executes. Selects the contract bindings and
/// wallet type used when relaying to that chain.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChainFamily {
    /// Account based EVM chains, reached through `ethers`.
    Evm,
    /// The Alephium bytecode VM, reached through its full node REST API.
    Alephium,
    /// Chains we can observe but never relay to.
    Solana,
}

impl KnownChain {
    pub fn family(&self) -> ChainFamily {
        use KnownChain::*;

        match self {
            Ethereum | BinanceSmartChain | Polygon | Avalanche => ChainFamily::Evm,
            Alephium => ChainFamily::Alephium,
            Solana => ChainFamily::Solana,
        }
    }

    pub fn id(&self) -> ChainId {
        *self as ChainId
    }

    /// EIP-155 chain id of the mainnet deployment, for EVM chains.
    pub fn evm_chain_id(&self) -> Option<u64> {
        use KnownChain::*;

        match self {
            Ethereum => Some(1),
            BinanceSmartChain => Some(56),
            Polygon => Some(137),
            Avalanche => Some(43114),
            Alephium | Solana => None,
        }
    }
}

impl From<KnownChain> for ChainId {
    fn from(chain: KnownChain) -> Self {
        chain as ChainId
    }
}

impl TryFrom<ChainId> for KnownChain {
    type Error = RelayerError;

    fn try_from(chain_id: ChainId) -> Result<Self, Self::Error> {
        FromPrimitive::from_u16(chain_id).ok_or(RelayerError::UnknownChain(chain_id))
    }
}

impl ChainFamily {
    /// Family of a raw chain id, `None` for ids the relayer does not know.
    pub fn of(chain_id: ChainId) -> Option<Self> {
        KnownChain::try_from(chain_id).ok().map(|c| c.family())
    }
}

/// Whether the chain id belongs to the EVM family.
pub fn is_evm_chain(chain_id: ChainId) -> bool {
    ChainFamily::of(chain_id) == Some(ChainFamily::Evm)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn chain_names_round_trip() {
        assert_eq!(KnownChain::from_str("bsc").unwrap(), KnownChain::BinanceSmartChain);
        assert_eq!(KnownChain::Alephium.to_string(), "alephium");
        assert_eq!(KnownChain::try_from(2).unwrap(), KnownChain::Ethereum);
        assert!(KnownChain::try_from(3).is_err());
    }

    #[test]
    fn families() {
        assert!(is_evm_chain(2));
        assert!(is_evm_chain(4));
        assert!(!is_evm_chain(255));
        assert!(!is_evm_chain(CHAIN_ID_UNSET));
        assert_eq!(ChainFamily::of(255), Some(ChainFamily::Alephium));
    }
}
