use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ChainId, DecodeError, H256};

/// `(emitterChain, emitterAddress, targetChain, sequence)`, the identity of a
/// message. Unique forever: an emitter never reuses a sequence.
///
/// Rendered as `<emitterChain>/<emitterAddress hex>/<targetChain>/<sequence>`,
/// which is also the job id used by the durable queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaaId {
    /// Chain of the emitting contract
    pub emitter_chain: ChainId,
    /// Emitting contract
    pub emitter_address: H256,
    /// Destination chain
    pub target_chain: ChainId,
    /// Per emitter sequence
    pub sequence: u64,
}

/// The key the missed VAA job and the queue address messages by.
pub type VaaKey = VaaId;

impl VaaId {
    /// The stream this message belongs to.
    pub fn route(&self) -> EmitterRoute {
        EmitterRoute {
            emitter_chain: self.emitter_chain,
            emitter_address: self.emitter_address,
            target_chain: self.target_chain,
        }
    }

    /// Emitter address as unprefixed lowercase hex.
    pub fn emitter_address_hex(&self) -> String {
        hex::encode(self.emitter_address.as_bytes())
    }
}

impl Display for VaaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.emitter_chain,
            self.emitter_address_hex(),
            self.target_chain,
            self.sequence
        )
    }
}

impl FromStr for VaaId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecodeError::InvalidVaaId(s.to_owned());
        let parts: Vec<&str> = s.split('/').collect();
        let [emitter_chain, emitter_address, target_chain, sequence] = parts[..] else {
            return Err(invalid());
        };
        Ok(Self {
            emitter_chain: emitter_chain.parse().map_err(|_| invalid())?,
            emitter_address: parse_emitter_address(emitter_address).ok_or_else(invalid)?,
            target_chain: target_chain.parse().map_err(|_| invalid())?,
            sequence: sequence.parse().map_err(|_| invalid())?,
        })
    }
}

/// Parse a 32 byte emitter address, with or without `0x`. Shorter inputs
/// (such as a 20 byte EVM address) are left padded.
pub fn parse_emitter_address(s: &str) -> Option<H256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).ok()?;
    if bytes.len() > 32 {
        return None;
    }
    let mut address = H256::zero();
    address.as_bytes_mut()[32 - bytes.len()..].copy_from_slice(&bytes);
    Some(address)
}

/// A stream of messages from one emitter to one target chain. Sequences of a
/// route are what the missed VAA job scans for gaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitterRoute {
    /// Chain of the emitting contract
    pub emitter_chain: ChainId,
    /// Emitting contract
    pub emitter_address: H256,
    /// Destination chain
    pub target_chain: ChainId,
}

impl EmitterRoute {
    /// Id of the message at `sequence` on this route.
    pub fn at(&self, sequence: u64) -> VaaId {
        VaaId {
            emitter_chain: self.emitter_chain,
            emitter_address: self.emitter_address,
            target_chain: self.target_chain,
            sequence,
        }
    }
}

impl Display for EmitterRoute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.emitter_chain,
            hex::encode(self.emitter_address.as_bytes()),
            self.target_chain
        )
    }
}
