use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::payload::governance::{mismatch, GovernanceHeader};
use crate::payload::{parse_exact, Module};
use crate::{read_u16_prefixed, write_u16_prefixed, ChainId, Decode, Encode};

const ACTION_DESTROY_UNEXECUTED_SEQUENCES: u8 = 240;
const ACTION_UPDATE_MINIMAL_CONSISTENCY_LEVEL: u8 = 241;
const ACTION_UPDATE_REFUND_ADDRESS: u8 = 242;

/// Governance actions that only exist on some chains' token bridges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum ExtensionAction {
    /// Drop the bookkeeping of sequences that will never be redeemed
    DestroyUnexecutedSequences {
        /// Chain whose sequences are dropped
        emitter_chain: ChainId,
        /// The sequences
        sequences: Vec<u64>,
    },
    /// Set the lowest consistency level the bridge accepts
    UpdateMinimalConsistencyLevel {
        /// New minimum
        level: u8,
    },
    /// Set where refunds of failed transfers are sent
    UpdateRefundAddress {
        /// Chain native encoding of the address
        address: Vec<u8>,
    },
}

impl ExtensionAction {
    fn code(&self) -> u8 {
        match self {
            Self::DestroyUnexecutedSequences { .. } => ACTION_DESTROY_UNEXECUTED_SEQUENCES,
            Self::UpdateMinimalConsistencyLevel { .. } => ACTION_UPDATE_MINIMAL_CONSISTENCY_LEVEL,
            Self::UpdateRefundAddress { .. } => ACTION_UPDATE_REFUND_ADDRESS,
        }
    }
}

/// A chain scoped token bridge governance action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    /// Chain the action applies to
    pub chain: ChainId,
    /// The action
    pub action: ExtensionAction,
}

impl Extension {
    /// Parse a complete payload.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_exact(bytes, |r| {
            let header = GovernanceHeader::read_from(r)?;
            if header.module != Module::TokenBridge {
                return Err(mismatch());
            }
            let action = match header.action {
                ACTION_DESTROY_UNEXECUTED_SEQUENCES => {
                    let emitter_chain = u16::read_from(r)?;
                    let count = u16::read_from(r)?;
                    let sequences = (0..count)
                        .map(|_| u64::read_from(r))
                        .collect::<Result<_, _>>()?;
                    ExtensionAction::DestroyUnexecutedSequences {
                        emitter_chain,
                        sequences,
                    }
                }
                ACTION_UPDATE_MINIMAL_CONSISTENCY_LEVEL => {
                    ExtensionAction::UpdateMinimalConsistencyLevel {
                        level: u8::read_from(r)?,
                    }
                }
                ACTION_UPDATE_REFUND_ADDRESS => ExtensionAction::UpdateRefundAddress {
                    address: read_u16_prefixed(r)?,
                },
                _ => return Err(mismatch()),
            };
            Ok(Self {
                chain: header.chain,
                action,
            })
        })
    }
}

impl Encode for Extension {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        let mut written = GovernanceHeader {
            module: Module::TokenBridge,
            action: self.action.code(),
            chain: self.chain,
        }
        .write_to(writer)?;
        written += match &self.action {
            ExtensionAction::DestroyUnexecutedSequences {
                emitter_chain,
                sequences,
            } => {
                let count = u16::try_from(sequences.len()).map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "too many sequences")
                })?;
                let mut n = emitter_chain.write_to(writer)? + count.write_to(writer)?;
                for sequence in sequences {
                    n += sequence.write_to(writer)?;
                }
                n
            }
            ExtensionAction::UpdateMinimalConsistencyLevel { level } => level.write_to(writer)?,
            ExtensionAction::UpdateRefundAddress { address } => {
                write_u16_prefixed(writer, address)?
            }
        };
        Ok(written)
    }
}
