use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::payload::{parse_exact, Module};
use crate::{
    read_u16_prefixed, write_u16_prefixed, ChainFamily, ChainId, Decode, DecodeError, Encode,
    H160, H256, U256,
};

pub(crate) const ACTION_CORE_CONTRACT_UPGRADE: u8 = 1;
pub(crate) const ACTION_GUARDIAN_SET_UPGRADE: u8 = 2;
pub(crate) const ACTION_UPDATE_MESSAGE_FEE: u8 = 3;
pub(crate) const ACTION_TRANSFER_FEE: u8 = 4;
pub(crate) const ACTION_REGISTER_CHAIN: u8 = 1;
pub(crate) const ACTION_BRIDGE_CONTRACT_UPGRADE: u8 = 2;

/// `module [32] | action u8 | chain u16`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GovernanceHeader {
    pub module: Module,
    pub action: u8,
    pub chain: ChainId,
}

impl GovernanceHeader {
    /// Read a header and require it to carry `module` and `action`.
    pub fn expect<R: Read>(
        reader: &mut R,
        module: Module,
        action: u8,
    ) -> Result<ChainId, DecodeError> {
        let header = Self::read_from(reader)?;
        if header.module != module || header.action != action {
            return Err(mismatch());
        }
        Ok(header.chain)
    }
}

impl Encode for GovernanceHeader {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        Ok(self.module.to_bytes().write_to(writer)?
            + self.action.write_to(writer)?
            + self.chain.write_to(writer)?)
    }
}

impl Decode for GovernanceHeader {
    fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let module = Module::from_bytes(&<[u8; 32]>::read_from(reader)?).ok_or_else(mismatch)?;
        Ok(Self {
            module,
            action: u8::read_from(reader)?,
            chain: u16::read_from(reader)?,
        })
    }
}

/// Parsers signal "not this shape" with an io error so that `?` keeps working
/// inside them; `parse_exact` turns any error into `None`.
pub(crate) fn mismatch() -> DecodeError {
    DecodeError::IoError(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "payload shape mismatch",
    ))
}

/// Replace the guardian set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianSetUpgrade {
    /// Target chain of the governance action
    pub chain: ChainId,
    /// Index of the new set
    pub new_guardian_set_index: u32,
    /// Addresses of the new set
    pub new_guardian_set: Vec<H160>,
}

impl GuardianSetUpgrade {
    /// Parse a complete payload.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_exact(bytes, |r| {
            let chain = GovernanceHeader::expect(r, Module::Core, ACTION_GUARDIAN_SET_UPGRADE)?;
            let new_guardian_set_index = u32::read_from(r)?;
            let count = u8::read_from(r)?;
            let new_guardian_set = (0..count)
                .map(|_| H160::read_from(r))
                .collect::<Result<_, _>>()?;
            Ok(Self {
                chain,
                new_guardian_set_index,
                new_guardian_set,
            })
        })
    }
}

impl Encode for GuardianSetUpgrade {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        let count = u8::try_from(self.new_guardian_set.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "too many guardians")
        })?;
        let mut written = GovernanceHeader {
            module: Module::Core,
            action: ACTION_GUARDIAN_SET_UPGRADE,
            chain: self.chain,
        }
        .write_to(writer)?;
        written += self.new_guardian_set_index.write_to(writer)?;
        written += count.write_to(writer)?;
        for guardian in &self.new_guardian_set {
            written += guardian.write_to(writer)?;
        }
        Ok(written)
    }
}

/// Set the fee charged for publishing a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageFee {
    /// Target chain of the governance action
    pub chain: ChainId,
    /// New fee in the chain's native unit
    pub new_fee: U256,
}

impl UpdateMessageFee {
    /// Parse a complete payload.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_exact(bytes, |r| {
            let chain = GovernanceHeader::expect(r, Module::Core, ACTION_UPDATE_MESSAGE_FEE)?;
            Ok(Self {
                chain,
                new_fee: U256::read_from(r)?,
            })
        })
    }
}

impl Encode for UpdateMessageFee {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        Ok(GovernanceHeader {
            module: Module::Core,
            action: ACTION_UPDATE_MESSAGE_FEE,
            chain: self.chain,
        }
        .write_to(writer)?
            + self.new_fee.write_to(writer)?)
    }
}

/// Pay out collected message fees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFee {
    /// Target chain of the governance action
    pub chain: ChainId,
    /// Amount to pay out
    pub amount: U256,
    /// Receiver of the fees
    pub recipient: H256,
}

impl TransferFee {
    /// Parse a complete payload.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_exact(bytes, |r| {
            let chain = GovernanceHeader::expect(r, Module::Core, ACTION_TRANSFER_FEE)?;
            Ok(Self {
                chain,
                amount: U256::read_from(r)?,
                recipient: H256::read_from(r)?,
            })
        })
    }
}

impl Encode for TransferFee {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        Ok(GovernanceHeader {
            module: Module::Core,
            action: ACTION_TRANSFER_FEE,
            chain: self.chain,
        }
        .write_to(writer)?
            + self.amount.write_to(writer)?
            + self.recipient.write_to(writer)?)
    }
}

/// What a contract is upgraded to. The two shapes belong to different chain
/// families and are never interchangeable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContractUpgradeKind {
    /// Address of the new implementation contract
    Evm {
        /// Left padded implementation address
        new_contract: H256,
    },
    /// Replacement code and the state to migrate to
    Alephium {
        /// New contract bytecode
        code: Vec<u8>,
        /// Encoded fields of the new state, may be empty
        state: Vec<u8>,
    },
}

/// Upgrade a module's contract on one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractUpgrade {
    /// Module being upgraded
    pub module: Module,
    /// Chain the upgrade applies to, which decides the body shape
    pub chain: ChainId,
    /// New contract
    pub kind: ContractUpgradeKind,
}

impl ContractUpgrade {
    fn action(module: Module) -> u8 {
        match module {
            Module::Core => ACTION_CORE_CONTRACT_UPGRADE,
            Module::TokenBridge | Module::NftBridge => ACTION_BRIDGE_CONTRACT_UPGRADE,
        }
    }

    /// Parse an upgrade aimed at an EVM chain: exactly one 32 byte address.
    pub fn parse_evm(module: Module, bytes: &[u8]) -> Option<Self> {
        parse_exact(bytes, |r| {
            let chain = GovernanceHeader::expect(r, module, Self::action(module))?;
            if ChainFamily::of(chain) != Some(ChainFamily::Evm) {
                return Err(mismatch());
            }
            Ok(Self {
                module,
                chain,
                kind: ContractUpgradeKind::Evm {
                    new_contract: H256::read_from(r)?,
                },
            })
        })
    }

    /// Parse an upgrade aimed at an Alephium chain: length prefixed code and
    /// state blobs.
    pub fn parse_alephium(module: Module, bytes: &[u8]) -> Option<Self> {
        parse_exact(bytes, |r| {
            let chain = GovernanceHeader::expect(r, module, Self::action(module))?;
            if ChainFamily::of(chain) != Some(ChainFamily::Alephium) {
                return Err(mismatch());
            }
            Ok(Self {
                module,
                chain,
                kind: ContractUpgradeKind::Alephium {
                    code: read_u16_prefixed(r)?,
                    state: read_u16_prefixed(r)?,
                },
            })
        })
    }
}

impl Encode for ContractUpgrade {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        let header = GovernanceHeader {
            module: self.module,
            action: Self::action(self.module),
            chain: self.chain,
        }
        .write_to(writer)?;
        let body = match &self.kind {
            ContractUpgradeKind::Evm { new_contract } => new_contract.write_to(writer)?,
            ContractUpgradeKind::Alephium { code, state } => {
                write_u16_prefixed(writer, code)? + write_u16_prefixed(writer, state)?
            }
        };
        Ok(header + body)
    }
}

/// Register the bridge contract deployed on another chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterChain {
    /// Token bridge or NFT bridge
    pub module: Module,
    /// Chain the registration applies to, 0 for every chain
    pub chain: ChainId,
    /// Chain of the bridge being registered
    pub emitter_chain: ChainId,
    /// Address of the bridge being registered
    pub emitter_address: H256,
}

impl RegisterChain {
    /// Parse a complete payload for `module`.
    pub fn parse(module: Module, bytes: &[u8]) -> Option<Self> {
        if module == Module::Core {
            return None;
        }
        parse_exact(bytes, |r| {
            let chain = GovernanceHeader::expect(r, module, ACTION_REGISTER_CHAIN)?;
            Ok(Self {
                module,
                chain,
                emitter_chain: u16::read_from(r)?,
                emitter_address: H256::read_from(r)?,
            })
        })
    }
}

impl Encode for RegisterChain {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        Ok(GovernanceHeader {
            module: self.module,
            action: ACTION_REGISTER_CHAIN,
            chain: self.chain,
        }
        .write_to(writer)?
            + self.emitter_chain.write_to(writer)?
            + self.emitter_address.write_to(writer)?)
    }
}
