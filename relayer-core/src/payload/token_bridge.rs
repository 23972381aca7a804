use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::payload::governance::mismatch;
use crate::payload::parse_exact;
use crate::{ChainId, Decode, Encode, H256, U256};

const PAYLOAD_ID_TRANSFER: u8 = 1;
const PAYLOAD_ID_ATTEST: u8 = 2;

/// A fungible token transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferToken {
    /// Amount, normalized to at most 8 decimals
    pub amount: U256,
    /// Address of the token on its origin chain
    pub token_address: H256,
    /// Origin chain of the token
    pub token_chain: ChainId,
    /// Receiver on the target chain
    pub recipient: H256,
    /// Target chain of the transfer
    pub recipient_chain: ChainId,
    /// Relayer fee, paid out of `amount`
    pub fee: U256,
}

impl TransferToken {
    /// Parse a complete payload.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_exact(bytes, |r| {
            if u8::read_from(r)? != PAYLOAD_ID_TRANSFER {
                return Err(mismatch());
            }
            Ok(Self {
                amount: U256::read_from(r)?,
                token_address: H256::read_from(r)?,
                token_chain: u16::read_from(r)?,
                recipient: H256::read_from(r)?,
                recipient_chain: u16::read_from(r)?,
                fee: U256::read_from(r)?,
            })
        })
    }
}

impl Encode for TransferToken {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        Ok(PAYLOAD_ID_TRANSFER.write_to(writer)?
            + self.amount.write_to(writer)?
            + self.token_address.write_to(writer)?
            + self.token_chain.write_to(writer)?
            + self.recipient.write_to(writer)?
            + self.recipient_chain.write_to(writer)?
            + self.fee.write_to(writer)?)
    }
}

/// Metadata of a token, published so that a wrapped version can be created
/// on other chains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestToken {
    /// Address of the token on its origin chain
    pub token_address: H256,
    /// Origin chain of the token
    pub token_chain: ChainId,
    /// Decimals of the token
    pub decimals: u8,
    /// Symbol, right padded utf-8
    pub symbol: [u8; 32],
    /// Name, right padded utf-8
    pub name: [u8; 32],
}

impl AttestToken {
    /// Parse a complete payload.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_exact(bytes, |r| {
            if u8::read_from(r)? != PAYLOAD_ID_ATTEST {
                return Err(mismatch());
            }
            Ok(Self {
                token_address: H256::read_from(r)?,
                token_chain: u16::read_from(r)?,
                decimals: u8::read_from(r)?,
                symbol: <[u8; 32]>::read_from(r)?,
                name: <[u8; 32]>::read_from(r)?,
            })
        })
    }

    /// Symbol with the padding trimmed.
    pub fn symbol_str(&self) -> String {
        trim_padded(&self.symbol)
    }

    /// Name with the padding trimmed.
    pub fn name_str(&self) -> String {
        trim_padded(&self.name)
    }
}

pub(crate) fn trim_padded(bytes: &[u8; 32]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_owned()
}

impl Encode for AttestToken {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        Ok(PAYLOAD_ID_ATTEST.write_to(writer)?
            + self.token_address.write_to(writer)?
            + self.token_chain.write_to(writer)?
            + self.decimals.write_to(writer)?
            + self.symbol.write_to(writer)?
            + self.name.write_to(writer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_layout() {
        let transfer = TransferToken {
            amount: U256::from(1u64),
            token_address: H256::repeat_byte(0xaa),
            token_chain: 2,
            recipient: H256::repeat_byte(0xbb),
            recipient_chain: 255,
            fee: U256::zero(),
        };
        let bytes = transfer.to_vec().unwrap();
        assert_eq!(bytes.len(), 133);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[32], 1);
        assert_eq!(&bytes[65..67], &[0, 2]);
        assert_eq!(&bytes[99..101], &[0, 255]);
    }

    #[test]
    fn attestation_strings() {
        let mut symbol = [0u8; 32];
        symbol[..4].copy_from_slice(b"USDC");
        let attest = AttestToken {
            token_address: H256::zero(),
            token_chain: 2,
            decimals: 6,
            symbol,
            name: [0; 32],
        };
        assert_eq!(attest.symbol_str(), "USDC");
        assert_eq!(attest.name_str(), "");
        assert_eq!(attest.to_vec().unwrap().len(), 100);
    }
}
