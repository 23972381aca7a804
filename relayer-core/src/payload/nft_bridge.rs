use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::payload::governance::mismatch;
use crate::payload::parse_exact;
use crate::{read_u8_prefixed, write_u8_prefixed, ChainId, Decode, DecodeError, Encode, H256, U256};

const PAYLOAD_ID_TRANSFER: u8 = 1;

/// A non fungible token transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferNft {
    /// Collection address on its origin chain
    pub nft_address: H256,
    /// Origin chain of the collection
    pub nft_chain: ChainId,
    /// Collection symbol, right padded utf-8
    pub symbol: [u8; 32],
    /// Collection name, right padded utf-8
    pub name: [u8; 32],
    /// Token id within the collection
    pub token_id: U256,
    /// Metadata uri, at most 255 bytes
    pub uri: String,
    /// Receiver on the target chain
    pub recipient: H256,
    /// Target chain of the transfer
    pub recipient_chain: ChainId,
}

impl TransferNft {
    /// Parse a complete payload.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_exact(bytes, |r| {
            if u8::read_from(r)? != PAYLOAD_ID_TRANSFER {
                return Err(mismatch());
            }
            Ok(Self {
                nft_address: H256::read_from(r)?,
                nft_chain: u16::read_from(r)?,
                symbol: <[u8; 32]>::read_from(r)?,
                name: <[u8; 32]>::read_from(r)?,
                token_id: U256::read_from(r)?,
                uri: String::from_utf8(read_u8_prefixed(r)?)
                    .map_err(|_| DecodeError::InvalidUtf8("uri"))?,
                recipient: H256::read_from(r)?,
                recipient_chain: u16::read_from(r)?,
            })
        })
    }
}

impl Encode for TransferNft {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        Ok(PAYLOAD_ID_TRANSFER.write_to(writer)?
            + self.nft_address.write_to(writer)?
            + self.nft_chain.write_to(writer)?
            + self.symbol.write_to(writer)?
            + self.name.write_to(writer)?
            + self.token_id.write_to(writer)?
            + write_u8_prefixed(writer, self.uri.as_bytes())?
            + self.recipient.write_to(writer)?
            + self.recipient_chain.write_to(writer)?)
    }
}
