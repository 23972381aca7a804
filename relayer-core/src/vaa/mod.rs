use std::fmt::{Debug, Formatter};
use std::io::{Read, Write};

use sha3::{Digest, Keccak256};

pub use id::*;
pub use sign::*;

use crate::payload::{Module, Payload};
use crate::{ChainId, Decode, DecodeError, Encode, H256};

mod id;
mod sign;

/// The only envelope version in use.
pub const VAA_VERSION: u8 = 1;

/// Chain hosting the governance emitter.
pub const GOVERNANCE_CHAIN: ChainId = 1;

/// Emitter address of governance messages.
pub const GOVERNANCE_EMITTER: H256 = H256([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 4,
]);

/// Payload bytes that have not been interpreted yet.
pub type RawPayload = Vec<u8>;

/// A guardian signature over the signable hash of a VAA body.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Position of the signer in the guardian set
    pub index: u8,
    /// `r || s || recovery id`
    pub signature: [u8; 65],
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}, 0x{})", self.index, hex::encode(self.signature))
    }
}

impl Encode for Signature {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        Ok(self.index.write_to(writer)? + self.signature.write_to(writer)?)
    }
}

impl Decode for Signature {
    fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        Ok(Self {
            index: u8::read_from(reader)?,
            signature: <[u8; 65]>::read_from(reader)?,
        })
    }
}

/// A Verified Action Approval: an observation signed by the guardian set.
///
/// `P` is the payload type. VAAs come off the wire as `Vaa<RawPayload>` and
/// are turned into a `Vaa<Payload>` with [`Vaa::parse_payload`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vaa<P = RawPayload> {
    /// Envelope version
    pub version: u8,
    /// Guardian set that signed this VAA
    pub guardian_set_index: u32,
    /// Signatures ordered by guardian index
    pub signatures: Vec<Signature>,
    /// Observation time, in seconds
    pub timestamp: u32,
    /// Emitter chosen nonce
    pub nonce: u32,
    /// Chain of the emitting contract
    pub emitter_chain: ChainId,
    /// Intended destination, [`crate::CHAIN_ID_UNSET`] for every chain
    pub target_chain: ChainId,
    /// Left padded address of the emitting contract
    pub emitter_address: H256,
    /// Per emitter message counter
    pub sequence: u64,
    /// Finality the emitter asked for
    pub consistency_level: u8,
    /// Application payload
    pub payload: P,
}

impl<P> Vaa<P> {
    /// The globally unique identity of this message.
    pub fn id(&self) -> VaaId {
        VaaId {
            emitter_chain: self.emitter_chain,
            emitter_address: self.emitter_address,
            target_chain: self.target_chain,
            sequence: self.sequence,
        }
    }

    /// Whether this VAA was emitted by the governance contract.
    pub fn is_governance(&self) -> bool {
        self.emitter_chain == GOVERNANCE_CHAIN && self.emitter_address == GOVERNANCE_EMITTER
    }

    /// Replace the payload, keeping the envelope.
    pub fn with_payload<Q>(self, payload: Q) -> Vaa<Q> {
        Vaa {
            version: self.version,
            guardian_set_index: self.guardian_set_index,
            signatures: self.signatures,
            timestamp: self.timestamp,
            nonce: self.nonce,
            emitter_chain: self.emitter_chain,
            target_chain: self.target_chain,
            emitter_address: self.emitter_address,
            sequence: self.sequence,
            consistency_level: self.consistency_level,
            payload,
        }
    }
}

impl<P: Encode> Vaa<P> {
    /// Serialize the body, everything after the signature list.
    pub fn body(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![];
        self.write_body(&mut buf)?;
        Ok(buf)
    }

    fn write_body<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut written = 0;
        written += self.timestamp.write_to(writer)?;
        written += self.nonce.write_to(writer)?;
        written += self.emitter_chain.write_to(writer)?;
        written += self.target_chain.write_to(writer)?;
        written += self.emitter_address.write_to(writer)?;
        written += self.sequence.write_to(writer)?;
        written += self.consistency_level.write_to(writer)?;
        written += self.payload.write_to(writer)?;
        Ok(written)
    }

    /// `keccak256(keccak256(body))`, the message the guardians sign.
    pub fn signable_hash(&self) -> std::io::Result<H256> {
        let body_hash = Keccak256::digest(self.body()?);
        Ok(H256::from_slice(Keccak256::digest(body_hash).as_slice()))
    }

    /// Serialize the whole envelope. Fails for more than 255 signatures.
    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        self.to_vec()
    }
}

impl<P: Encode> Encode for Vaa<P> {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        let signature_count = u8::try_from(self.signatures.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "too many signatures")
        })?;
        let mut written = 0;
        written += self.version.write_to(writer)?;
        written += self.guardian_set_index.write_to(writer)?;
        written += signature_count.write_to(writer)?;
        for signature in &self.signatures {
            written += signature.write_to(writer)?;
        }
        written += self.write_body(writer)?;
        Ok(written)
    }
}

/// Decodes the envelope only; the payload is kept as raw bytes.
impl Decode for Vaa<RawPayload> {
    fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let version = u8::read_from(reader)?;
        if version != VAA_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let guardian_set_index = u32::read_from(reader)?;
        let signature_count = u8::read_from(reader)?;
        let mut signatures: Vec<Signature> = Vec::with_capacity(signature_count as usize);
        for _ in 0..signature_count {
            let signature = Signature::read_from(reader)?;
            if let Some(previous) = signatures.last() {
                if signature.index <= previous.index {
                    return Err(DecodeError::UnsortedSignatures {
                        previous: previous.index,
                        index: signature.index,
                    });
                }
            }
            signatures.push(signature);
        }

        Ok(Self {
            version,
            guardian_set_index,
            signatures,
            timestamp: u32::read_from(reader)?,
            nonce: u32::read_from(reader)?,
            emitter_chain: u16::read_from(reader)?,
            target_chain: u16::read_from(reader)?,
            emitter_address: H256::read_from(reader)?,
            sequence: u64::read_from(reader)?,
            consistency_level: u8::read_from(reader)?,
            payload: RawPayload::read_from(reader)?,
        })
    }
}

impl Vaa<RawPayload> {
    /// Decode an envelope from untrusted bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::read_from(&mut &bytes[..])
    }

    /// Interpret the payload as a message of `module`. `None` when no known
    /// payload shape matches, which is not an error: unknown payloads are left
    /// to chain specific handlers.
    pub fn parse_payload(&self, module: Module) -> Option<Vaa<Payload>> {
        let payload = crate::payload::parse_payload(module, &self.payload)?;
        Some(self.clone().with_payload(payload))
    }
}

impl Vaa<Payload> {
    /// Decode an envelope and parse its payload as a message of `module`.
    pub fn decode_with(bytes: &[u8], module: Module) -> Result<Option<Self>, DecodeError> {
        Ok(Vaa::decode(bytes)?.parse_payload(module))
    }
}
