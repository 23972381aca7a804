//! Payload variants carried inside a VAA.
//!
//! A payload is identified by the module it belongs to and a discriminant
//! byte. Governance payloads start with a 32 byte left padded module name,
//! an action byte and a target chain; application payloads start with a
//! payload id. Every parser must consume its input exactly, so a buffer that
//! merely starts like a known payload is not a match.

use std::io::Write;

use serde::{Deserialize, Serialize};

pub use extension::*;
pub use governance::*;
pub use nft_bridge::*;
pub use token_bridge::*;

use crate::{DecodeError, Encode};

mod extension;
mod governance;
mod nft_bridge;
mod token_bridge;

/// The contract module a payload belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter)]
pub enum Module {
    /// The core messaging contract
    Core,
    /// Fungible token bridge
    TokenBridge,
    /// Non fungible token bridge
    #[serde(rename = "NFTBridge")]
    NftBridge,
}

impl Module {
    /// Name as it appears in governance headers.
    pub fn name(&self) -> &'static str {
        match self {
            Module::Core => "Core",
            Module::TokenBridge => "TokenBridge",
            Module::NftBridge => "NFTBridge",
        }
    }

    /// The name left padded to 32 bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        let name = self.name().as_bytes();
        let mut bytes = [0u8; 32];
        bytes[32 - name.len()..].copy_from_slice(name);
        bytes
    }

    /// The module named by a 32 byte governance header field.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        use strum::IntoEnumIterator;

        Module::iter().find(|module| &module.to_bytes() == bytes)
    }
}

/// Every payload the relayer understands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    /// Core: rotate the guardian set
    GuardianSetUpgrade(GuardianSetUpgrade),
    /// Core: change the message fee
    UpdateMessageFee(UpdateMessageFee),
    /// Core: pay out accumulated fees
    TransferFee(TransferFee),
    /// Any module: upgrade the contract on one chain
    ContractUpgrade(ContractUpgrade),
    /// Bridges: register the bridge deployed on another chain
    RegisterChain(RegisterChain),
    /// Token bridge transfer
    TransferToken(TransferToken),
    /// Token bridge asset attestation
    AttestToken(AttestToken),
    /// NFT bridge transfer
    TransferNft(TransferNft),
    /// Chain specific token bridge governance
    Extension(Extension),
}

impl Payload {
    /// Module this payload belongs to.
    pub fn module(&self) -> Module {
        match self {
            Payload::GuardianSetUpgrade(_)
            | Payload::UpdateMessageFee(_)
            | Payload::TransferFee(_) => Module::Core,
            Payload::ContractUpgrade(p) => p.module,
            Payload::RegisterChain(p) => p.module,
            Payload::TransferToken(_) | Payload::AttestToken(_) | Payload::Extension(_) => {
                Module::TokenBridge
            }
            Payload::TransferNft(_) => Module::NftBridge,
        }
    }

    /// Short name used in logs and filters.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::GuardianSetUpgrade(_) => "GuardianSetUpgrade",
            Payload::UpdateMessageFee(_) => "UpdateMessageFee",
            Payload::TransferFee(_) => "TransferFee",
            Payload::ContractUpgrade(_) => "ContractUpgrade",
            Payload::RegisterChain(_) => "RegisterChain",
            Payload::TransferToken(_) => "TransferToken",
            Payload::AttestToken(_) => "AttestToken",
            Payload::TransferNft(_) => "TransferNFT",
            Payload::Extension(_) => "Extension",
        }
    }
}

impl Encode for Payload {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        match self {
            Payload::GuardianSetUpgrade(p) => p.write_to(writer),
            Payload::UpdateMessageFee(p) => p.write_to(writer),
            Payload::TransferFee(p) => p.write_to(writer),
            Payload::ContractUpgrade(p) => p.write_to(writer),
            Payload::RegisterChain(p) => p.write_to(writer),
            Payload::TransferToken(p) => p.write_to(writer),
            Payload::AttestToken(p) => p.write_to(writer),
            Payload::TransferNft(p) => p.write_to(writer),
            Payload::Extension(p) => p.write_to(writer),
        }
    }
}

type Parser = fn(&[u8]) -> Option<Payload>;

const CORE_PARSERS: &[Parser] = &[
    |b| GuardianSetUpgrade::parse(b).map(Payload::GuardianSetUpgrade),
    |b| UpdateMessageFee::parse(b).map(Payload::UpdateMessageFee),
    |b| TransferFee::parse(b).map(Payload::TransferFee),
    |b| ContractUpgrade::parse_evm(Module::Core, b).map(Payload::ContractUpgrade),
    |b| ContractUpgrade::parse_alephium(Module::Core, b).map(Payload::ContractUpgrade),
];

const TOKEN_BRIDGE_PARSERS: &[Parser] = &[
    |b| TransferToken::parse(b).map(Payload::TransferToken),
    |b| AttestToken::parse(b).map(Payload::AttestToken),
    |b| RegisterChain::parse(Module::TokenBridge, b).map(Payload::RegisterChain),
    |b| ContractUpgrade::parse_evm(Module::TokenBridge, b).map(Payload::ContractUpgrade),
    |b| ContractUpgrade::parse_alephium(Module::TokenBridge, b).map(Payload::ContractUpgrade),
    |b| Extension::parse(b).map(Payload::Extension),
];

const NFT_BRIDGE_PARSERS: &[Parser] = &[
    |b| TransferNft::parse(b).map(Payload::TransferNft),
    |b| RegisterChain::parse(Module::NftBridge, b).map(Payload::RegisterChain),
    |b| ContractUpgrade::parse_evm(Module::NftBridge, b).map(Payload::ContractUpgrade),
    |b| ContractUpgrade::parse_alephium(Module::NftBridge, b).map(Payload::ContractUpgrade),
];

/// Try each parser of `module` in priority order and return the first exact
/// match. `None` means the payload is unknown, not corrupt.
pub fn parse_payload(module: Module, bytes: &[u8]) -> Option<Payload> {
    let parsers = match module {
        Module::Core => CORE_PARSERS,
        Module::TokenBridge => TOKEN_BRIDGE_PARSERS,
        Module::NftBridge => NFT_BRIDGE_PARSERS,
    };
    parsers.iter().find_map(|parse| parse(bytes))
}

/// Run `read` over `bytes` and succeed only if it consumed every byte.
pub(crate) fn parse_exact<T>(
    bytes: &[u8],
    read: impl FnOnce(&mut &[u8]) -> Result<T, DecodeError>,
) -> Option<T> {
    let mut reader = bytes;
    let value = read(&mut reader).ok()?;
    reader.is_empty().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_CORE_UPGRADE_VAA;
    use crate::vaa::Vaa;
    use crate::{KnownChain, H256, U256};

    fn samples() -> Vec<Payload> {
        vec![
            Payload::GuardianSetUpgrade(GuardianSetUpgrade {
                chain: 0,
                new_guardian_set_index: 1,
                new_guardian_set: vec![crate::H160::repeat_byte(1), crate::H160::repeat_byte(2)],
            }),
            Payload::UpdateMessageFee(UpdateMessageFee {
                chain: 2,
                new_fee: U256::from(1_000u64),
            }),
            Payload::TransferFee(TransferFee {
                chain: 255,
                amount: U256::from(5u64),
                recipient: H256::repeat_byte(3),
            }),
            Payload::ContractUpgrade(ContractUpgrade {
                module: Module::Core,
                chain: KnownChain::Ethereum.id(),
                kind: ContractUpgradeKind::Evm {
                    new_contract: H256::from_low_u64_be(0xbeef),
                },
            }),
            Payload::ContractUpgrade(ContractUpgrade {
                module: Module::TokenBridge,
                chain: KnownChain::Alephium.id(),
                kind: ContractUpgradeKind::Alephium {
                    code: vec![1, 2, 3, 4],
                    state: vec![],
                },
            }),
            Payload::RegisterChain(RegisterChain {
                module: Module::TokenBridge,
                chain: 0,
                emitter_chain: 255,
                emitter_address: H256::repeat_byte(9),
            }),
            Payload::RegisterChain(RegisterChain {
                module: Module::NftBridge,
                chain: 0,
                emitter_chain: 2,
                emitter_address: H256::repeat_byte(8),
            }),
            Payload::TransferToken(TransferToken {
                amount: U256::from(12_345u64),
                token_address: H256::repeat_byte(4),
                token_chain: 2,
                recipient: H256::repeat_byte(5),
                recipient_chain: 255,
                fee: U256::from(10u64),
            }),
            Payload::AttestToken(AttestToken {
                token_address: H256::repeat_byte(6),
                token_chain: 2,
                decimals: 18,
                symbol: fixed_string("WETH"),
                name: fixed_string("Wrapped Ether"),
            }),
            Payload::TransferNft(TransferNft {
                nft_address: H256::repeat_byte(7),
                nft_chain: 2,
                symbol: fixed_string("APE"),
                name: fixed_string("Apes"),
                token_id: U256::from(77u64),
                uri: "ipfs://apes/77".into(),
                recipient: H256::repeat_byte(1),
                recipient_chain: 255,
            }),
            Payload::Extension(Extension {
                chain: 255,
                action: ExtensionAction::DestroyUnexecutedSequences {
                    emitter_chain: 2,
                    sequences: vec![3, 5, 8],
                },
            }),
            Payload::Extension(Extension {
                chain: 255,
                action: ExtensionAction::UpdateMinimalConsistencyLevel { level: 105 },
            }),
            Payload::Extension(Extension {
                chain: 255,
                action: ExtensionAction::UpdateRefundAddress {
                    address: vec![0x00, 0xaa, 0xbb],
                },
            }),
        ]
    }

    fn fixed_string(s: &str) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..s.len()].copy_from_slice(s.as_bytes());
        out
    }

    #[test]
    fn every_variant_round_trips() {
        for payload in samples() {
            let bytes = payload.to_vec().unwrap();
            assert_eq!(
                parse_payload(payload.module(), &bytes).as_ref(),
                Some(&payload),
                "{}",
                payload.kind()
            );
        }
    }

    #[test]
    fn every_variant_round_trips_inside_a_vaa() {
        for payload in samples() {
            let module = payload.module();
            let vaa = crate::test_utils::dummy_vaa(payload);
            let decoded = Vaa::decode_with(&vaa.encode().unwrap(), module).unwrap().unwrap();
            assert_eq!(decoded, vaa);
            assert_eq!(decoded.signable_hash().unwrap(), vaa.signable_hash().unwrap());
        }
    }

    #[test]
    fn variants_do_not_leak_across_modules() {
        for payload in samples() {
            let bytes = payload.to_vec().unwrap();
            for module in [Module::Core, Module::TokenBridge, Module::NftBridge] {
                if module != payload.module() {
                    assert_ne!(
                        parse_payload(module, &bytes).map(|p| p.kind()),
                        Some(payload.kind()),
                        "{} parsed as {module:?}",
                        payload.kind()
                    );
                }
            }
        }
    }

    #[test]
    fn contract_upgrade_shapes_never_cross_parse() {
        let evm = ContractUpgrade {
            module: Module::TokenBridge,
            chain: KnownChain::BinanceSmartChain.id(),
            kind: ContractUpgradeKind::Evm {
                new_contract: H256::repeat_byte(0xab),
            },
        }
        .to_vec()
        .unwrap();
        let alephium = ContractUpgrade {
            module: Module::TokenBridge,
            chain: KnownChain::Alephium.id(),
            kind: ContractUpgradeKind::Alephium {
                code: vec![0; 26],
                state: vec![0; 2],
            },
        }
        .to_vec()
        .unwrap();
        // same length as the evm body, so only the family keeps them apart
        assert_eq!(evm.len(), alephium.len());

        assert!(ContractUpgrade::parse_evm(Module::TokenBridge, &evm).is_some());
        assert!(ContractUpgrade::parse_alephium(Module::TokenBridge, &evm).is_none());
        assert!(ContractUpgrade::parse_alephium(Module::TokenBridge, &alephium).is_some());
        assert!(ContractUpgrade::parse_evm(Module::TokenBridge, &alephium).is_none());
    }

    #[test]
    fn unknown_payloads_are_none() {
        assert_eq!(parse_payload(Module::TokenBridge, &[]), None);
        assert_eq!(parse_payload(Module::TokenBridge, &[9, 9, 9]), None);
        assert_eq!(parse_payload(Module::Core, b"hello world"), None);

        let mut transfer = samples()
            .into_iter()
            .find(|p| p.kind() == "TransferToken")
            .unwrap()
            .to_vec()
            .unwrap();
        transfer.push(0);
        assert_eq!(parse_payload(Module::TokenBridge, &transfer), None);
        transfer.truncate(transfer.len() - 2);
        assert_eq!(parse_payload(Module::TokenBridge, &transfer), None);
    }

    #[test]
    fn parses_reference_upgrade() {
        let bytes = hex::decode(TEST_CORE_UPGRADE_VAA).unwrap();
        let vaa = Vaa::decode_with(&bytes, Module::Core).unwrap().unwrap();
        let Payload::ContractUpgrade(upgrade) = &vaa.payload else {
            panic!("expected a contract upgrade, got {:?}", vaa.payload);
        };
        assert_eq!(upgrade.chain, 2);
        assert_eq!(
            upgrade.kind,
            ContractUpgradeKind::Evm {
                new_contract: crate::vaa::parse_emitter_address(
                    "3ee18b2214aff97000d974cf647e7c347e8fa585"
                )
                .unwrap()
            }
        );
        assert_eq!(vaa.encode().unwrap(), bytes);
    }

    #[test]
    fn module_names() {
        assert_eq!(&Module::NftBridge.to_bytes()[23..], b"NFTBridge");
        assert_eq!(Module::from_bytes(&Module::Core.to_bytes()), Some(Module::Core));
        assert_eq!(Module::from_bytes(&[0; 32]), None);
    }
}
