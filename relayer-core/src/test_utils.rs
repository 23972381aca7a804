use k256::ecdsa::SigningKey;

use crate::vaa::{guardian_address, Signature, Vaa};
use crate::{GuardianSet, H256};

/// Core contract upgrade for ethereum, governance emitter, sequence 7.
pub const TEST_CORE_UPGRADE_VAA: &str = concat!(
    "010000000001000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20212223242526272829",
    "2a2b2c2d2e2f303132333435363738393a3b3c3d3e3f40416553f1000000000000010002000000000000000000000000",
    "000000000000000000000000000000000000000400000000000000072000000000000000000000000000000000000000",
    "000000000000000000436f72650100020000000000000000000000003ee18b2214aff97000d974cf647e7c347e8fa585",
);

/// A VAA with two placeholder signatures around `payload`.
pub fn dummy_vaa<P>(payload: P) -> Vaa<P> {
    Vaa {
        version: 1,
        guardian_set_index: 0,
        signatures: vec![
            Signature {
                index: 0,
                signature: [1; 65],
            },
            Signature {
                index: 1,
                signature: [2; 65],
            },
        ],
        timestamp: 1_700_000_000,
        nonce: 42,
        emitter_chain: 2,
        target_chain: 255,
        emitter_address: H256::repeat_byte(0x11),
        sequence: 3,
        consistency_level: 15,
        payload,
    }
}

/// `n` distinct, deterministic guardian keys.
pub fn test_keys(n: u8) -> Vec<SigningKey> {
    (1..=n)
        .map(|i| SigningKey::from_slice(&[i; 32]).unwrap())
        .collect()
}

/// The guardian set made of `keys`, in order.
pub fn test_guardian_set(index: u32, keys: &[SigningKey]) -> GuardianSet {
    GuardianSet {
        index,
        addresses: keys.iter().map(|k| guardian_address(k.verifying_key())).collect(),
        expiration_time: 0,
    }
}
