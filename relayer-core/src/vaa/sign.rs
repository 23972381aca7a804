use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::vaa::{Signature, Vaa};
use crate::{Encode, H160, H256};

/// Sign the VAA's signable hash with each key. The signature index is the
/// key's position in `keys`, so keys must be given in guardian set order.
///
/// Signatures are low-s normalized with the recovery id appended.
pub fn sign<P: Encode>(keys: &[SigningKey], vaa: &Vaa<P>) -> eyre::Result<Vec<Signature>> {
    let hash = vaa.signable_hash()?;
    keys.iter()
        .enumerate()
        .map(|(index, key)| {
            let (signature, recovery_id) = key.sign_prehash_recoverable(hash.as_bytes())?;
            let mut bytes = [0u8; 65];
            bytes[..64].copy_from_slice(&signature.to_bytes());
            bytes[64] = recovery_id.to_byte();
            Ok(Signature {
                index: u8::try_from(index).map_err(|_| k256::ecdsa::Error::new())?,
                signature: bytes,
            })
        })
        .collect::<Result<_, k256::ecdsa::Error>>()
        .map_err(|err| eyre::eyre!("Failed to sign VAA: {err}"))
}

/// Recover the address that produced `signature` over `hash`. `None` for
/// malformed or high-s signatures.
pub fn recover_signer(hash: &H256, signature: &Signature) -> Option<H160> {
    let ecdsa = EcdsaSignature::from_slice(&signature.signature[..64]).ok()?;
    let recovery_id = RecoveryId::from_byte(signature.signature[64])?;
    let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &ecdsa, recovery_id).ok()?;
    Some(guardian_address(&key))
}

/// EVM style address of a guardian key: the last 20 bytes of the keccak of
/// the uncompressed public key.
pub fn guardian_address(key: &VerifyingKey) -> H160 {
    let point = key.to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    H160::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{dummy_vaa, test_keys};

    #[test]
    fn signatures_recover_to_signers() {
        let keys = test_keys(3);
        let vaa = dummy_vaa(b"payload".as_slice().to_vec());
        let signatures = sign(&keys, &vaa).unwrap();

        assert_eq!(signatures.len(), 3);
        for (i, (signature, key)) in signatures.iter().zip(&keys).enumerate() {
            assert_eq!(signature.index as usize, i);
            assert!(signature.signature[64] <= 1);
            assert_eq!(
                recover_signer(&vaa.signable_hash().unwrap(), signature),
                Some(guardian_address(key.verifying_key()))
            );
        }
    }

    #[test]
    fn signatures_are_low_s() {
        let keys = test_keys(4);
        let vaa = dummy_vaa(vec![7; 40]);
        for signature in sign(&keys, &vaa).unwrap() {
            let ecdsa = EcdsaSignature::from_slice(&signature.signature[..64]).unwrap();
            assert!(ecdsa.normalize_s().is_none());
        }
    }

    #[test]
    fn known_address() {
        // secp256k1 generator point, private key 1
        let key = SigningKey::from_slice(&{
            let mut k = [0u8; 32];
            k[31] = 1;
            k
        })
        .unwrap();
        assert_eq!(
            guardian_address(key.verifying_key()),
            H160::from_slice(&hex::decode("7e5f4552091a69125d5dfcb7b8c2659029395bdf").unwrap())
        );
    }
}
