use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::vaa::{recover_signer, Vaa};
use crate::{Encode, H160};

/// A guardian roster at a given index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianSet {
    /// Index the set was published under
    pub index: u32,
    /// Guardian addresses, ordered by guardian index
    pub addresses: Vec<H160>,
    /// Unix seconds after which the set is no longer valid, 0 if the set
    /// never expires
    #[serde(default)]
    pub expiration_time: u32,
}

impl GuardianSet {
    /// Signatures required for a supermajority: `floor(2n/3) + 1`.
    pub fn quorum(&self) -> usize {
        self.addresses.len() * 2 / 3 + 1
    }

    /// Whether the set has expired at `now` (unix seconds).
    pub fn is_expired(&self, now: u32) -> bool {
        self.expiration_time != 0 && self.expiration_time < now
    }
}

/// Outcome of checking a VAA against a guardian set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum VerificationResult {
    /// Signed by a supermajority of the set
    Valid,
    /// A signature did not recover to the guardian at its index, or indices
    /// were not strictly increasing
    InvalidSignature,
    /// Every signature checked out but there are too few of them
    QuorumNotMet,
    /// The VAA names a guardian set we do not have
    UnknownGuardianSet,
    /// The VAA names a guardian set that has expired
    GuardianSetExpired,
}

impl VerificationResult {
    /// Whether the VAA may be trusted.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Check `vaa`'s signatures against `set`. A pure function of its inputs.
pub fn verify<P: Encode>(vaa: &Vaa<P>, set: &GuardianSet) -> VerificationResult {
    if vaa.guardian_set_index != set.index {
        return VerificationResult::UnknownGuardianSet;
    }

    let Ok(hash) = vaa.signable_hash() else {
        return VerificationResult::InvalidSignature;
    };
    let mut previous: Option<u8> = None;
    for signature in &vaa.signatures {
        if previous.is_some_and(|p| signature.index <= p) {
            return VerificationResult::InvalidSignature;
        }
        previous = Some(signature.index);

        let Some(expected) = set.addresses.get(signature.index as usize) else {
            return VerificationResult::InvalidSignature;
        };
        if recover_signer(&hash, signature).as_ref() != Some(expected) {
            return VerificationResult::InvalidSignature;
        }
    }

    if vaa.signatures.len() * 3 > set.addresses.len() * 2 {
        VerificationResult::Valid
    } else {
        VerificationResult::QuorumNotMet
    }
}

/// All guardian sets known to the relayer. During a transition the outgoing
/// and incoming sets coexist until the outgoing one expires.
#[derive(Clone, Debug, Default)]
pub struct GuardianSets {
    sets: BTreeMap<u32, GuardianSet>,
}

impl GuardianSets {
    /// Register a set, replacing any previous set with the same index.
    pub fn insert(&mut self, set: GuardianSet) {
        self.sets.insert(set.index, set);
    }

    /// The set published under `index`.
    pub fn get(&self, index: u32) -> Option<&GuardianSet> {
        self.sets.get(&index)
    }

    /// The set with the highest index.
    pub fn current(&self) -> Option<&GuardianSet> {
        self.sets.values().next_back()
    }

    /// Verify against the set whose index the VAA names; an expired set is
    /// rejected outright.
    pub fn verify<P: Encode>(&self, vaa: &Vaa<P>, now: u32) -> VerificationResult {
        match self.get(vaa.guardian_set_index) {
            None => VerificationResult::UnknownGuardianSet,
            Some(set) if set.is_expired(now) => VerificationResult::GuardianSetExpired,
            Some(set) => verify(vaa, set),
        }
    }
}

impl FromIterator<GuardianSet> for GuardianSets {
    fn from_iter<T: IntoIterator<Item = GuardianSet>>(iter: T) -> Self {
        let mut sets = Self::default();
        for set in iter {
            sets.insert(set);
        }
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{dummy_vaa, test_guardian_set, test_keys};
    use crate::vaa::sign;

    fn signed_by(keys: &[k256::ecdsa::SigningKey], signers: &[usize]) -> Vaa {
        let mut vaa = dummy_vaa(b"quorum".as_slice().to_vec());
        let all = sign(keys, &vaa).unwrap();
        vaa.signatures = signers.iter().map(|i| all[*i]).collect();
        vaa
    }

    #[test]
    fn quorum_boundary_three_guardians() {
        let keys = test_keys(3);
        let set = test_guardian_set(0, &keys);
        assert_eq!(set.quorum(), 3);

        assert_eq!(verify(&signed_by(&keys, &[0, 1, 2]), &set), VerificationResult::Valid);
        assert_eq!(
            verify(&signed_by(&keys, &[0, 2]), &set),
            VerificationResult::QuorumNotMet
        );
        assert_eq!(
            verify(&signed_by(&keys, &[1]), &set),
            VerificationResult::QuorumNotMet
        );
    }

    #[test]
    fn quorum_boundary_matches_formula() {
        for n in 1..=19u8 {
            let keys = test_keys(n);
            let set = test_guardian_set(0, &keys);
            let quorum = (2 * n as usize) / 3 + 1;
            assert_eq!(set.quorum(), quorum);

            let enough: Vec<usize> = (0..quorum).collect();
            assert_eq!(verify(&signed_by(&keys, &enough), &set), VerificationResult::Valid);

            let short: Vec<usize> = (0..quorum - 1).collect();
            assert_eq!(
                verify(&signed_by(&keys, &short), &set),
                VerificationResult::QuorumNotMet,
                "n = {n}"
            );
        }
    }

    #[test]
    fn wrong_signer_is_invalid() {
        let keys = test_keys(4);
        let set = test_guardian_set(0, &keys);
        let mut vaa = signed_by(&keys, &[0, 1, 2]);
        // guardian 3 signed but claims to be guardian 2
        let from_three = sign(&keys, &vaa).unwrap()[3];
        vaa.signatures[2].signature = from_three.signature;
        assert_eq!(verify(&vaa, &set), VerificationResult::InvalidSignature);
    }

    #[test]
    fn duplicate_indices_cannot_inflate_quorum() {
        let keys = test_keys(3);
        let set = test_guardian_set(0, &keys);
        let mut vaa = signed_by(&keys, &[0, 1]);
        vaa.signatures.push(vaa.signatures[1]);
        assert_eq!(verify(&vaa, &set), VerificationResult::InvalidSignature);
    }

    #[test]
    fn tampered_body_is_invalid() {
        let keys = test_keys(3);
        let set = test_guardian_set(0, &keys);
        let mut vaa = signed_by(&keys, &[0, 1, 2]);
        vaa.sequence += 1;
        assert_eq!(verify(&vaa, &set), VerificationResult::InvalidSignature);
    }

    #[test]
    fn verification_is_deterministic() {
        let keys = test_keys(5);
        let set = test_guardian_set(0, &keys);
        for signers in [&[0usize, 1, 2, 3][..], &[0, 1, 2], &[4]] {
            let vaa = signed_by(&keys, signers);
            assert_eq!(verify(&vaa, &set), verify(&vaa, &set));
        }
    }

    #[test]
    fn registry_selects_set_by_index() {
        let old_keys = test_keys(3);
        let new_keys: Vec<_> = test_keys(6).split_off(3);
        let mut old = test_guardian_set(0, &old_keys);
        old.expiration_time = 1_000;
        let sets: GuardianSets = [old, test_guardian_set(1, &new_keys)].into_iter().collect();
        assert_eq!(sets.current().map(|s| s.index), Some(1));

        let vaa = signed_by(&old_keys, &[0, 1, 2]);
        assert_eq!(sets.verify(&vaa, 999), VerificationResult::Valid);
        assert_eq!(sets.verify(&vaa, 1_001), VerificationResult::GuardianSetExpired);

        let mut unknown = vaa.clone();
        unknown.guardian_set_index = 7;
        assert_eq!(sets.verify(&unknown, 0), VerificationResult::UnknownGuardianSet);

        let mut next = dummy_vaa(b"quorum".as_slice().to_vec());
        next.guardian_set_index = 1;
        next.signatures = sign(&new_keys, &next).unwrap();
        assert_eq!(sets.verify(&next, u32::MAX), VerificationResult::Valid);
    }
}
