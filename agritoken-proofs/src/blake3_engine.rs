use crate::engine::CommitmentEngine;
use agritoken_core::error::StorageError;
use agritoken_core::objects::ContractState;
use log::debug;

/// Domain separator mixed into every state hash
const STATE_DOMAIN: &[u8] = b"AGRITOKEN_State_v1";

/// Commitment engine hashing the bincode state encoding with BLAKE3
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3CommitmentEngine;

impl Blake3CommitmentEngine {
    pub fn new() -> Self {
        Self
    }
}

impl CommitmentEngine for Blake3CommitmentEngine {
    fn state_hash(&self, state: &ContractState) -> Result<[u8; 32], StorageError> {
        let encoded = state.encode()?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(STATE_DOMAIN);
        hasher.update(&(encoded.len() as u64).to_le_bytes());
        hasher.update(&encoded);
        let hash = hasher.finalize();

        debug!(
            "state hash at sequence {}: {} ({} bytes)",
            state.sequence,
            hash.to_hex(),
            encoded.len()
        );
        Ok(*hash.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VerificationResult;
    use agritoken_core::id::AccountId;
    use agritoken_core::objects::{AdminRegistry, StateCommitment};
    use agritoken_core::policy::{AdminRule, PolicyProfile};

    fn state() -> ContractState {
        ContractState::new(
            AccountId::derive(&[b"contract"]),
            AdminRegistry::single(AccountId::from_label("admin")).unwrap(),
            PolicyProfile::Minimal,
            AdminRule::PrimaryOnly,
        )
    }

    fn chain(engine: &Blake3CommitmentEngine, len: u64) -> Vec<StateCommitment> {
        let mut state = state();
        let mut commitments: Vec<StateCommitment> = Vec::new();
        for seq in 0..len {
            state.sequence = seq;
            state
                .deny_list
                .add(AccountId::from_label(&format!("d{}", seq)), AccountId::default(), seq);
            let c = engine.commit(&state, commitments.last()).unwrap();
            commitments.push(c);
        }
        commitments
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let engine = Blake3CommitmentEngine::new();
        let mut s = state();
        let before = engine.state_hash(&s).unwrap();
        assert_eq!(before, engine.state_hash(&s.clone()).unwrap());

        s.deny_list.add(AccountId::from_label("x"), AccountId::default(), 0);
        assert_ne!(before, engine.state_hash(&s).unwrap());
    }

    #[test]
    fn test_verify_state() {
        let engine = Blake3CommitmentEngine::new();
        let mut s = state();
        let c = engine.commit(&s, None).unwrap();
        assert!(engine.verify_state(&s, &c).unwrap());

        s.sequence += 1;
        assert!(!engine.verify_state(&s, &c).unwrap());
    }

    #[test]
    fn test_chain_verification() {
        let engine = Blake3CommitmentEngine::new();
        let commitments = chain(&engine, 5);
        assert_eq!(engine.verify_chain(&commitments), VerificationResult::Valid);
        assert!(commitments[0].prev_commitment_hash.is_none());

        assert!(matches!(
            engine.verify_chain(&[]),
            VerificationResult::MissingData(_)
        ));

        let mut gap = commitments.clone();
        gap.remove(2);
        assert!(matches!(engine.verify_chain(&gap), VerificationResult::Invalid(_)));

        let mut tampered = commitments.clone();
        tampered[1].state_hash = [7; 32];
        assert!(matches!(
            engine.verify_chain(&tampered),
            VerificationResult::Invalid(_)
        ));

        let mut unlinked = commitments;
        unlinked[3].prev_commitment_hash = None;
        assert!(!engine.verify_chain(&unlinked).is_valid());
    }
}
