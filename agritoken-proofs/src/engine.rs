use agritoken_core::error::StorageError;
use agritoken_core::objects::{ContractState, StateCommitment};

/// Represents the result of verifying a commitment chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// The commitment chain is valid
    Valid,

    /// The commitment chain is invalid for the specified reason
    Invalid(String),

    /// Missing data needed to complete verification
    MissingData(String),
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid)
    }
}

/// Interface for state commitment schemes
///
/// A CommitmentEngine binds each committed contract state to a hash and links
/// it to the commitment before it, so that a receipt history can be checked
/// for gaps, reordering or tampering.
pub trait CommitmentEngine {
    /// Hash of the encoded contract state
    fn state_hash(&self, state: &ContractState) -> Result<[u8; 32], StorageError>;

    /// Commit to `state`, linking to `prev` when there is one
    ///
    /// # Parameters
    /// * `state` - The state after the transaction
    /// * `prev` - The latest commitment before the transaction, if any
    ///
    /// # Returns
    /// A commitment at `state.sequence`
    fn commit(
        &self,
        state: &ContractState,
        prev: Option<&StateCommitment>,
    ) -> Result<StateCommitment, StorageError> {
        Ok(StateCommitment {
            sequence: state.sequence,
            state_hash: self.state_hash(state)?,
            prev_commitment_hash: prev.map(StateCommitment::hash),
        })
    }

    /// Verify that a commitment matches a state
    fn verify_state(
        &self,
        state: &ContractState,
        commitment: &StateCommitment,
    ) -> Result<bool, StorageError> {
        Ok(state.sequence == commitment.sequence
            && self.state_hash(state)? == commitment.state_hash)
    }

    /// Verify a run of commitments in ascending sequence order
    ///
    /// Each commitment must follow its predecessor by exactly one sequence
    /// number and reference its hash.
    fn verify_chain(&self, commitments: &[StateCommitment]) -> VerificationResult {
        if commitments.is_empty() {
            return VerificationResult::MissingData("No commitments provided".to_string());
        }

        for pair in commitments.windows(2) {
            let (prev, current) = (&pair[0], &pair[1]);

            if current.sequence != prev.sequence + 1 {
                return VerificationResult::Invalid(format!(
                    "Sequence gap between {} and {}",
                    prev.sequence, current.sequence
                ));
            }

            match current.prev_commitment_hash {
                Some(hash) if hash == prev.hash() => {}
                Some(_) => {
                    return VerificationResult::Invalid(format!(
                        "Commitment chain broken between sequences {} and {}",
                        prev.sequence, current.sequence
                    ))
                }
                None => {
                    return VerificationResult::Invalid(format!(
                        "Commitment at sequence {} does not reference its predecessor",
                        current.sequence
                    ))
                }
            }
        }

        VerificationResult::Valid
    }
}
