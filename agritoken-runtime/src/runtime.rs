use crate::config::DeploymentConfig;
use crate::registry::AssetRegistry;
use crate::tokenizer::Tokenizer;
use agritoken_core::error::{StorageError, TokenizerError};
use agritoken_core::id::AccountId;
use agritoken_core::objects::{
    AdminRegistry, ContractInfo, ContractState, DenyListEntry, StateCommitment,
};
use agritoken_core::transaction::{Transaction, TransactionHash, TransactionReceipt};
use agritoken_proofs::{Blake3CommitmentEngine, CommitmentEngine, VerificationResult};
use agritoken_storage_impl::storage_traits::{ContractStorage, ReceiptWriteAheadLog};
use log::{debug, info, warn};

/// Executes ledger transactions against persisted contract state.
///
/// Each `execute` loads the state, runs the `Tokenizer` on it, and either
/// saves the new state together with its commitment and receipt, or records
/// only the failed receipt and leaves state and registry as they were.
pub struct TokenizerRuntime<S: ContractStorage, R: AssetRegistry> {
    storage: S,
    registry: R,
    engine: Blake3CommitmentEngine,
    wal: Option<Box<dyn ReceiptWriteAheadLog>>,
}

impl<S: ContractStorage, R: AssetRegistry> TokenizerRuntime<S, R> {
    /// Deploy a contract into `storage`, or resume the one already there.
    ///
    /// A resumed contract keeps its stored admin registry and profile; the
    /// configuration only seeds a fresh deployment.
    pub fn deploy(
        config: &DeploymentConfig,
        storage: S,
        registry: R,
    ) -> Result<Self, TokenizerError> {
        config.validate()?;
        let engine = Blake3CommitmentEngine::new();

        match storage.load_state()? {
            Some(state) => {
                if state.contract_id != config.contract_id() {
                    warn!(
                        "storage holds contract {}, not {}; resuming the stored one",
                        state.contract_id,
                        config.contract_id()
                    );
                }
                info!(
                    "resuming contract {} at sequence {}",
                    state.contract_id, state.sequence
                );
            }
            None => {
                let state = ContractState::new(
                    config.contract_id(),
                    config.admin_registry()?,
                    config.profile,
                    config.admin_rule,
                );
                let commitment = engine.commit(&state, None)?;
                storage.commit(&state, &commitment, None)?;
                info!(
                    "deployed contract {} with {} admins, threshold {}, {:?} profile",
                    state.contract_id,
                    state.admins.len(),
                    state.admins.threshold(),
                    state.profile
                );
            }
        }

        Ok(Self {
            storage,
            registry,
            engine,
            wal: None,
        })
    }

    /// Mirror every stored receipt and commitment into `wal`
    pub fn with_wal(mut self, wal: impl ReceiptWriteAheadLog + 'static) -> Self {
        self.wal = Some(Box::new(wal));
        self
    }

    /// Execute one transaction.
    ///
    /// Contract-level failures are reported in the receipt; only a storage
    /// failure is returned as an error. If the storage commit fails nothing
    /// is saved and nothing reaches the WAL. The WAL only records what
    /// storage already holds, so a WAL failure after a successful commit is
    /// returned with the state left committed.
    pub fn execute(&mut self, tx: &Transaction) -> Result<TransactionReceipt, StorageError> {
        let mut state = self.state()?;
        let prev = self.storage.latest_commitment()?;
        let kind = tx.operation.kind();
        if let Some(earlier) = self.storage.get_receipt(tx.hash())? {
            warn!(
                "{} {} reuses a hash first seen at sequence {}, replacing its receipt",
                kind,
                hex::encode(&tx.hash()[..4]),
                earlier.sequence
            );
        }
        let mut receipt = TransactionReceipt::new(
            *tx.hash(),
            kind,
            state.sequence,
            chrono::Utc::now().timestamp(),
        );

        let snapshot = self.registry.snapshot();
        let result = Tokenizer::new(&mut state, &mut self.registry).execute(tx);

        match result {
            Ok(outcome) => {
                let commitment = match self.engine.commit(&state, prev.as_ref()) {
                    Ok(commitment) => commitment,
                    Err(e) => {
                        self.registry.restore(snapshot);
                        return Err(e);
                    }
                };
                receipt.commit(outcome, commitment.clone());

                if let Err(e) = self.storage.commit(&state, &commitment, Some(&receipt)) {
                    self.registry.restore(snapshot);
                    return Err(e);
                }
                self.log_committed(&commitment, &receipt)?;

                info!(
                    "{} {} committed at sequence {}",
                    kind,
                    hex::encode(&tx.hash()[..4]),
                    state.sequence
                );
            }
            Err(e) => {
                warn!(
                    "{} {} rejected: {:?}: {}",
                    kind,
                    hex::encode(&tx.hash()[..4]),
                    e.kind(),
                    e
                );
                receipt.set_error(&e, prev);
                self.storage.store_receipt(&receipt)?;
                if let Some(wal) = &self.wal {
                    wal.record_receipt(&receipt)?;
                }
            }
        }

        Ok(receipt)
    }

    fn log_committed(
        &self,
        commitment: &StateCommitment,
        receipt: &TransactionReceipt,
    ) -> Result<(), StorageError> {
        if let Some(wal) = &self.wal {
            wal.record_receipt(receipt)?;
            wal.record_commitment(commitment)?;
        }
        Ok(())
    }

    /// Current contract state
    pub fn state(&self) -> Result<ContractState, StorageError> {
        self.storage
            .load_state()?
            .ok_or_else(|| StorageError::NotFound("contract has not been deployed".to_string()))
    }

    pub fn is_denied(&self, account: &AccountId) -> Result<bool, StorageError> {
        Ok(self.state()?.deny_list.contains(account))
    }

    pub fn deny_list(&self) -> Result<Vec<DenyListEntry>, StorageError> {
        Ok(self.state()?.deny_list.into())
    }

    /// Current pointer and version, `None` before `create_unit`
    pub fn get_metadata_pointer(&self) -> Result<Option<(String, u64)>, StorageError> {
        Ok(self
            .state()?
            .metadata
            .get()
            .map(|(cid, version)| (cid.to_string(), version)))
    }

    pub fn metadata_url(&self) -> Result<Option<String>, StorageError> {
        Ok(self.state()?.metadata.pointer().map(|p| p.url()))
    }

    pub fn get_contract_info(&self) -> Result<ContractInfo, StorageError> {
        Ok(self.state()?.info())
    }

    pub fn balance_of(&self, account: &AccountId) -> Result<u64, TokenizerError> {
        let state = self.state()?;
        match &state.unit_class {
            Some(class) => Ok(self.registry.balance(&class.id, account)?),
            None => Ok(0),
        }
    }

    pub fn admin_registry(&self) -> Result<AdminRegistry, StorageError> {
        Ok(self.state()?.admins)
    }

    pub fn receipt(&self, hash: &TransactionHash) -> Result<Option<TransactionReceipt>, StorageError> {
        self.storage.get_receipt(hash)
    }

    /// All receipts in execution order
    pub fn receipts(&self) -> Result<Vec<TransactionReceipt>, StorageError> {
        self.storage.receipts().collect()
    }

    /// Check the commitment chain and that the stored state matches its
    /// latest commitment
    pub fn verify_history(&self) -> Result<VerificationResult, StorageError> {
        let commitments = self.storage.commitments()?;
        let result = self.engine.verify_chain(&commitments);
        if !result.is_valid() {
            return Ok(result);
        }

        let state = self.state()?;
        let Some(latest) = commitments.last() else {
            return Ok(VerificationResult::MissingData("No commitments stored".to_string()));
        };
        if commitments[0].prev_commitment_hash.is_some() {
            return Ok(VerificationResult::Invalid(
                "Deployment commitment references a predecessor".to_string(),
            ));
        }
        if !self.engine.verify_state(&state, latest)? {
            return Ok(VerificationResult::Invalid(format!(
                "Stored state does not match commitment at sequence {}",
                latest.sequence
            )));
        }

        debug!("verified {} commitments", commitments.len());
        Ok(VerificationResult::Valid)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Give back the storage and registry, e.g. to redeploy over them
    pub fn into_parts(self) -> (S, R) {
        (self.storage, self.registry)
    }
}
