use crate::storage_traits::{ContractStorage, ReceiptIterator};
use agritoken_core::error::StorageError;
use agritoken_core::objects::{ContractState, StateCommitment};
use agritoken_core::transaction::{TransactionHash, TransactionReceipt};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Receipts collected up front and handed out one at a time
pub(crate) struct VecReceiptIterator {
    receipts: std::vec::IntoIter<TransactionReceipt>,
}

impl VecReceiptIterator {
    pub(crate) fn new(receipts: Vec<TransactionReceipt>) -> Self {
        Self {
            receipts: receipts.into_iter(),
        }
    }
}

impl Iterator for VecReceiptIterator {
    type Item = Result<TransactionReceipt, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receipts.next().map(Ok)
    }
}

impl ReceiptIterator for VecReceiptIterator {}

/// Yields a single error; used when a backend cannot start iterating
pub(crate) struct FailedReceiptIterator(Option<StorageError>);

impl FailedReceiptIterator {
    pub(crate) fn new(err: StorageError) -> Self {
        Self(Some(err))
    }
}

impl Iterator for FailedReceiptIterator {
    type Item = Result<TransactionReceipt, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.take().map(Err)
    }
}

impl ReceiptIterator for FailedReceiptIterator {}

#[derive(Default)]
struct Inner {
    state: Option<Vec<u8>>,
    commitments: Vec<StateCommitment>,
    receipts: Vec<TransactionReceipt>,
    receipt_index: HashMap<TransactionHash, usize>,
}

impl Inner {
    fn put_receipt(&mut self, receipt: &TransactionReceipt) {
        match self.receipt_index.get(&receipt.transaction_hash) {
            Some(&pos) => self.receipts[pos] = receipt.clone(),
            None => {
                self.receipt_index
                    .insert(receipt.transaction_hash, self.receipts.len());
                self.receipts.push(receipt.clone());
            }
        }
    }
}

/// Process-local storage, the default for tests and simulations.
///
/// The state is kept in its encoded form so a load always returns a fresh
/// copy, just like the on-disk backends.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Other(format!("Failed to acquire lock: {}", e)))
    }
}

impl ContractStorage for InMemoryStorage {
    fn load_state(&self) -> Result<Option<ContractState>, StorageError> {
        let inner = self.lock()?;
        inner
            .state
            .as_deref()
            .map(ContractState::decode)
            .transpose()
    }

    fn latest_commitment(&self) -> Result<Option<StateCommitment>, StorageError> {
        Ok(self.lock()?.commitments.last().cloned())
    }

    fn commit(
        &self,
        state: &ContractState,
        commitment: &StateCommitment,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<(), StorageError> {
        // Encode before taking the lock so a failure leaves nothing half written
        let encoded = state.encode()?;

        let mut inner = self.lock()?;
        inner.state = Some(encoded);
        inner.commitments.push(commitment.clone());
        if let Some(receipt) = receipt {
            inner.put_receipt(receipt);
        }
        Ok(())
    }

    fn store_receipt(&self, receipt: &TransactionReceipt) -> Result<(), StorageError> {
        self.lock()?.put_receipt(receipt);
        Ok(())
    }

    fn get_receipt(
        &self,
        hash: &TransactionHash,
    ) -> Result<Option<TransactionReceipt>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .receipt_index
            .get(hash)
            .map(|&pos| inner.receipts[pos].clone()))
    }

    fn receipts(&self) -> Box<dyn ReceiptIterator + '_> {
        match self.lock() {
            Ok(inner) => Box::new(VecReceiptIterator::new(inner.receipts.clone())),
            Err(e) => Box::new(FailedReceiptIterator::new(e)),
        }
    }

    fn commitments(&self) -> Result<Vec<StateCommitment>, StorageError> {
        Ok(self.lock()?.commitments.clone())
    }
}
