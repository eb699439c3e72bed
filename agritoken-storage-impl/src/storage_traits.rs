use agritoken_core::error::StorageError;
use agritoken_core::objects::{ContractState, StateCommitment};
use agritoken_core::transaction::{TransactionHash, TransactionReceipt};
use serde::{Deserialize, Serialize};
use std::iter::Iterator;
use std::path::Path;

/// Iterator for traversing transaction receipts in storage
pub trait ReceiptIterator: Iterator<Item = Result<TransactionReceipt, StorageError>> {}

/// Persistent home of the contract state and its transaction history.
///
/// The ledger executes one transaction at a time, so implementations only
/// need `commit` to be atomic with respect to crashes, not to concurrent
/// writers.
pub trait ContractStorage {
    /// Load the saved contract state, `None` before deployment
    fn load_state(&self) -> Result<Option<ContractState>, StorageError>;

    /// Latest state commitment, `None` before deployment
    fn latest_commitment(&self) -> Result<Option<StateCommitment>, StorageError>;

    /// Atomically save the state, its commitment and (optionally) the
    /// receipt of the transaction that produced it
    ///
    /// # Parameters
    /// * `state` - The new contract state
    /// * `commitment` - Commitment to `state`
    /// * `receipt` - Receipt of the committing transaction; `None` at deployment
    ///
    /// # Returns
    /// Ok(()) if everything was written, Err otherwise (nothing written)
    fn commit(
        &self,
        state: &ContractState,
        commitment: &StateCommitment,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<(), StorageError>;

    /// Store a receipt without touching the state (rejected transactions)
    fn store_receipt(&self, receipt: &TransactionReceipt) -> Result<(), StorageError>;

    /// Get a transaction receipt by transaction hash
    ///
    /// # Parameters
    /// * `hash` - The transaction hash to get the receipt for
    ///
    /// # Returns
    /// Some(receipt) if found, None otherwise
    fn get_receipt(&self, hash: &TransactionHash)
        -> Result<Option<TransactionReceipt>, StorageError>;

    /// All receipts in the order they were stored
    fn receipts(&self) -> Box<dyn ReceiptIterator + '_>;

    /// All state commitments in ascending sequence order
    fn commitments(&self) -> Result<Vec<StateCommitment>, StorageError>;
}

/// A write-ahead log entry for an executed transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WALEntry {
    /// The receipt being recorded
    pub receipt: TransactionReceipt,

    /// Timestamp (milliseconds) of when this entry was written
    pub timestamp: i64,
}

/// Append-only log of receipts and commitments, written before storage
pub trait ReceiptWriteAheadLog {
    /// Initialize the write-ahead log
    ///
    /// # Parameters
    /// * `path` - The file path for the write-ahead log
    ///
    /// # Returns
    /// Ok(()) if successful, Err otherwise
    fn init(&self, path: &Path) -> Result<(), StorageError>;

    /// Record a transaction receipt
    fn record_receipt(&self, receipt: &TransactionReceipt) -> Result<(), StorageError>;

    /// Record a state commitment
    fn record_commitment(&self, commitment: &StateCommitment) -> Result<(), StorageError>;

    /// Get an iterator over all receipt entries
    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<WALEntry, StorageError>> + '_>;

    /// Get an iterator over all recorded commitments
    fn iterate_commitments(
        &self,
    ) -> Box<dyn Iterator<Item = Result<StateCommitment, StorageError>> + '_>;
}
