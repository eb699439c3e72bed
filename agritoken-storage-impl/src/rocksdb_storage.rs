#![cfg(feature = "rocksdb")]

use crate::memory::{FailedReceiptIterator, VecReceiptIterator};
use crate::storage_traits::{ContractStorage, ReceiptIterator};
use agritoken_core::error::StorageError;
use agritoken_core::objects::{ContractState, StateCommitment};
use agritoken_core::transaction::{TransactionHash, TransactionReceipt};
use anyhow::Context;
use log::debug;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

// Column family names used to organize different types of data
const CF_STATE: &str = "contract_state";
const CF_COMMITMENTS: &str = "state_commitments";
const CF_TRANSACTION_RECEIPTS: &str = "transaction_receipts";
const CF_RECEIPT_ORDER: &str = "receipt_order";

/// Key of the current state inside `CF_STATE`
const STATE_KEY: &[u8] = b"current";

/// RocksDB implementation of ContractStorage
///
/// Commitments are keyed by big-endian sequence and receipts get a
/// big-endian position in `receipt_order`, so plain forward iteration
/// yields both in the order the trait promises.
pub struct RocksDbStorage {
    db: Arc<DB>,
    db_path: PathBuf,
    /// Position the next new receipt gets in `receipt_order`
    next_receipt: Mutex<u64>,
}

impl RocksDbStorage {
    /// Creates a new RocksDB storage at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db_path = path.as_ref().to_path_buf();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_STATE, CF_COMMITMENTS, CF_TRANSACTION_RECEIPTS, CF_RECEIPT_ORDER]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, &db_path, descriptors)
            .with_context(|| format!("Failed to open RocksDB database at {:?}", db_path))?;

        let storage = Self {
            db: Arc::new(db),
            db_path,
            next_receipt: Mutex::new(0),
        };

        let next = storage.last_receipt_position()?.map_or(0, |pos| pos + 1);
        *storage.lock_counter()? = next;

        debug!(
            "opened rocksdb contract storage at {} ({} receipts)",
            storage.db_path.display(),
            next
        );
        Ok(storage)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::Database(format!("Column family {} not found", name)))
    }

    fn lock_counter(&self) -> Result<std::sync::MutexGuard<'_, u64>, StorageError> {
        self.next_receipt
            .lock()
            .map_err(|e| StorageError::Other(format!("Failed to acquire lock: {}", e)))
    }

    fn last_receipt_position(&self) -> Result<Option<u64>, StorageError> {
        let cf = self.cf(CF_RECEIPT_ORDER)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                let bytes: [u8; 8] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| StorageError::Database("Malformed receipt order key".into()))?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Stage a receipt into `batch`. Returns true when it takes a new
    /// position, in which case the caller bumps the counter after writing.
    fn stage_receipt(
        &self,
        batch: &mut WriteBatch,
        receipt: &TransactionReceipt,
        next_position: u64,
    ) -> Result<bool, StorageError> {
        let receipts_cf = self.cf(CF_TRANSACTION_RECEIPTS)?;
        let order_cf = self.cf(CF_RECEIPT_ORDER)?;

        let is_new = self
            .db
            .get_cf(receipts_cf, receipt.transaction_hash)?
            .is_none();

        let receipt_data = bincode::serialize(receipt).with_context(|| {
            format!(
                "Failed to serialize receipt for transaction hash {:?}",
                receipt.transaction_hash
            )
        })?;
        batch.put_cf(receipts_cf, receipt.transaction_hash, receipt_data);
        if is_new {
            batch.put_cf(order_cf, next_position.to_be_bytes(), receipt.transaction_hash);
        }
        Ok(is_new)
    }

    fn collect_receipts(&self) -> Result<Vec<TransactionReceipt>, StorageError> {
        let receipts_cf = self.cf(CF_TRANSACTION_RECEIPTS)?;
        let order_cf = self.cf(CF_RECEIPT_ORDER)?;

        let mut receipts = Vec::new();
        for item in self.db.iterator_cf(order_cf, IteratorMode::Start) {
            let (_, hash) = item?;
            let data = self.db.get_cf(receipts_cf, &hash)?.ok_or_else(|| {
                StorageError::NotFound(format!("Receipt {:?} missing from index", hash))
            })?;
            receipts.push(bincode::deserialize(&data)?);
        }
        Ok(receipts)
    }
}

impl ContractStorage for RocksDbStorage {
    fn load_state(&self) -> Result<Option<ContractState>, StorageError> {
        let cf = self.cf(CF_STATE)?;
        self.db
            .get_cf(cf, STATE_KEY)?
            .map(|data| ContractState::decode(&data))
            .transpose()
    }

    fn latest_commitment(&self) -> Result<Option<StateCommitment>, StorageError> {
        let cf = self.cf(CF_COMMITMENTS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (_, data) = item?;
                Ok(Some(bincode::deserialize(&data)?))
            }
            None => Ok(None),
        }
    }

    fn commit(
        &self,
        state: &ContractState,
        commitment: &StateCommitment,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<(), StorageError> {
        let mut counter = self.lock_counter()?;
        let mut batch = WriteBatch::default();

        batch.put_cf(self.cf(CF_STATE)?, STATE_KEY, state.encode()?);
        batch.put_cf(
            self.cf(CF_COMMITMENTS)?,
            commitment.sequence.to_be_bytes(),
            bincode::serialize(commitment)?,
        );

        let new_receipt = match receipt {
            Some(receipt) => self.stage_receipt(&mut batch, receipt, *counter)?,
            None => false,
        };

        self.db
            .write(batch)
            .with_context(|| format!("Failed to commit state at sequence {}", state.sequence))?;

        if new_receipt {
            *counter += 1;
        }
        Ok(())
    }

    fn store_receipt(&self, receipt: &TransactionReceipt) -> Result<(), StorageError> {
        let mut counter = self.lock_counter()?;
        let mut batch = WriteBatch::default();
        let new_receipt = self.stage_receipt(&mut batch, receipt, *counter)?;

        self.db.write(batch).with_context(|| {
            format!(
                "Failed to store receipt for transaction hash {:?}",
                receipt.transaction_hash
            )
        })?;

        if new_receipt {
            *counter += 1;
        }
        Ok(())
    }

    fn get_receipt(
        &self,
        hash: &TransactionHash,
    ) -> Result<Option<TransactionReceipt>, StorageError> {
        let cf = self.cf(CF_TRANSACTION_RECEIPTS)?;
        match self.db.get_cf(cf, hash)? {
            Some(data) => Ok(Some(bincode::deserialize(&data).with_context(|| {
                format!("Failed to deserialize receipt for transaction hash {:?}", hash)
            })?)),
            None => Ok(None),
        }
    }

    fn receipts(&self) -> Box<dyn ReceiptIterator + '_> {
        match self.collect_receipts() {
            Ok(receipts) => Box::new(VecReceiptIterator::new(receipts)),
            Err(e) => Box::new(FailedReceiptIterator::new(e)),
        }
    }

    fn commitments(&self) -> Result<Vec<StateCommitment>, StorageError> {
        let cf = self.cf(CF_COMMITMENTS)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| -> Result<StateCommitment, StorageError> {
                let (_, data) = item?;
                Ok(bincode::deserialize(&data)?)
            })
            .collect()
    }
}

impl Debug for RocksDbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbStorage")
            .field("db_path", &self.db_path)
            .finish()
    }
}
