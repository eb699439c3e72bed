use crate::storage_traits::{ReceiptWriteAheadLog, WALEntry};
use agritoken_core::error::StorageError;
use agritoken_core::objects::StateCommitment;
use agritoken_core::transaction::TransactionReceipt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Record kinds, length-prefixed and bincode-encoded on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
enum WALEntryType {
    /// An executed transaction
    Receipt(WALEntry),

    /// Commitment to the state a transaction produced
    Commitment(StateCommitment),
}

/// Append-only receipt and commitment log in a single file.
///
/// Entries are flushed one by one; a torn trailing entry ends iteration.
pub struct FileWriteAheadLog {
    path: Arc<Mutex<PathBuf>>,

    /// `None` until `init`
    file: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl Default for FileWriteAheadLog {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWriteAheadLog {
    /// Unopened log; call `init` before recording
    pub fn new() -> Self {
        Self {
            path: Arc::new(Mutex::new(PathBuf::new())),
            file: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a WAL and open `path` in one step
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let wal = Self::new();
        wal.init(path)?;
        Ok(wal)
    }

    /// Append one length-prefixed entry and flush it
    fn append(&self, entry: &WALEntryType) -> Result<(), StorageError> {
        let mut file_guard = self
            .file
            .lock()
            .map_err(|e| StorageError::WAL(format!("Failed to acquire lock: {}", e)))?;

        let file = file_guard
            .as_mut()
            .ok_or_else(|| StorageError::WAL("WAL has not been initialized".to_string()))?;

        let serialized = bincode::serialize(entry)?;

        let entry_len = serialized.len() as u64;
        file.write_all(&entry_len.to_le_bytes())?;
        file.write_all(&serialized)?;
        file.flush()?;

        Ok(())
    }

    fn reader(&self) -> Option<WALEntryIterator> {
        let path = self.path.lock().ok()?.clone();
        File::open(path).ok().map(|file| WALEntryIterator {
            reader: BufReader::new(file),
        })
    }
}

impl ReceiptWriteAheadLog for FileWriteAheadLog {
    fn init(&self, path: &Path) -> Result<(), StorageError> {
        let mut file_guard = self
            .file
            .lock()
            .map_err(|e| StorageError::WAL(format!("Failed to acquire lock: {}", e)))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)
            .map_err(|e| StorageError::WAL(format!("Failed to open WAL file: {}", e)))?;

        *file_guard = Some(BufWriter::new(file));

        let mut path_guard = self
            .path
            .lock()
            .map_err(|e| StorageError::WAL(format!("Failed to acquire path lock: {}", e)))?;
        *path_guard = path.to_path_buf();

        Ok(())
    }

    fn record_receipt(&self, receipt: &TransactionReceipt) -> Result<(), StorageError> {
        let entry = WALEntry {
            receipt: receipt.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.append(&WALEntryType::Receipt(entry))
    }

    fn record_commitment(&self, commitment: &StateCommitment) -> Result<(), StorageError> {
        self.append(&WALEntryType::Commitment(commitment.clone()))
    }

    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<WALEntry, StorageError>> + '_> {
        match self.reader() {
            Some(iter) => Box::new(iter.filter_map(|entry| match entry {
                Ok(WALEntryType::Receipt(entry)) => Some(Ok(entry)),
                Ok(WALEntryType::Commitment(_)) => None,
                Err(e) => Some(Err(e)),
            })),
            // Nothing recorded yet
            None => Box::new(std::iter::empty()),
        }
    }

    fn iterate_commitments(
        &self,
    ) -> Box<dyn Iterator<Item = Result<StateCommitment, StorageError>> + '_> {
        match self.reader() {
            Some(iter) => Box::new(iter.filter_map(|entry| match entry {
                Ok(WALEntryType::Commitment(c)) => Some(Ok(c)),
                Ok(WALEntryType::Receipt(_)) => None,
                Err(e) => Some(Err(e)),
            })),
            None => Box::new(std::iter::empty()),
        }
    }
}

/// Iterator over raw WAL entries
struct WALEntryIterator {
    reader: BufReader<File>,
}

impl Iterator for WALEntryIterator {
    type Item = Result<WALEntryType, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut len_buf = [0u8; 8];
        match self.reader.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return None;
            }
            Err(e) => {
                return Some(Err(StorageError::from(e)));
            }
        }

        let entry_len = u64::from_le_bytes(len_buf);

        let mut entry_data = vec![0u8; entry_len as usize];
        match self.reader.read_exact(&mut entry_data) {
            Ok(_) => {}
            // Torn write at the tail
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return None,
            Err(e) => return Some(Err(StorageError::from(e))),
        }

        Some(bincode::deserialize(&entry_data).map_err(StorageError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agritoken_core::policy::OperationKind;
    use agritoken_core::transaction::OperationOutcome;
    use tempfile::tempdir;

    fn commitment(sequence: u64) -> StateCommitment {
        StateCommitment {
            sequence,
            state_hash: [sequence as u8; 32],
            prev_commitment_hash: None,
        }
    }

    fn receipt(seed: u8) -> TransactionReceipt {
        let mut receipt = TransactionReceipt::new([seed; 32], OperationKind::Burn, 0, 0);
        receipt.commit(
            OperationOutcome::SupplyChanged { total_supply: 1 },
            commitment(seed as u64),
        );
        receipt
    }

    #[test]
    fn test_wal_receipts() {
        let temp_dir = tempdir().unwrap();
        let wal_path = temp_dir.path().join("test.wal");

        let wal = FileWriteAheadLog::new();
        wal.init(&wal_path).unwrap();

        wal.record_receipt(&receipt(1)).unwrap();
        wal.record_receipt(&receipt(2)).unwrap();

        let entries: Vec<_> = wal
            .iterate_entries()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].receipt.transaction_hash, [1; 32]);
        assert_eq!(entries[1].receipt.transaction_hash, [2; 32]);
        assert!(entries[0].timestamp > 0);
    }

    #[test]
    fn test_wal_commitments_are_kept_apart() {
        let temp_dir = tempdir().unwrap();
        let wal_path = temp_dir.path().join("test.wal");

        let wal = FileWriteAheadLog::open(&wal_path).unwrap();
        wal.record_commitment(&commitment(0)).unwrap();
        wal.record_receipt(&receipt(1)).unwrap();
        wal.record_commitment(&commitment(1)).unwrap();

        assert_eq!(wal.iterate_entries().count(), 1);

        let commitments: Vec<_> = wal
            .iterate_commitments()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(commitments, vec![commitment(0), commitment(1)]);
    }

    #[test]
    fn test_wal_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let wal_path = temp_dir.path().join("test.wal");

        {
            let wal = FileWriteAheadLog::open(&wal_path).unwrap();
            wal.record_receipt(&receipt(7)).unwrap();
        }

        let wal = FileWriteAheadLog::open(&wal_path).unwrap();
        wal.record_receipt(&receipt(8)).unwrap();
        assert_eq!(wal.iterate_entries().count(), 2);
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let temp_dir = tempdir().unwrap();
        let wal_path = temp_dir.path().join("test.wal");

        {
            let wal = FileWriteAheadLog::open(&wal_path).unwrap();
            wal.record_receipt(&receipt(1)).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&100u64.to_le_bytes()).unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        drop(file);

        let wal = FileWriteAheadLog::open(&wal_path).unwrap();
        let entries: Vec<_> = wal
            .iterate_entries()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_uninitialized_wal() {
        let wal = FileWriteAheadLog::new();
        assert!(matches!(
            wal.record_receipt(&receipt(1)),
            Err(StorageError::WAL(_))
        ));
        assert_eq!(wal.iterate_entries().count(), 0);
    }
}
