pub mod memory;
pub mod storage_traits;
pub mod wal;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "rocksdb")]
pub mod rocksdb_storage;

// Re-export the main types for convenience
pub use storage_traits::{ContractStorage, ReceiptIterator, ReceiptWriteAheadLog, WALEntry};

pub use memory::InMemoryStorage;
pub use wal::FileWriteAheadLog;

// Re-export the storage implementations
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "rocksdb")]
pub use rocksdb_storage::RocksDbStorage;
