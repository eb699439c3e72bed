#![cfg(feature = "sqlite")]

use crate::storage_traits::{ContractStorage, ReceiptIterator};
use agritoken_core::error::StorageError;
use agritoken_core::objects::{ContractState, StateCommitment};
use agritoken_core::transaction::{CommitmentLevel, TransactionHash, TransactionReceipt};
use anyhow::Context;
use log::debug;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::runtime::Runtime;

/// Number of receipts fetched per query while iterating
const RECEIPT_PAGE_SIZE: i64 = 64;

/// A SQLite-based implementation of the ContractStorage interface using sqlx.
pub struct SqliteStorage {
    pool: SqlitePool,
    rt: Arc<Runtime>,
    db_path: PathBuf,
}

/// Iterator over transaction receipts in insertion order
pub struct SqliteReceiptIterator {
    pool: SqlitePool,
    rt: Arc<Runtime>,
    buffer: VecDeque<Vec<u8>>,
    current_index: i64,
    exhausted: bool,
}

impl SqliteStorage {
    /// Opens (or creates) a SQLite database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db_path = path.as_ref().to_path_buf();
        let db_url = format!("sqlite:{}", db_path.to_string_lossy());

        // Create a runtime for async operations
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(Arc::new)
            .map_err(|e| StorageError::Other(format!("Failed to create runtime: {}", e)))?;

        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| StorageError::Database(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = rt
            .block_on(async {
                SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect_with(options)
                    .await
            })
            .map_err(|e| StorageError::Database(format!("Failed to connect to database: {}", e)))?;

        rt.block_on(Self::initialize_schema(&pool)).map_err(|e| {
            StorageError::Database(format!("Failed to initialize database schema: {}", e))
        })?;

        debug!("opened sqlite contract storage at {}", db_path.display());
        Ok(Self { pool, rt, db_path })
    }

    /// Creates the necessary tables in the database
    async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        // Single row holding the current contract state
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contract_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                sequence INTEGER NOT NULL,
                state_data BLOB NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS state_commitments (
                sequence INTEGER PRIMARY KEY,
                state_hash BLOB NOT NULL,
                commitment_data BLOB NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // `id` keeps the insertion order of receipts
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transaction_receipts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_hash BLOB NOT NULL UNIQUE,
                sequence INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                success INTEGER NOT NULL,
                commitment_level INTEGER NOT NULL,
                error_message TEXT,
                receipt_data BLOB NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transaction_receipts_sequence
             ON transaction_receipts(sequence)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Insert a receipt, replacing the data of an earlier receipt with the
    /// same hash while keeping its position
    async fn upsert_receipt(
        conn: &mut SqliteConnection,
        receipt: &TransactionReceipt,
    ) -> Result<(), StorageError> {
        let receipt_data = bincode::serialize(receipt).with_context(|| {
            format!(
                "Failed to serialize receipt for transaction hash {:?}",
                receipt.transaction_hash
            )
        })?;

        let commitment_level_int: i64 = match receipt.commitment_level {
            CommitmentLevel::Processing => 0,
            CommitmentLevel::Committed => 1,
            CommitmentLevel::Failed => 2,
        };

        sqlx::query(
            "INSERT INTO transaction_receipts
            (transaction_hash, sequence, timestamp, success, commitment_level, error_message, receipt_data)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(transaction_hash) DO UPDATE SET
                sequence = excluded.sequence,
                timestamp = excluded.timestamp,
                success = excluded.success,
                commitment_level = excluded.commitment_level,
                error_message = excluded.error_message,
                receipt_data = excluded.receipt_data",
        )
        .bind(receipt.transaction_hash.as_ref())
        .bind(receipt.sequence as i64)
        .bind(receipt.timestamp)
        .bind(if receipt.success { 1i64 } else { 0i64 })
        .bind(commitment_level_int)
        .bind(receipt.error_message.as_ref())
        .bind(&receipt_data)
        .execute(&mut *conn)
        .await
        .with_context(|| {
            format!(
                "Failed to store receipt for transaction hash {:?}",
                receipt.transaction_hash
            )
        })?;

        Ok(())
    }
}

impl ContractStorage for SqliteStorage {
    fn load_state(&self) -> Result<Option<ContractState>, StorageError> {
        self.rt.block_on(async {
            let row = sqlx::query("SELECT state_data FROM contract_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .with_context(|| "Failed to fetch contract state")?;

            match row {
                Some(row) => {
                    let data: Vec<u8> = row.get("state_data");
                    ContractState::decode(&data).map(Some)
                }
                None => Ok(None),
            }
        })
    }

    fn latest_commitment(&self) -> Result<Option<StateCommitment>, StorageError> {
        self.rt.block_on(async {
            let row = sqlx::query(
                "SELECT commitment_data FROM state_commitments ORDER BY sequence DESC LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await
            .with_context(|| "Failed to fetch latest commitment")?;

            match row {
                Some(row) => {
                    let data: Vec<u8> = row.get("commitment_data");
                    Ok(Some(bincode::deserialize(&data)?))
                }
                None => Ok(None),
            }
        })
    }

    fn commit(
        &self,
        state: &ContractState,
        commitment: &StateCommitment,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<(), StorageError> {
        let state_data = state.encode()?;
        let commitment_data = bincode::serialize(commitment)?;

        self.rt.block_on(async {
            // Use a transaction to ensure atomicity
            let mut tx = self
                .pool
                .begin()
                .await
                .with_context(|| "Failed to start database transaction")?;

            sqlx::query(
                "INSERT OR REPLACE INTO contract_state (id, sequence, state_data) VALUES (1, ?, ?)",
            )
            .bind(state.sequence as i64)
            .bind(&state_data)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to store state at sequence {}", state.sequence))?;

            sqlx::query(
                "INSERT OR REPLACE INTO state_commitments (sequence, state_hash, commitment_data)
                 VALUES (?, ?, ?)",
            )
            .bind(commitment.sequence as i64)
            .bind(commitment.state_hash.as_ref())
            .bind(&commitment_data)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!("Failed to store commitment at sequence {}", commitment.sequence)
            })?;

            if let Some(receipt) = receipt {
                Self::upsert_receipt(&mut *tx, receipt).await?;
            }

            tx.commit().await.with_context(|| {
                format!("Failed to commit state at sequence {}", state.sequence)
            })?;

            Ok(())
        })
    }

    fn store_receipt(&self, receipt: &TransactionReceipt) -> Result<(), StorageError> {
        self.rt.block_on(async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .with_context(|| "Failed to acquire database connection")?;
            Self::upsert_receipt(&mut *conn, receipt).await
        })
    }

    fn get_receipt(
        &self,
        hash: &TransactionHash,
    ) -> Result<Option<TransactionReceipt>, StorageError> {
        self.rt.block_on(async {
            let row = sqlx::query(
                "SELECT receipt_data FROM transaction_receipts WHERE transaction_hash = ?",
            )
            .bind(hash.as_ref())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch receipt for transaction hash {:?}", hash))?;

            let Some(row) = row else {
                return Ok(None);
            };

            let receipt_data: Vec<u8> = row.get("receipt_data");
            let receipt: TransactionReceipt = bincode::deserialize(&receipt_data)
                .with_context(|| {
                    format!("Failed to deserialize receipt for transaction hash {:?}", hash)
                })?;

            Ok(Some(receipt))
        })
    }

    fn receipts(&self) -> Box<dyn ReceiptIterator + '_> {
        Box::new(SqliteReceiptIterator {
            pool: self.pool.clone(),
            rt: self.rt.clone(),
            buffer: VecDeque::new(),
            current_index: 0,
            exhausted: false,
        })
    }

    fn commitments(&self) -> Result<Vec<StateCommitment>, StorageError> {
        self.rt.block_on(async {
            let rows = sqlx::query(
                "SELECT commitment_data FROM state_commitments ORDER BY sequence ASC",
            )
            .fetch_all(&self.pool)
            .await
            .with_context(|| "Failed to fetch state commitments")?;

            rows.iter()
                .map(|row| {
                    let data: Vec<u8> = row.get("commitment_data");
                    bincode::deserialize(&data).map_err(StorageError::from)
                })
                .collect()
        })
    }
}

impl SqliteReceiptIterator {
    fn fetch_page(&mut self) -> Result<(), StorageError> {
        let rows = self.rt.block_on(async {
            sqlx::query(
                "SELECT receipt_data FROM transaction_receipts ORDER BY id ASC LIMIT ? OFFSET ?",
            )
            .bind(RECEIPT_PAGE_SIZE)
            .bind(self.current_index)
            .fetch_all(&self.pool)
            .await
        })?;

        if (rows.len() as i64) < RECEIPT_PAGE_SIZE {
            self.exhausted = true;
        }
        self.current_index += rows.len() as i64;
        for row in &rows {
            let receipt_data: Vec<u8> = row.get("receipt_data");
            self.buffer.push_back(receipt_data);
        }
        Ok(())
    }
}

impl Iterator for SqliteReceiptIterator {
    type Item = Result<TransactionReceipt, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }

        let receipt_data = self.buffer.pop_front()?;
        Some(bincode::deserialize(&receipt_data).map_err(|e| {
            StorageError::Serialization(format!("Failed to deserialize transaction receipt: {}", e))
        }))
    }
}

impl ReceiptIterator for SqliteReceiptIterator {}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("db_path", &self.db_path)
            .finish()
    }
}
