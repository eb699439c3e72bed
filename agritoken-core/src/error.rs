use crate::id::AccountId;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Errors surfaced by contract operations.
///
/// Every failed precondition maps to its own variant so callers can tell
/// failures apart; none of them is ever recovered from inside the contract.
#[derive(Error, Debug)]
pub enum TokenizerError {
    /// The signer set does not satisfy the admin-only rule
    #[error("Unauthorized signer: {signer}")]
    Unauthorized { signer: AccountId },

    /// Fewer than M registry members signed a critical operation
    #[error("Insufficient signatures: {present} valid of {required} required")]
    InsufficientSignatures { present: usize, required: usize },

    /// Zero amount or an amount that would overflow the supply counter
    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),

    /// Burn amount exceeds the total supply
    #[error("Insufficient supply: requested {requested}, available {available}")]
    InsufficientSupply { requested: u64, available: u64 },

    /// The unit class has already been created
    #[error("Unit class already created")]
    AlreadyCreated,

    /// The unit class has not been created yet
    #[error("Unit class not created")]
    NotCreated,

    /// The transfer recipient is on the deny-list
    #[error("Recipient is blocked: {0}")]
    RecipientBlocked(AccountId),

    /// The metadata pointer failed the content-address format check
    #[error("Malformed metadata pointer: {0}")]
    MalformedPointer(String),

    /// Typed parameters failed boundary validation
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The asset-registry capability refused or failed the call
    #[error("Asset registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Loading or saving contract state failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Serializable tag for a `TokenizerError`, recorded in transaction receipts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    InsufficientSignatures,
    InvalidAmount,
    InsufficientSupply,
    AlreadyCreated,
    NotCreated,
    RecipientBlocked,
    MalformedPointer,
    InvalidParameters,
    Registry,
    Storage,
}

impl TokenizerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenizerError::Unauthorized { .. } => ErrorKind::Unauthorized,
            TokenizerError::InsufficientSignatures { .. } => ErrorKind::InsufficientSignatures,
            TokenizerError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            TokenizerError::InsufficientSupply { .. } => ErrorKind::InsufficientSupply,
            TokenizerError::AlreadyCreated => ErrorKind::AlreadyCreated,
            TokenizerError::NotCreated => ErrorKind::NotCreated,
            TokenizerError::RecipientBlocked(_) => ErrorKind::RecipientBlocked,
            TokenizerError::MalformedPointer(_) => ErrorKind::MalformedPointer,
            TokenizerError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            TokenizerError::Registry(_) => ErrorKind::Registry,
            TokenizerError::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Errors returned by the external asset-registry capability
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryError {
    #[error("Unknown unit class: {0}")]
    UnknownUnitClass(AccountId),

    #[error("Unit class already registered: {0}")]
    DuplicateUnitClass(AccountId),

    #[error("Insufficient balance for {account}: have {have}, need {need}")]
    InsufficientBalance { account: AccountId, have: u64, need: u64 },

    #[error("Balance overflow for {0}")]
    Overflow(AccountId),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Represents all possible errors that can occur when persisting contract state
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO errors that occur when reading/writing files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Database errors that occur with the underlying storage backend
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors related to missing or invalid data
    #[error("Not found: {0}")]
    NotFound(String),

    /// Errors that occur during write-ahead log operations
    #[error("Write-ahead log error: {0}")]
    WAL(String),

    /// Generic errors that don't fit in other categories
    #[error("Other error: {0}")]
    Other(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("Row not found".to_string()),
            _ => StorageError::Database(err.to_string()),
        }
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        StorageError::Other(err)
    }
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        StorageError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = vec![
            TokenizerError::Unauthorized { signer: AccountId::default() },
            TokenizerError::InsufficientSignatures { present: 1, required: 2 },
            TokenizerError::InvalidAmount(0),
            TokenizerError::InsufficientSupply { requested: 2, available: 1 },
            TokenizerError::AlreadyCreated,
            TokenizerError::NotCreated,
            TokenizerError::RecipientBlocked(AccountId::default()),
            TokenizerError::MalformedPointer(String::new()),
            TokenizerError::InvalidParameters(String::new()),
            TokenizerError::Registry(RegistryError::Unavailable("down".into())),
            TokenizerError::Storage(StorageError::Other("disk".into())),
        ];

        let kinds: std::collections::HashSet<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_signature_diagnostics_in_message() {
        let err = TokenizerError::InsufficientSignatures { present: 1, required: 2 };
        assert_eq!(err.to_string(), "Insufficient signatures: 1 valid of 2 required");
    }

    #[test]
    fn test_storage_conversions() {
        let err: StorageError = "boom".into();
        assert!(matches!(err, StorageError::Other(ref m) if m == "boom"));

        let err: TokenizerError = StorageError::NotFound("state".into()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
