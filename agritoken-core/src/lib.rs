pub mod content_address;
pub mod error;
pub mod id;
pub mod objects;
pub mod policy;
pub mod transaction;

// Re-export the main types for convenience
pub use content_address::{CidVersion, ContentAddress};
pub use error::{ErrorKind, RegistryError, StorageError, TokenizerError};
pub use id::AccountId;
pub use objects::{
    AdminRegistry, ContractInfo, ContractState, DenyList, DenyListEntry, MetadataPointer,
    MetadataRegistry, StateCommitment, UnitClass, UnitClassId,
};
pub use policy::{
    AdminRule, AuthorizationPolicy, Decision, OperationClass, OperationKind, PolicyProfile,
};
pub use transaction::{
    AdminRegistryParams, BurnParams, CommitmentLevel, CreateUnitParams, DenyListParams,
    MintParams, Operation, OperationOutcome, Transaction, TransactionContext, TransactionHash,
    TransactionReceipt, TransferParams, UpdateMetadataParams,
};
