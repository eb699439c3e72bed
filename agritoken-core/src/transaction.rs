use crate::error::{ErrorKind, TokenizerError};
use crate::id::AccountId;
use crate::objects::{StateCommitment, UnitClassId};
use crate::policy::OperationKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Transaction hash type (32-byte array)
pub type TransactionHash = [u8; 32];

/// Longest display name the asset registry accepts, in bytes
pub const MAX_NAME_LEN: usize = 32;

/// Longest unit symbol the asset registry accepts, in bytes
pub const MAX_SYMBOL_LEN: usize = 8;

/// Highest decimal precision the asset registry accepts
pub const MAX_DECIMALS: u8 = 19;

/// Represents the commitment level of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommitmentLevel {
    /// Transaction is being executed
    #[default]
    Processing,
    /// Transaction has been applied and its state saved
    Committed,
    /// Transaction was rejected, none of its effects were kept
    Failed,
}

/// Per-transaction facts supplied by the ledger.
///
/// The signer set has already been authenticated by the ledger; the contract
/// only reasons about membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContext {
    hash: TransactionHash,
    sender: AccountId,
    signers: BTreeSet<AccountId>,
}

impl TransactionContext {
    /// Context for a transaction sent by `sender`, optionally co-signed.
    /// The sender is always part of the signer set.
    pub fn new(
        hash: TransactionHash,
        sender: AccountId,
        cosigners: impl IntoIterator<Item = AccountId>,
    ) -> Self {
        let mut signers: BTreeSet<AccountId> = cosigners.into_iter().collect();
        signers.insert(sender);
        Self {
            hash,
            sender,
            signers,
        }
    }

    /// Context signed by the sender alone
    pub fn single(hash: TransactionHash, sender: AccountId) -> Self {
        Self::new(hash, sender, std::iter::empty())
    }

    pub fn hash(&self) -> &TransactionHash {
        &self.hash
    }

    pub fn sender(&self) -> &AccountId {
        &self.sender
    }

    pub fn signers(&self) -> &BTreeSet<AccountId> {
        &self.signers
    }

    pub fn is_signed_by(&self, account: &AccountId) -> bool {
        self.signers.contains(account)
    }

    /// Boundary check for contexts that did not come through `new`, e.g.
    /// ones deserialized from the ledger
    pub fn validate(&self) -> Result<(), TokenizerError> {
        if self.signers.is_empty() {
            return Err(TokenizerError::InvalidParameters(
                "signer set is empty".to_string(),
            ));
        }
        if !self.signers.contains(&self.sender) {
            return Err(TokenizerError::InvalidParameters(format!(
                "sender {} is not in the signer set",
                self.sender
            )));
        }
        if self.sender.is_zero() || self.signers.iter().any(AccountId::is_zero) {
            return Err(TokenizerError::InvalidParameters(
                "signer set contains the zero account".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of `create_unit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUnitParams {
    pub name: String,
    pub unit_symbol: String,
    pub initial_supply: u64,
    pub decimals: u8,
    /// Bare CID or `ipfs://<cid>` of the provenance document
    pub metadata_pointer: String,
}

impl CreateUnitParams {
    pub fn validate(&self) -> Result<(), TokenizerError> {
        if self.name.trim().is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(TokenizerError::InvalidParameters(format!(
                "unit name must be 1..={} bytes",
                MAX_NAME_LEN
            )));
        }
        if self.unit_symbol.trim().is_empty() || self.unit_symbol.len() > MAX_SYMBOL_LEN {
            return Err(TokenizerError::InvalidParameters(format!(
                "unit symbol must be 1..={} bytes",
                MAX_SYMBOL_LEN
            )));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(TokenizerError::InvalidParameters(format!(
                "decimals {} above {}",
                self.decimals, MAX_DECIMALS
            )));
        }
        Ok(())
    }
}

/// Parameters of `mint`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintParams {
    pub amount: u64,
    /// Move the new units out of the reserve to this account
    pub recipient: Option<AccountId>,
}

impl MintParams {
    pub fn new(amount: u64) -> Self {
        Self {
            amount,
            recipient: None,
        }
    }

    pub fn to(amount: u64, recipient: AccountId) -> Self {
        Self {
            amount,
            recipient: Some(recipient),
        }
    }
}

/// Parameters of `burn`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnParams {
    pub amount: u64,
}

/// Parameters of `add_to_deny_list` / `remove_from_deny_list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyListParams {
    pub account: AccountId,
}

/// Parameters of `update_metadata_pointer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMetadataParams {
    pub new_pointer: String,
}

/// Parameters of `update_admin_registry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRegistryParams {
    pub signers: Vec<AccountId>,
    pub threshold: u32,
}

/// Parameters of the transfer hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u64,
}

/// A state-changing contract call with typed parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    CreateUnit(CreateUnitParams),
    Mint(MintParams),
    Burn(BurnParams),
    AddToDenyList(DenyListParams),
    RemoveFromDenyList(DenyListParams),
    UpdateMetadataPointer(UpdateMetadataParams),
    UpdateAdminRegistry(AdminRegistryParams),
    Transfer(TransferParams),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateUnit(_) => OperationKind::CreateUnit,
            Operation::Mint(_) => OperationKind::Mint,
            Operation::Burn(_) => OperationKind::Burn,
            Operation::AddToDenyList(_) => OperationKind::AddToDenyList,
            Operation::RemoveFromDenyList(_) => OperationKind::RemoveFromDenyList,
            Operation::UpdateMetadataPointer(_) => OperationKind::UpdateMetadataPointer,
            Operation::UpdateAdminRegistry(_) => OperationKind::UpdateAdminRegistry,
            Operation::Transfer(_) => OperationKind::Transfer,
        }
    }
}

/// A signed contract call as delivered by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub context: TransactionContext,
    pub operation: Operation,
}

impl Transaction {
    pub fn new(context: TransactionContext, operation: Operation) -> Self {
        Self { context, operation }
    }

    pub fn hash(&self) -> &TransactionHash {
        self.context.hash()
    }
}

/// What a successful operation returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutcome {
    UnitCreated { unit_class_id: UnitClassId },
    SupplyChanged { total_supply: u64 },
    /// `changed` is false when the call was an idempotent no-op
    DenyListUpdated { changed: bool },
    MetadataUpdated { version: u64 },
    AdminRegistryUpdated { signers: usize, threshold: u32 },
    Transferred,
}

/// Record of an executed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// The hash of the transaction that was executed
    pub transaction_hash: TransactionHash,

    /// Contract sequence after the transaction (unchanged on failure)
    pub sequence: u64,

    pub operation: OperationKind,

    /// Whether the transaction was applied
    pub success: bool,

    /// Return value of a successful operation
    pub outcome: Option<OperationOutcome>,

    /// Failure kind of a rejected operation
    pub error_kind: Option<ErrorKind>,

    /// Any error message from the execution (if not successful)
    pub error_message: Option<String>,

    /// The commitment level of this transaction
    pub commitment_level: CommitmentLevel,

    /// Unix timestamp (seconds) when the transaction was processed
    pub timestamp: i64,

    /// Latest state commitment after this transaction
    pub state_commitment: Option<StateCommitment>,
}

impl TransactionReceipt {
    /// Create a receipt in the Processing state
    pub fn new(
        transaction_hash: TransactionHash,
        operation: OperationKind,
        sequence: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            transaction_hash,
            sequence,
            operation,
            success: false,
            outcome: None,
            error_kind: None,
            error_message: None,
            commitment_level: CommitmentLevel::Processing,
            timestamp,
            state_commitment: None,
        }
    }

    /// Mark the transaction as committed
    pub fn commit(&mut self, outcome: OperationOutcome, commitment: StateCommitment) {
        self.success = true;
        self.sequence = commitment.sequence;
        self.outcome = Some(outcome);
        self.commitment_level = CommitmentLevel::Committed;
        self.state_commitment = Some(commitment);
    }

    /// Mark the transaction as failed
    pub fn set_error(&mut self, error: &TokenizerError, latest: Option<StateCommitment>) {
        self.success = false;
        self.outcome = None;
        self.error_kind = Some(error.kind());
        self.error_message = Some(error.to_string());
        self.commitment_level = CommitmentLevel::Failed;
        self.state_commitment = latest;
    }
}
