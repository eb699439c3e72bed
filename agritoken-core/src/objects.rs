use crate::content_address::{ContentAddress, IPFS_SCHEME};
use crate::error::{StorageError, TokenizerError};
use crate::id::AccountId;
use crate::policy::{AdminRule, PolicyProfile};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Identifier the asset registry assigns to the tokenized product line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitClassId(pub AccountId);

impl fmt::Display for UnitClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class:{}", hex::encode(&self.0[0..6]))
    }
}

/// The N designated signers and the M-of-N threshold for critical operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRegistry {
    /// Ordered signer set, the first entry is the primary admin
    signers: Vec<AccountId>,

    /// Number of registry signatures a critical operation needs
    threshold: u32,
}

impl AdminRegistry {
    /// Build a registry, enforcing N >= M >= 1 and unique non-zero signers
    pub fn new(signers: Vec<AccountId>, threshold: u32) -> Result<Self, TokenizerError> {
        if signers.is_empty() {
            return Err(TokenizerError::InvalidParameters(
                "admin registry needs at least one signer".to_string(),
            ));
        }
        if threshold == 0 || threshold as usize > signers.len() {
            return Err(TokenizerError::InvalidParameters(format!(
                "threshold {} outside 1..={}",
                threshold,
                signers.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for signer in &signers {
            if signer.is_zero() {
                return Err(TokenizerError::InvalidParameters(
                    "admin registry cannot contain the zero account".to_string(),
                ));
            }
            if !seen.insert(*signer) {
                return Err(TokenizerError::InvalidParameters(format!(
                    "duplicate admin signer {}",
                    signer
                )));
            }
        }

        Ok(Self { signers, threshold })
    }

    /// Single-admin registry (N = M = 1)
    pub fn single(admin: AccountId) -> Result<Self, TokenizerError> {
        Self::new(vec![admin], 1)
    }

    pub fn primary(&self) -> &AccountId {
        // Construction guarantees at least one signer
        &self.signers[0]
    }

    pub fn signers(&self) -> &[AccountId] {
        &self.signers
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    pub fn contains(&self, account: &AccountId) -> bool {
        self.signers.contains(account)
    }

    /// Number of distinct registry members in a signer set; outsiders are ignored
    pub fn count_members(&self, signer_set: &BTreeSet<AccountId>) -> usize {
        signer_set.iter().filter(|s| self.contains(s)).count()
    }
}

/// The fungible unit class backing the product line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitClass {
    /// Assigned once by the asset registry
    pub id: UnitClassId,

    /// Display name, e.g. "Farm Potato Batch 014"
    pub name: String,

    /// Unit symbol, e.g. "FT"
    pub unit_symbol: String,

    /// Decimal precision of one unit
    pub decimals: u8,

    /// Units issued to date minus units burned
    pub total_supply: u64,
}

/// Current provenance document pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPointer {
    /// Bare CID, without the `ipfs://` scheme
    pub cid: String,

    /// Starts at 1 and grows by one on every successful update
    pub version: u64,

    /// Who recorded this version
    pub updated_by: AccountId,
}

impl MetadataPointer {
    pub fn url(&self) -> String {
        format!("{}{}", IPFS_SCHEME, self.cid)
    }
}

/// Holds the metadata pointer and enforces format and version rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRegistry {
    current: Option<MetadataPointer>,
}

impl MetadataRegistry {
    /// Current pointer and version, `None` until the unit class records one
    pub fn get(&self) -> Option<(&str, u64)> {
        self.current.as_ref().map(|p| (p.cid.as_str(), p.version))
    }

    pub fn pointer(&self) -> Option<&MetadataPointer> {
        self.current.as_ref()
    }

    /// Validate and record a new pointer, returning the new version.
    ///
    /// The caller must have authorized `actor` already. A malformed pointer
    /// leaves the registry untouched.
    pub fn set(&mut self, new_pointer: &str, actor: AccountId) -> Result<u64, TokenizerError> {
        let address = ContentAddress::parse(new_pointer)?;
        let version = match &self.current {
            Some(current) => current.version.checked_add(1).ok_or_else(|| {
                TokenizerError::InvalidParameters("metadata version exhausted".to_string())
            })?,
            None => 1,
        };

        self.current = Some(MetadataPointer {
            cid: address.into_cid(),
            version,
            updated_by: actor,
        });
        Ok(version)
    }
}

/// An account flagged as ineligible to receive transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyListEntry {
    pub account: AccountId,

    /// Admin who added the entry
    pub added_by: AccountId,

    /// Contract sequence number of the transaction that added it
    pub added_at_sequence: u64,
}

/// Set of denied accounts.
///
/// Serialized as a list sorted by account so the encoding, and therefore the
/// state commitment, does not depend on hash map iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<DenyListEntry>", from = "Vec<DenyListEntry>")]
pub struct DenyList {
    entries: HashMap<AccountId, DenyListEntry>,
}

impl DenyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account; returns false (and keeps the original entry) if present
    pub fn add(&mut self, account: AccountId, added_by: AccountId, sequence: u64) -> bool {
        if self.entries.contains_key(&account) {
            return false;
        }
        self.entries.insert(
            account,
            DenyListEntry {
                account,
                added_by,
                added_at_sequence: sequence,
            },
        );
        true
    }

    /// Remove an account; returns false if it was not present
    pub fn remove(&mut self, account: &AccountId) -> bool {
        self.entries.remove(account).is_some()
    }

    pub fn contains(&self, account: &AccountId) -> bool {
        self.entries.contains_key(account)
    }

    pub fn get(&self, account: &AccountId) -> Option<&DenyListEntry> {
        self.entries.get(account)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in account order
    pub fn entries(&self) -> Vec<&DenyListEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by_key(|e| e.account);
        entries
    }
}

impl From<DenyList> for Vec<DenyListEntry> {
    fn from(list: DenyList) -> Self {
        let mut entries: Vec<_> = list.entries.into_values().collect();
        entries.sort_by_key(|e| e.account);
        entries
    }
}

impl From<Vec<DenyListEntry>> for DenyList {
    fn from(entries: Vec<DenyListEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.account, e)).collect(),
        }
    }
}

/// Commitment to the contract state after a transaction, chained to the
/// commitment of the previous one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCommitment {
    /// Contract sequence number the commitment was taken at
    pub sequence: u64,

    /// Hash of the encoded contract state
    pub state_hash: [u8; 32],

    /// Hash of the previous commitment, None for the deployment commitment
    pub prev_commitment_hash: Option<[u8; 32]>,
}

impl StateCommitment {
    /// Hash of this commitment, used to link the next one
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.state_hash);
        if let Some(prev) = self.prev_commitment_hash {
            hasher.update(prev);
        }
        hasher.finalize().into()
    }
}

/// Public summary returned by `get_contract_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub name: Option<String>,
    pub unit_class_id: Option<UnitClassId>,
    pub total_supply: u64,
}

/// Canonical contract state, loaded at the start of each transaction and
/// saved at the end of each successful one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState {
    /// Identity of the contract itself
    pub contract_id: AccountId,

    /// Account holding issued but not yet distributed units
    pub reserve: AccountId,

    pub admins: AdminRegistry,

    /// Operation classification, fixed at deployment
    pub profile: PolicyProfile,

    /// How admin-only operations are checked, fixed at deployment
    pub admin_rule: AdminRule,

    /// `None` until `create_unit` succeeds
    pub unit_class: Option<UnitClass>,

    pub metadata: MetadataRegistry,

    pub deny_list: DenyList,

    /// Number of committed transactions
    pub sequence: u64,
}

impl ContractState {
    /// Fresh, uninitialized contract state
    pub fn new(
        contract_id: AccountId,
        admins: AdminRegistry,
        profile: PolicyProfile,
        admin_rule: AdminRule,
    ) -> Self {
        let reserve = AccountId::derive(&[b"reserve", contract_id.bytes()]);
        Self {
            contract_id,
            reserve,
            admins,
            profile,
            admin_rule,
            unit_class: None,
            metadata: MetadataRegistry::default(),
            deny_list: DenyList::new(),
            sequence: 0,
        }
    }

    pub fn is_created(&self) -> bool {
        self.unit_class.is_some()
    }

    pub fn unit_class(&self) -> Result<&UnitClass, TokenizerError> {
        self.unit_class.as_ref().ok_or(TokenizerError::NotCreated)
    }

    pub fn total_supply(&self) -> u64 {
        self.unit_class.as_ref().map(|c| c.total_supply).unwrap_or(0)
    }

    pub fn info(&self) -> ContractInfo {
        ContractInfo {
            name: self.unit_class.as_ref().map(|c| c.name.clone()),
            unit_class_id: self.unit_class.as_ref().map(|c| c.id),
            total_supply: self.total_supply(),
        }
    }

    /// Binary encoding used for persistence and commitments
    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CID_A: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
    const CID_B: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    fn admins(n: usize) -> Vec<AccountId> {
        (0..n)
            .map(|i| AccountId::from_label(&format!("admin-{}", i)))
            .collect()
    }

    #[test]
    fn test_admin_registry_bounds() {
        assert!(AdminRegistry::new(vec![], 1).is_err());
        assert!(AdminRegistry::new(admins(3), 0).is_err());
        assert!(AdminRegistry::new(admins(3), 4).is_err());
        assert!(AdminRegistry::new(vec![AccountId::default()], 1).is_err());

        let a = AccountId::from_label("a");
        assert!(AdminRegistry::new(vec![a, a], 1).is_err());

        let registry = AdminRegistry::new(admins(3), 2).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.threshold(), 2);
        assert_eq!(registry.primary(), &admins(3)[0]);
    }

    #[test]
    fn test_count_members_ignores_outsiders() {
        let registry = AdminRegistry::new(admins(3), 2).unwrap();
        let mut signers: BTreeSet<_> = admins(2).into_iter().collect();
        signers.insert(AccountId::from_label("outsider"));
        assert_eq!(registry.count_members(&signers), 2);
    }

    #[test]
    fn test_metadata_versions() {
        let actor = AccountId::from_label("admin");
        let mut registry = MetadataRegistry::default();
        assert_eq!(registry.get(), None);

        assert_eq!(registry.set(CID_A, actor).unwrap(), 1);
        assert_eq!(registry.set(&format!("ipfs://{}", CID_B), actor).unwrap(), 2);
        assert_eq!(registry.get(), Some((CID_B, 2)));
        assert_eq!(registry.pointer().unwrap().url(), format!("ipfs://{}", CID_B));

        let before = registry.clone();
        assert!(matches!(
            registry.set("not-a-cid", actor),
            Err(TokenizerError::MalformedPointer(_))
        ));
        assert_eq!(registry, before);
    }

    #[test]
    fn test_deny_list_idempotence() {
        let admin = AccountId::from_label("admin");
        let target = AccountId::from_label("target");
        let mut list = DenyList::new();

        assert!(list.add(target, admin, 1));
        let once = list.clone();
        assert!(!list.add(target, AccountId::from_label("other"), 7));
        assert_eq!(list, once);
        assert_eq!(list.get(&target).unwrap().added_at_sequence, 1);

        assert!(list.remove(&target));
        let removed = list.clone();
        assert!(!list.remove(&target));
        assert_eq!(list, removed);
        assert!(!list.contains(&target));
    }

    #[test]
    fn test_deny_list_encoding_is_canonical() {
        let admin = AccountId::from_label("admin");
        let mut forward = DenyList::new();
        let mut backward = DenyList::new();
        let accounts: Vec<_> = (0..16)
            .map(|i| AccountId::from_label(&format!("acct-{}", i)))
            .collect();

        for a in &accounts {
            forward.add(*a, admin, 0);
        }
        for a in accounts.iter().rev() {
            backward.add(*a, admin, 0);
        }

        assert_eq!(
            bincode::serialize(&forward).unwrap(),
            bincode::serialize(&backward).unwrap()
        );

        let decoded: DenyList =
            bincode::deserialize(&bincode::serialize(&forward).unwrap()).unwrap();
        assert_eq!(decoded, forward);
    }

    #[test]
    fn test_contract_state_encoding() {
        let registry = AdminRegistry::new(admins(3), 2).unwrap();
        let mut state = ContractState::new(
            AccountId::derive(&[b"contract"]),
            registry,
            PolicyProfile::Minimal,
            AdminRule::PrimaryOnly,
        );
        assert!(!state.is_created());
        assert_eq!(state.info().total_supply, 0);
        assert!(matches!(state.unit_class(), Err(TokenizerError::NotCreated)));

        state.unit_class = Some(UnitClass {
            id: UnitClassId(AccountId::derive(&[b"class"])),
            name: "FarmToken".to_string(),
            unit_symbol: "FT".to_string(),
            decimals: 2,
            total_supply: 1_000_000,
        });

        let decoded = ContractState::decode(&state.encode().unwrap()).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.info().name.as_deref(), Some("FarmToken"));
    }

    #[test]
    fn test_commitment_hash_links() {
        let first = StateCommitment {
            sequence: 0,
            state_hash: [1; 32],
            prev_commitment_hash: None,
        };
        let second = StateCommitment {
            sequence: 1,
            state_hash: [1; 32],
            prev_commitment_hash: Some(first.hash()),
        };
        assert_ne!(first.hash(), second.hash());
    }
}
