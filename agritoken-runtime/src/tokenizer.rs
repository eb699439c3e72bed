use crate::registry::AssetRegistry;
use crate::supply::SupplyLedger;
use agritoken_core::content_address::ContentAddress;
use agritoken_core::error::TokenizerError;
use agritoken_core::id::AccountId;
use agritoken_core::objects::{AdminRegistry, ContractInfo, ContractState, DenyListEntry};
use agritoken_core::policy::{AuthorizationPolicy, Decision, OperationKind};
use agritoken_core::transaction::{
    AdminRegistryParams, BurnParams, CreateUnitParams, DenyListParams, MintParams, Operation,
    OperationOutcome, Transaction, TransactionContext, TransferParams, UpdateMetadataParams,
};
use agritoken_core::UnitClassId;
use log::debug;

/// The contract state machine.
///
/// Borrows the canonical state and the asset registry for the duration of a
/// batch of operations. Every operation is authorized against the deployment
/// profile, applied to a staged copy of the state, and either swapped in
/// whole or discarded together with any registry effects.
pub struct Tokenizer<'a, R: AssetRegistry> {
    state: &'a mut ContractState,
    registry: &'a mut R,
}

impl<'a, R: AssetRegistry> Tokenizer<'a, R> {
    pub fn new(state: &'a mut ContractState, registry: &'a mut R) -> Self {
        Self { state, registry }
    }

    /// Dispatch a ledger transaction
    pub fn execute(&mut self, tx: &Transaction) -> Result<OperationOutcome, TokenizerError> {
        self.run(&tx.context, &tx.operation)
    }

    pub fn create_unit(
        &mut self,
        ctx: &TransactionContext,
        params: CreateUnitParams,
    ) -> Result<UnitClassId, TokenizerError> {
        match self.run(ctx, &Operation::CreateUnit(params))? {
            OperationOutcome::UnitCreated { unit_class_id } => Ok(unit_class_id),
            other => Err(unexpected(other)),
        }
    }

    /// Returns the new total supply
    pub fn mint(
        &mut self,
        ctx: &TransactionContext,
        params: MintParams,
    ) -> Result<u64, TokenizerError> {
        match self.run(ctx, &Operation::Mint(params))? {
            OperationOutcome::SupplyChanged { total_supply } => Ok(total_supply),
            other => Err(unexpected(other)),
        }
    }

    /// Returns the new total supply
    pub fn burn(&mut self, ctx: &TransactionContext, amount: u64) -> Result<u64, TokenizerError> {
        match self.run(ctx, &Operation::Burn(BurnParams { amount }))? {
            OperationOutcome::SupplyChanged { total_supply } => Ok(total_supply),
            other => Err(unexpected(other)),
        }
    }

    /// Returns false when the account was already denied
    pub fn add_to_deny_list(
        &mut self,
        ctx: &TransactionContext,
        account: AccountId,
    ) -> Result<bool, TokenizerError> {
        match self.run(ctx, &Operation::AddToDenyList(DenyListParams { account }))? {
            OperationOutcome::DenyListUpdated { changed } => Ok(changed),
            other => Err(unexpected(other)),
        }
    }

    /// Returns false when the account was not denied
    pub fn remove_from_deny_list(
        &mut self,
        ctx: &TransactionContext,
        account: AccountId,
    ) -> Result<bool, TokenizerError> {
        match self.run(ctx, &Operation::RemoveFromDenyList(DenyListParams { account }))? {
            OperationOutcome::DenyListUpdated { changed } => Ok(changed),
            other => Err(unexpected(other)),
        }
    }

    /// Returns the new version
    pub fn update_metadata_pointer(
        &mut self,
        ctx: &TransactionContext,
        new_pointer: &str,
    ) -> Result<u64, TokenizerError> {
        let params = UpdateMetadataParams {
            new_pointer: new_pointer.to_string(),
        };
        match self.run(ctx, &Operation::UpdateMetadataPointer(params))? {
            OperationOutcome::MetadataUpdated { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    pub fn update_admin_registry(
        &mut self,
        ctx: &TransactionContext,
        params: AdminRegistryParams,
    ) -> Result<(), TokenizerError> {
        self.run(ctx, &Operation::UpdateAdminRegistry(params))
            .map(|_| ())
    }

    /// Transfer hook invoked by the ledger's transfer
    pub fn transfer(
        &mut self,
        ctx: &TransactionContext,
        params: TransferParams,
    ) -> Result<(), TokenizerError> {
        self.run(ctx, &Operation::Transfer(params)).map(|_| ())
    }

    pub fn is_denied(&self, account: &AccountId) -> bool {
        self.state.deny_list.contains(account)
    }

    pub fn deny_list(&self) -> Vec<&DenyListEntry> {
        self.state.deny_list.entries()
    }

    pub fn get_metadata_pointer(&self) -> Option<(&str, u64)> {
        self.state.metadata.get()
    }

    /// `ipfs://<cid>` form of the current pointer
    pub fn metadata_url(&self) -> Option<String> {
        self.state.metadata.pointer().map(|p| p.url())
    }

    pub fn get_contract_info(&self) -> ContractInfo {
        self.state.info()
    }

    pub fn balance_of(&self, account: &AccountId) -> Result<u64, TokenizerError> {
        match &self.state.unit_class {
            Some(class) => Ok(self.registry.balance(&class.id, account)?),
            None => Ok(0),
        }
    }

    pub fn admin_registry(&self) -> &AdminRegistry {
        &self.state.admins
    }

    pub fn state(&self) -> &ContractState {
        self.state
    }

    fn run(
        &mut self,
        ctx: &TransactionContext,
        operation: &Operation,
    ) -> Result<OperationOutcome, TokenizerError> {
        ctx.validate()?;
        let kind = operation.kind();
        self.authorize(kind, ctx)?;

        let snapshot = self.registry.snapshot();
        let mut staged = self.state.clone();

        match apply(&mut staged, self.registry, ctx, operation) {
            Ok(outcome) => {
                staged.sequence += 1;
                *self.state = staged;
                Ok(outcome)
            }
            Err(e) => {
                debug!("{} rolled back: {}", kind, e);
                self.registry.restore(snapshot);
                Err(e)
            }
        }
    }

    /// Policy check for admin operations. Transfers carry no class and are
    /// checked against their `from` account in `apply`.
    fn authorize(
        &self,
        kind: OperationKind,
        ctx: &TransactionContext,
    ) -> Result<Option<Decision>, TokenizerError> {
        match self.state.profile.classify(kind) {
            Some(class) => {
                let policy = AuthorizationPolicy::new(&self.state.admins, self.state.admin_rule);
                let decision = policy.authorize(class, ctx.signers())?;
                debug!(
                    "{} authorized as {:?} with {} admin signatures",
                    kind, decision.class, decision.valid_signatures
                );
                Ok(Some(decision))
            }
            None => Ok(None),
        }
    }
}

/// Operation logic against the staged state
fn apply<R: AssetRegistry>(
    state: &mut ContractState,
    registry: &mut R,
    ctx: &TransactionContext,
    operation: &Operation,
) -> Result<OperationOutcome, TokenizerError> {
    let actor = *ctx.sender();

    match operation {
        Operation::CreateUnit(params) => {
            if state.is_created() {
                return Err(TokenizerError::AlreadyCreated);
            }
            // Reject a bad pointer before the registry is involved
            ContentAddress::parse(&params.metadata_pointer)?;

            let unit_class_id = SupplyLedger::new(state, registry).create(params)?;
            state.metadata.set(&params.metadata_pointer, actor)?;
            Ok(OperationOutcome::UnitCreated { unit_class_id })
        }

        Operation::Mint(params) => {
            let reserve = state.reserve;
            let mut ledger = SupplyLedger::new(state, registry);
            let total_supply = ledger.mint(params.amount)?;
            if let Some(recipient) = &params.recipient {
                ledger.transfer(&reserve, recipient, params.amount)?;
            }
            Ok(OperationOutcome::SupplyChanged { total_supply })
        }

        Operation::Burn(params) => {
            let total_supply = SupplyLedger::new(state, registry).burn(params.amount)?;
            Ok(OperationOutcome::SupplyChanged { total_supply })
        }

        Operation::AddToDenyList(params) => {
            if params.account.is_zero() {
                return Err(TokenizerError::InvalidParameters(
                    "cannot deny the zero account".to_string(),
                ));
            }
            let sequence = state.sequence + 1;
            let changed = state.deny_list.add(params.account, actor, sequence);
            Ok(OperationOutcome::DenyListUpdated { changed })
        }

        Operation::RemoveFromDenyList(params) => {
            let changed = state.deny_list.remove(&params.account);
            Ok(OperationOutcome::DenyListUpdated { changed })
        }

        Operation::UpdateMetadataPointer(params) => {
            if !state.is_created() {
                return Err(TokenizerError::NotCreated);
            }
            let version = state.metadata.set(&params.new_pointer, actor)?;
            Ok(OperationOutcome::MetadataUpdated { version })
        }

        Operation::UpdateAdminRegistry(params) => {
            state.admins = AdminRegistry::new(params.signers.clone(), params.threshold)?;
            Ok(OperationOutcome::AdminRegistryUpdated {
                signers: state.admins.len(),
                threshold: state.admins.threshold(),
            })
        }

        Operation::Transfer(params) => {
            if !ctx.is_signed_by(&params.from) {
                return Err(TokenizerError::Unauthorized { signer: actor });
            }
            SupplyLedger::new(state, registry).transfer(&params.from, &params.to, params.amount)?;
            Ok(OperationOutcome::Transferred)
        }
    }
}

fn unexpected(outcome: OperationOutcome) -> TokenizerError {
    TokenizerError::InvalidParameters(format!("unexpected outcome {:?}", outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryAssetRegistry;
    use agritoken_core::error::{ErrorKind, RegistryError};
    use agritoken_core::policy::{AdminRule, PolicyProfile};

    const CID_A: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
    const CID_B: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    fn id(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    fn ctx(signers: &[&str]) -> TransactionContext {
        TransactionContext::new(
            [signers.len() as u8; 32],
            id(signers[0]),
            signers[1..].iter().map(|s| id(s)),
        )
    }

    fn state(profile: PolicyProfile) -> ContractState {
        ContractState::new(
            AccountId::derive(&[b"contract"]),
            AdminRegistry::new(vec![id("A"), id("B"), id("C")], 2).unwrap(),
            profile,
            AdminRule::PrimaryOnly,
        )
    }

    fn create_params() -> CreateUnitParams {
        CreateUnitParams {
            name: "FarmToken".to_string(),
            unit_symbol: "FT".to_string(),
            initial_supply: 1_000_000,
            decimals: 2,
            metadata_pointer: format!("ipfs://{}", CID_A),
        }
    }

    #[test]
    fn test_create_and_read() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);

        assert_eq!(tokenizer.get_metadata_pointer(), None);
        let class_id = tokenizer.create_unit(&ctx(&["A"]), create_params()).unwrap();

        assert_eq!(tokenizer.get_metadata_pointer(), Some((CID_A, 1)));
        assert_eq!(tokenizer.metadata_url(), Some(format!("ipfs://{}", CID_A)));
        let info = tokenizer.get_contract_info();
        assert_eq!(info.name.as_deref(), Some("FarmToken"));
        assert_eq!(info.unit_class_id, Some(class_id));
        assert_eq!(info.total_supply, 1_000_000);
        assert_eq!(tokenizer.state().sequence, 1);

        let before = tokenizer.state().clone();
        assert!(matches!(
            tokenizer.create_unit(&ctx(&["A"]), create_params()),
            Err(TokenizerError::AlreadyCreated)
        ));
        assert_eq!(tokenizer.state(), &before);
    }

    #[test]
    fn test_malformed_pointer_at_create() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);

        let mut params = create_params();
        params.metadata_pointer = "https://example.com/doc".to_string();
        assert!(matches!(
            tokenizer.create_unit(&ctx(&["A"]), params),
            Err(TokenizerError::MalformedPointer(_))
        ));
        assert!(!tokenizer.state().is_created());
        assert_eq!(tokenizer.state().sequence, 0);
    }

    #[test]
    fn test_admin_only_rules() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);
        tokenizer.create_unit(&ctx(&["A"]), create_params()).unwrap();

        // Non-admin
        let err = tokenizer.mint(&ctx(&["mallory"]), MintParams::new(100)).unwrap_err();
        assert!(matches!(err, TokenizerError::Unauthorized { signer } if signer == id("mallory")));

        // B is an admin but not the primary one
        let err = tokenizer.mint(&ctx(&["B"]), MintParams::new(100)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        // A co-signed by an outsider is still fine
        assert_eq!(
            tokenizer.mint(&ctx(&["A", "mallory"]), MintParams::new(100)).unwrap(),
            1_000_100
        );
    }

    #[test]
    fn test_any_admin_rule() {
        let mut state = state(PolicyProfile::Minimal);
        state.admin_rule = AdminRule::AnyAdmin;
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);

        tokenizer.create_unit(&ctx(&["C"]), create_params()).unwrap();
        assert!(tokenizer.add_to_deny_list(&ctx(&["B"]), id("x")).unwrap());
        assert!(tokenizer
            .add_to_deny_list(&ctx(&["mallory"]), id("y"))
            .is_err());
    }

    #[test]
    fn test_metadata_update_needs_threshold() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);

        // Before creation
        assert!(matches!(
            tokenizer.update_metadata_pointer(&ctx(&["A", "B"]), CID_B),
            Err(TokenizerError::NotCreated)
        ));

        tokenizer.create_unit(&ctx(&["A"]), create_params()).unwrap();

        assert!(matches!(
            tokenizer.update_metadata_pointer(&ctx(&["A", "mallory"]), CID_B),
            Err(TokenizerError::InsufficientSignatures {
                present: 1,
                required: 2
            })
        ));
        assert_eq!(
            tokenizer.update_metadata_pointer(&ctx(&["A", "B"]), CID_B).unwrap(),
            2
        );

        // Malformed pointer keeps version and pointer
        assert!(matches!(
            tokenizer.update_metadata_pointer(&ctx(&["B", "C"]), "Qm-not-a-cid"),
            Err(TokenizerError::MalformedPointer(_))
        ));
        assert_eq!(tokenizer.get_metadata_pointer(), Some((CID_B, 2)));
    }

    #[test]
    fn test_hardened_profile() {
        let mut state = state(PolicyProfile::Hardened);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);

        assert!(matches!(
            tokenizer.create_unit(&ctx(&["A"]), create_params()),
            Err(TokenizerError::InsufficientSignatures { .. })
        ));
        tokenizer.create_unit(&ctx(&["A", "C"]), create_params()).unwrap();
        assert!(tokenizer.burn(&ctx(&["A"]), 10).is_err());
        assert_eq!(tokenizer.burn(&ctx(&["B", "C"]), 10).unwrap(), 999_990);

        // Deny-list changes stay admin-only
        assert!(tokenizer.add_to_deny_list(&ctx(&["A"]), id("x")).unwrap());
    }

    #[test]
    fn test_deny_list_is_idempotent() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);

        assert!(tokenizer.add_to_deny_list(&ctx(&["A"]), id("x")).unwrap());
        let once = tokenizer.state().deny_list.clone();
        assert!(!tokenizer.add_to_deny_list(&ctx(&["A"]), id("x")).unwrap());
        assert_eq!(tokenizer.state().deny_list, once);
        assert_eq!(tokenizer.deny_list()[0].added_at_sequence, 1);

        assert!(tokenizer.remove_from_deny_list(&ctx(&["A"]), id("x")).unwrap());
        assert!(!tokenizer.remove_from_deny_list(&ctx(&["A"]), id("x")).unwrap());
        assert!(!tokenizer.is_denied(&id("x")));
    }

    #[test]
    fn test_transfer_requires_sender_signature() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);
        tokenizer.create_unit(&ctx(&["A"]), create_params()).unwrap();
        tokenizer
            .mint(&ctx(&["A"]), MintParams::to(50, id("farmer")))
            .unwrap();

        let params = TransferParams {
            from: id("farmer"),
            to: id("buyer"),
            amount: 20,
        };
        assert!(matches!(
            tokenizer.transfer(&ctx(&["buyer"]), params.clone()),
            Err(TokenizerError::Unauthorized { .. })
        ));
        tokenizer.transfer(&ctx(&["farmer"]), params).unwrap();
        assert_eq!(tokenizer.balance_of(&id("farmer")).unwrap(), 30);
        assert_eq!(tokenizer.balance_of(&id("buyer")).unwrap(), 20);
    }

    #[test]
    fn test_mint_to_denied_recipient_rolls_back() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);
        tokenizer.create_unit(&ctx(&["A"]), create_params()).unwrap();
        tokenizer.add_to_deny_list(&ctx(&["A"]), id("farmer")).unwrap();
        let reserve = tokenizer.state().reserve;

        let err = tokenizer
            .mint(&ctx(&["A"]), MintParams::to(50, id("farmer")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecipientBlocked);
        assert_eq!(tokenizer.get_contract_info().total_supply, 1_000_000);
        // The issuance was undone too
        assert_eq!(tokenizer.balance_of(&reserve).unwrap(), 1_000_000);
    }

    #[test]
    fn test_registry_failure_rolls_back() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        Tokenizer::new(&mut state, &mut registry)
            .create_unit(&ctx(&["A"]), create_params())
            .unwrap();

        registry.fail_next("registry offline");
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);
        assert!(matches!(
            tokenizer.mint(&ctx(&["A"]), MintParams::new(5)),
            Err(TokenizerError::Registry(RegistryError::Unavailable(_)))
        ));
        assert_eq!(tokenizer.get_contract_info().total_supply, 1_000_000);
        assert_eq!(tokenizer.state().sequence, 1);
    }

    #[test]
    fn test_admin_rotation() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);

        let params = AdminRegistryParams {
            signers: vec![id("D"), id("E")],
            threshold: 2,
        };
        // Judged against the current registry
        assert!(tokenizer
            .update_admin_registry(&ctx(&["D", "E"]), params.clone())
            .is_err());
        tokenizer
            .update_admin_registry(&ctx(&["A", "B"]), params)
            .unwrap();
        assert_eq!(tokenizer.admin_registry().primary(), &id("D"));

        let bad = AdminRegistryParams {
            signers: vec![id("D")],
            threshold: 2,
        };
        assert!(matches!(
            tokenizer.update_admin_registry(&ctx(&["D", "E"]), bad),
            Err(TokenizerError::InvalidParameters(_))
        ));
        assert_eq!(tokenizer.admin_registry().len(), 2);
    }

    #[test]
    fn test_ledger_context_without_signers_is_rejected() {
        let mut state = state(PolicyProfile::Minimal);
        let mut registry = InMemoryAssetRegistry::new();
        let mut tokenizer = Tokenizer::new(&mut state, &mut registry);
        tokenizer.create_unit(&ctx(&["A"]), create_params()).unwrap();

        let mut json = serde_json::to_value(ctx(&["A"])).unwrap();
        json["signers"] = serde_json::json!([]);
        let unsigned: TransactionContext = serde_json::from_value(json).unwrap();

        let err = tokenizer.add_to_deny_list(&unsigned, id("buyer")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        assert!(!tokenizer.is_denied(&id("buyer")));
        assert_eq!(tokenizer.state().sequence, 1);
    }
}
