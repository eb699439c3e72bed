//! The asset-registry capability: the external primitive that tracks raw unit
//! balances once a unit class exists. The contract invokes it, never
//! reimplements it.

use agritoken_core::error::RegistryError;
use agritoken_core::id::AccountId;
use agritoken_core::objects::UnitClassId;
use log::debug;
use std::collections::BTreeMap;

/// Synchronous, all-or-nothing asset registry as seen from the contract.
///
/// Every mutating call either applies completely or returns an error with no
/// effect. `snapshot`/`restore` let the caller discard the effects of earlier
/// successful calls when a later step of the same transaction fails.
pub trait AssetRegistry {
    /// Opaque copy of the registry contents
    type Snapshot;

    /// Register a new unit class and credit `initial_supply` to `reserve`.
    ///
    /// The identifier is derived from `creator`, `name` and `unit_symbol`, so
    /// the same contract cannot register the same product line twice.
    fn create_unit_class(
        &mut self,
        creator: &AccountId,
        name: &str,
        unit_symbol: &str,
        decimals: u8,
        initial_supply: u64,
        reserve: &AccountId,
    ) -> Result<UnitClassId, RegistryError>;

    /// Create `amount` new units in `to`
    fn issue(&mut self, class: &UnitClassId, to: &AccountId, amount: u64)
        -> Result<(), RegistryError>;

    /// Destroy `amount` units held by `from`
    fn redeem(
        &mut self,
        class: &UnitClassId,
        from: &AccountId,
        amount: u64,
    ) -> Result<(), RegistryError>;

    /// Move `amount` units between accounts
    fn move_units(
        &mut self,
        class: &UnitClassId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), RegistryError>;

    /// Units of `class` held by `account`
    fn balance(&self, class: &UnitClassId, account: &AccountId) -> Result<u64, RegistryError>;

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: Self::Snapshot);
}

/// Derive the identifier a registry assigns to a unit class
pub fn derive_unit_class_id(creator: &AccountId, name: &str, unit_symbol: &str) -> UnitClassId {
    UnitClassId(AccountId::derive(&[
        b"unit_class",
        creator.bytes(),
        name.as_bytes(),
        unit_symbol.as_bytes(),
    ]))
}

/// Balances and metadata of one unit class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLedger {
    pub name: String,
    pub unit_symbol: String,
    pub decimals: u8,
    pub supply: u64,
    balances: BTreeMap<AccountId, u64>,
}

impl ClassLedger {
    fn balance(&self, account: &AccountId) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn credit(&mut self, account: &AccountId, amount: u64) -> Result<(), RegistryError> {
        let balance = self
            .balance(account)
            .checked_add(amount)
            .ok_or(RegistryError::Overflow(*account))?;
        self.balances.insert(*account, balance);
        Ok(())
    }

    fn debit(&mut self, account: &AccountId, amount: u64) -> Result<(), RegistryError> {
        let have = self.balance(account);
        if have < amount {
            return Err(RegistryError::InsufficientBalance {
                account: *account,
                have,
                need: amount,
            });
        }
        if have == amount {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, have - amount);
        }
        Ok(())
    }
}

/// Process-local asset registry for tests, simulations and single-node use
#[derive(Debug, Clone, Default)]
pub struct InMemoryAssetRegistry {
    classes: BTreeMap<UnitClassId, ClassLedger>,
    /// Makes the next mutating call fail with `Unavailable`
    pending_failure: Option<String>,
}

impl InMemoryAssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next mutating call fail, as a flaky remote registry would
    pub fn fail_next(&mut self, reason: impl Into<String>) {
        self.pending_failure = Some(reason.into());
    }

    pub fn class(&self, id: &UnitClassId) -> Option<&ClassLedger> {
        self.classes.get(id)
    }

    fn check_available(&mut self) -> Result<(), RegistryError> {
        match self.pending_failure.take() {
            Some(reason) => Err(RegistryError::Unavailable(reason)),
            None => Ok(()),
        }
    }

    fn class_mut(&mut self, id: &UnitClassId) -> Result<&mut ClassLedger, RegistryError> {
        self.classes
            .get_mut(id)
            .ok_or(RegistryError::UnknownUnitClass(id.0))
    }
}

impl AssetRegistry for InMemoryAssetRegistry {
    type Snapshot = BTreeMap<UnitClassId, ClassLedger>;

    fn create_unit_class(
        &mut self,
        creator: &AccountId,
        name: &str,
        unit_symbol: &str,
        decimals: u8,
        initial_supply: u64,
        reserve: &AccountId,
    ) -> Result<UnitClassId, RegistryError> {
        self.check_available()?;

        let id = derive_unit_class_id(creator, name, unit_symbol);
        if self.classes.contains_key(&id) {
            return Err(RegistryError::DuplicateUnitClass(id.0));
        }

        let mut ledger = ClassLedger {
            name: name.to_string(),
            unit_symbol: unit_symbol.to_string(),
            decimals,
            supply: initial_supply,
            balances: BTreeMap::new(),
        };
        if initial_supply > 0 {
            ledger.credit(reserve, initial_supply)?;
        }
        self.classes.insert(id, ledger);

        debug!("registry: created {} ({}) with supply {}", id, unit_symbol, initial_supply);
        Ok(id)
    }

    fn issue(
        &mut self,
        class: &UnitClassId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), RegistryError> {
        self.check_available()?;

        let ledger = self.class_mut(class)?;
        let supply = ledger
            .supply
            .checked_add(amount)
            .ok_or(RegistryError::Overflow(class.0))?;
        ledger.credit(to, amount)?;
        ledger.supply = supply;

        debug!("registry: issued {} of {} to {}", amount, class, to);
        Ok(())
    }

    fn redeem(
        &mut self,
        class: &UnitClassId,
        from: &AccountId,
        amount: u64,
    ) -> Result<(), RegistryError> {
        self.check_available()?;

        let ledger = self.class_mut(class)?;
        ledger.debit(from, amount)?;
        // Balances never exceed supply
        ledger.supply -= amount;

        debug!("registry: redeemed {} of {} from {}", amount, class, from);
        Ok(())
    }

    fn move_units(
        &mut self,
        class: &UnitClassId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), RegistryError> {
        self.check_available()?;

        let ledger = self.class_mut(class)?;
        if from == to {
            // Still requires the balance
            let have = ledger.balance(from);
            if have < amount {
                return Err(RegistryError::InsufficientBalance {
                    account: *from,
                    have,
                    need: amount,
                });
            }
            return Ok(());
        }

        // Check the credit first so a failed move leaves both balances alone
        ledger
            .balance(to)
            .checked_add(amount)
            .ok_or(RegistryError::Overflow(*to))?;
        ledger.debit(from, amount)?;
        ledger.credit(to, amount)?;

        debug!("registry: moved {} of {} from {} to {}", amount, class, from, to);
        Ok(())
    }

    fn balance(&self, class: &UnitClassId, account: &AccountId) -> Result<u64, RegistryError> {
        self.classes
            .get(class)
            .map(|ledger| ledger.balance(account))
            .ok_or(RegistryError::UnknownUnitClass(class.0))
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.classes.clone()
    }

    fn restore(&mut self, snapshot: Self::Snapshot) {
        self.classes = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (InMemoryAssetRegistry, UnitClassId, AccountId) {
        let mut registry = InMemoryAssetRegistry::new();
        let reserve = AccountId::from_label("reserve");
        let id = registry
            .create_unit_class(&AccountId::from_label("contract"), "FarmToken", "FT", 2, 100, &reserve)
            .unwrap();
        (registry, id, reserve)
    }

    #[test]
    fn test_create_credits_reserve() {
        let (mut registry, id, reserve) = setup();
        assert_eq!(registry.balance(&id, &reserve).unwrap(), 100);
        assert_eq!(registry.class(&id).unwrap().supply, 100);
        assert!(!id.0.is_zero());

        let dup = registry.create_unit_class(
            &AccountId::from_label("contract"),
            "FarmToken",
            "FT",
            2,
            0,
            &reserve,
        );
        assert!(matches!(dup, Err(RegistryError::DuplicateUnitClass(_))));
    }

    #[test]
    fn test_issue_redeem_and_move() {
        let (mut registry, id, reserve) = setup();
        let farmer = AccountId::from_label("farmer");

        registry.issue(&id, &reserve, 50).unwrap();
        registry.move_units(&id, &reserve, &farmer, 120).unwrap();
        assert_eq!(registry.balance(&id, &reserve).unwrap(), 30);
        assert_eq!(registry.balance(&id, &farmer).unwrap(), 120);

        let err = registry.redeem(&id, &reserve, 31).unwrap_err();
        assert_eq!(
            err,
            RegistryError::InsufficientBalance {
                account: reserve,
                have: 30,
                need: 31
            }
        );

        registry.redeem(&id, &reserve, 30).unwrap();
        assert_eq!(registry.class(&id).unwrap().supply, 120);
    }

    #[test]
    fn test_unknown_class() {
        let (mut registry, _, reserve) = setup();
        let other = UnitClassId(AccountId::from_label("other"));
        assert!(matches!(
            registry.issue(&other, &reserve, 1),
            Err(RegistryError::UnknownUnitClass(_))
        ));
        assert!(registry.balance(&other, &reserve).is_err());
    }

    #[test]
    fn test_failure_injection_and_restore() {
        let (mut registry, id, reserve) = setup();
        let snapshot = registry.snapshot();

        registry.issue(&id, &reserve, 10).unwrap();
        registry.fail_next("link down");
        assert!(matches!(
            registry.issue(&id, &reserve, 10),
            Err(RegistryError::Unavailable(_))
        ));
        // Only the next call fails
        registry.issue(&id, &reserve, 1).unwrap();
        assert_eq!(registry.balance(&id, &reserve).unwrap(), 111);

        registry.restore(snapshot);
        assert_eq!(registry.balance(&id, &reserve).unwrap(), 100);
    }
}
