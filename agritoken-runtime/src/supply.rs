use crate::registry::AssetRegistry;
use agritoken_core::error::TokenizerError;
use agritoken_core::id::AccountId;
use agritoken_core::objects::{ContractState, UnitClass, UnitClassId};
use agritoken_core::transaction::CreateUnitParams;
use log::debug;

/// Thin adapter between the contract's supply accounting and the asset
/// registry.
///
/// Each method validates first, calls the registry, and only then updates the
/// local counter, so a refused registry call never leaves the counter ahead of
/// the registry. Authorization is the caller's job.
pub struct SupplyLedger<'a, R: AssetRegistry> {
    state: &'a mut ContractState,
    registry: &'a mut R,
}

impl<'a, R: AssetRegistry> SupplyLedger<'a, R> {
    pub fn new(state: &'a mut ContractState, registry: &'a mut R) -> Self {
        Self { state, registry }
    }

    /// Register the unit class and record it in the state.
    ///
    /// Single use: fails `AlreadyCreated` once a class exists.
    pub fn create(&mut self, params: &CreateUnitParams) -> Result<UnitClassId, TokenizerError> {
        if self.state.is_created() {
            return Err(TokenizerError::AlreadyCreated);
        }
        params.validate()?;

        let id = self.registry.create_unit_class(
            &self.state.contract_id,
            &params.name,
            &params.unit_symbol,
            params.decimals,
            params.initial_supply,
            &self.state.reserve,
        )?;

        self.state.unit_class = Some(UnitClass {
            id,
            name: params.name.clone(),
            unit_symbol: params.unit_symbol.clone(),
            decimals: params.decimals,
            total_supply: params.initial_supply,
        });
        Ok(id)
    }

    /// Issue `amount` new units into the reserve, returning the new supply
    pub fn mint(&mut self, amount: u64) -> Result<u64, TokenizerError> {
        if amount == 0 {
            return Err(TokenizerError::InvalidAmount(amount));
        }
        let class = self.state.unit_class()?;
        let id = class.id;
        let new_total = class
            .total_supply
            .checked_add(amount)
            .ok_or(TokenizerError::InvalidAmount(amount))?;

        debug!("mint {} of {} into reserve", amount, id);
        self.registry.issue(&id, &self.state.reserve, amount)?;

        self.set_total_supply(new_total);
        Ok(new_total)
    }

    /// Redeem `amount` units from the reserve, returning the new supply
    pub fn burn(&mut self, amount: u64) -> Result<u64, TokenizerError> {
        if amount == 0 {
            return Err(TokenizerError::InvalidAmount(amount));
        }
        let class = self.state.unit_class()?;
        let id = class.id;
        if amount > class.total_supply {
            return Err(TokenizerError::InsufficientSupply {
                requested: amount,
                available: class.total_supply,
            });
        }
        let new_total = class.total_supply - amount;

        debug!("burn {} of {} from reserve", amount, id);
        self.registry.redeem(&id, &self.state.reserve, amount)?;

        self.set_total_supply(new_total);
        Ok(new_total)
    }

    /// Transfer hook: the deny-list is consulted before the registry is
    /// touched
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), TokenizerError> {
        if self.state.deny_list.contains(to) {
            return Err(TokenizerError::RecipientBlocked(*to));
        }
        if amount == 0 {
            return Err(TokenizerError::InvalidAmount(amount));
        }
        let id = self.state.unit_class()?.id;

        debug!("transfer {} of {} from {} to {}", amount, id, from, to);
        self.registry.move_units(&id, from, to, amount)?;
        Ok(())
    }

    /// Registry balance of `account`, zero before the class exists
    pub fn balance_of(&self, account: &AccountId) -> Result<u64, TokenizerError> {
        match &self.state.unit_class {
            Some(class) => Ok(self.registry.balance(&class.id, account)?),
            None => Ok(0),
        }
    }

    fn set_total_supply(&mut self, total: u64) {
        if let Some(class) = self.state.unit_class.as_mut() {
            class.total_supply = total;
        }
    }
}
