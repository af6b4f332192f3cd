//! The rewards keeper: state plus handles to the collaborating subsystems.

use crate::errors::{Result, RewardsError};
use crate::events::RewardsEvent;
use crate::keepers::{
    BankKeeper, OperatorsKeeper, PoolsKeeper, PriceOracle, RestakingKeeper, ServicesKeeper,
};
use crate::oracle::ValueOracle;
use crate::params::{community_pool_address, rewards_pool_address};
use crate::state::RewardsState;
use chrono::{DateTime, Utc};
use restake_types::{Address, Coins, DelegationTarget, DelegationType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Block being executed. Passed explicitly to every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: u64,
    pub time: DateTime<Utc>,
}

impl BlockContext {
    pub fn new(height: u64, time: DateTime<Utc>) -> Self {
        Self { height, time }
    }
}

/// Handles to the subsystems the keeper reads from and transfers through.
#[derive(Clone)]
pub struct Collaborators {
    pub bank: Arc<dyn BankKeeper>,
    pub oracle: Arc<dyn PriceOracle>,
    pub pools: Arc<dyn PoolsKeeper>,
    pub operators: Arc<dyn OperatorsKeeper>,
    pub services: Arc<dyn ServicesKeeper>,
    pub restaking: Arc<dyn RestakingKeeper>,
}

pub struct RewardsKeeper {
    pub(crate) state: RewardsState,
    pub(crate) bank: Arc<dyn BankKeeper>,
    pub(crate) oracle: ValueOracle,
    pub(crate) pools: Arc<dyn PoolsKeeper>,
    pub(crate) operators: Arc<dyn OperatorsKeeper>,
    pub(crate) services: Arc<dyn ServicesKeeper>,
    pub(crate) restaking: Arc<dyn RestakingKeeper>,
    /// Account allowed to update params.
    pub(crate) authority: Address,
    events: Vec<RewardsEvent>,
}

impl RewardsKeeper {
    pub fn new(collaborators: Collaborators, authority: Address, state: RewardsState) -> Self {
        Self {
            state,
            bank: collaborators.bank,
            oracle: ValueOracle::new(collaborators.oracle),
            pools: collaborators.pools,
            operators: collaborators.operators,
            services: collaborators.services,
            restaking: collaborators.restaking,
            authority,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &RewardsState {
        &self.state
    }

    pub fn authority(&self) -> Address {
        self.authority
    }

    /// Drain the events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<RewardsEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[RewardsEvent] {
        &self.events
    }

    pub(crate) fn emit(&mut self, event: RewardsEvent) {
        debug!(target: "rewards", event = event.name(), "emitting event");
        self.events.push(event);
    }

    /// Run `f` against a cached copy of the state: writes are committed when
    /// it succeeds and discarded when it fails.
    pub fn cache_context<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.state.clone();
        let emitted = self.events.len();
        let result = f(self);
        if result.is_err() {
            self.state = snapshot;
            self.events.truncate(emitted);
        }
        result
    }

    // ---- Delegation targets ----

    pub fn get_delegation_target(&self, delegation_type: DelegationType, target_id: u32) -> Result<DelegationTarget> {
        let target = match delegation_type {
            DelegationType::Pool => self.pools.get_pool(target_id)?.map(DelegationTarget::Pool),
            DelegationType::Operator => self
                .operators
                .get_operator(target_id)?
                .map(DelegationTarget::Operator),
            DelegationType::Service => self
                .services
                .get_service(target_id)?
                .map(DelegationTarget::Service),
        };
        target.ok_or(RewardsError::TargetNotFound(delegation_type, target_id))
    }

    /// Whether `service_id` borrows security from `pool_id`.
    pub fn is_service_secured_by_pool(&self, service_id: u32, pool_id: u32) -> Result<bool> {
        let params = self.services.get_service_params(service_id)?;
        Ok(params.whitelisted_pools_ids.is_empty() || params.whitelisted_pools_ids.contains(&pool_id))
    }

    /// Whether the service accepts `operator_id` as a validator.
    pub fn can_operator_validate_service(&self, service_id: u32, operator_id: u32) -> Result<bool> {
        let params = self.services.get_service_params(service_id)?;
        Ok(params.whitelisted_operators_ids.is_empty()
            || params.whitelisted_operators_ids.contains(&operator_id))
    }

    // ---- Accounts ----

    /// Where rewards of `address` are paid. Defaults to the address itself.
    pub fn get_withdraw_address(&self, address: &Address) -> Address {
        self.state
            .withdraw_addresses
            .get(address)
            .copied()
            .unwrap_or(*address)
    }

    pub fn set_withdraw_address(&mut self, address: Address, withdraw_address: Address) -> Result<()> {
        if self.bank.is_blocked(&withdraw_address) {
            return Err(RewardsError::BlockedAddress(withdraw_address));
        }
        if withdraw_address == address {
            self.state.withdraw_addresses.remove(&address);
        } else {
            self.state.withdraw_addresses.insert(address, withdraw_address);
        }
        Ok(())
    }

    pub(crate) fn fund_community_pool(&self, from: &Address, amount: &Coins) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.bank.send_coins(from, &community_pool_address(), amount)?;
        Ok(())
    }

    pub(crate) fn send_from_rewards_pool(&self, to: &Address, amount: &Coins) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.bank.send_coins(&rewards_pool_address(), to, amount)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_keeper() -> RewardsKeeper {
    use crate::bank::InMemoryBank;
    use crate::oracle::StaticPriceOracle;
    use crate::restaking::MockRestaking;
    use restake_types::Decimal;

    let restaking = Arc::new(MockRestaking::new());
    RewardsKeeper::new(
        Collaborators {
            bank: Arc::new(InMemoryBank::new()),
            oracle: Arc::new(StaticPriceOracle::with_prices([("umilk", Decimal::ONE)])),
            pools: restaking.clone(),
            operators: restaking.clone(),
            services: restaking.clone(),
            restaking,
        },
        Address::module("gov"),
        RewardsState::default(),
    )
}
