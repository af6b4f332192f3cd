//! In-memory restaking subsystem.
//!
//! Implements every entity keeper the rewards engine reads from and drives
//! the [`RestakingHooks`] in the same order a real restaking module would:
//! Before* hook, mutation, After* hook. Used by the simulator and the tests.

use crate::hooks::RestakingHooks;
use crate::keeper::{BlockContext, RewardsKeeper};
use crate::keepers::{
    OperatorParams, OperatorsKeeper, PoolsKeeper, PoolsParams, RestakingKeeper, ServiceParams,
    ServicesKeeper,
};
use anyhow::anyhow;
use parking_lot::RwLock;
use restake_types::{
    shares_for_coins, Address, Coins, DecCoins, Delegation, DelegationTarget, DelegationType,
    Operator, OperatorStatus, Pool, Service, TrustedServiceEntry, UserPreferences,
};
use std::collections::{BTreeMap, BTreeSet};

type DelegationKey = (DelegationType, u32, Address);

#[derive(Debug, Default)]
struct RestakingData {
    pools: BTreeMap<u32, Pool>,
    operators: BTreeMap<u32, Operator>,
    services: BTreeMap<u32, Service>,
    pools_params: PoolsParams,
    operator_params: BTreeMap<u32, OperatorParams>,
    service_params: BTreeMap<u32, ServiceParams>,
    restakable_denoms: Vec<String>,
    delegations: BTreeMap<DelegationKey, Delegation>,
    preferences: BTreeMap<Address, UserPreferences>,
    /// (operator id, service id)
    joined_services: BTreeSet<(u32, u32)>,
}

impl RestakingData {
    fn target(&self, delegation_type: DelegationType, target_id: u32) -> Option<DelegationTarget> {
        match delegation_type {
            DelegationType::Pool => self.pools.get(&target_id).cloned().map(DelegationTarget::Pool),
            DelegationType::Operator => self
                .operators
                .get(&target_id)
                .cloned()
                .map(DelegationTarget::Operator),
            DelegationType::Service => self
                .services
                .get(&target_id)
                .cloned()
                .map(DelegationTarget::Service),
        }
    }

    /// Add or remove tokens and shares on a target.
    fn apply_to_target(
        &mut self,
        delegation_type: DelegationType,
        target_id: u32,
        amount: &Coins,
        shares: &DecCoins,
        add: bool,
    ) -> anyhow::Result<()> {
        match delegation_type {
            DelegationType::Pool => {
                let pool = self
                    .pools
                    .get_mut(&target_id)
                    .ok_or_else(|| anyhow!("pool {target_id} not found"))?;
                let tokens = amount.amount_of(&pool.denom);
                let pool_shares = shares.amount_of(&pool.denom);
                if add {
                    pool.tokens += tokens;
                    pool.delegator_shares += pool_shares;
                } else {
                    pool.tokens = pool
                        .tokens
                        .checked_sub(tokens)
                        .ok_or_else(|| anyhow!("pool {target_id} has not enough tokens"))?;
                    pool.delegator_shares -= pool_shares;
                }
            }
            DelegationType::Operator => {
                let operator = self
                    .operators
                    .get_mut(&target_id)
                    .ok_or_else(|| anyhow!("operator {target_id} not found"))?;
                apply_coins(&mut operator.tokens, &mut operator.delegator_shares, amount, shares, add)?;
            }
            DelegationType::Service => {
                let service = self
                    .services
                    .get_mut(&target_id)
                    .ok_or_else(|| anyhow!("service {target_id} not found"))?;
                apply_coins(&mut service.tokens, &mut service.delegator_shares, amount, shares, add)?;
            }
        }
        Ok(())
    }
}

fn apply_coins(
    tokens: &mut Coins,
    delegator_shares: &mut DecCoins,
    amount: &Coins,
    shares: &DecCoins,
    add: bool,
) -> anyhow::Result<()> {
    if add {
        *tokens = tokens.add(amount);
        *delegator_shares = delegator_shares.add(shares);
    } else {
        *tokens = tokens.checked_sub(amount)?;
        *delegator_shares = delegator_shares.sub(shares);
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct MockRestaking {
    data: RwLock<RestakingData>,
}

impl MockRestaking {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Configuration ----

    pub fn set_restakable_denoms(&self, denoms: Vec<String>) {
        self.data.write().restakable_denoms = denoms;
    }

    pub fn set_pools_params(&self, params: PoolsParams) {
        self.data.write().pools_params = params;
    }

    pub fn set_operator_params(&self, operator_id: u32, params: OperatorParams) {
        self.data.write().operator_params.insert(operator_id, params);
    }

    pub fn set_service_params(&self, service_id: u32, params: ServiceParams) {
        self.data.write().service_params.insert(service_id, params);
    }

    pub fn join_service(&self, operator_id: u32, service_id: u32) {
        self.data.write().joined_services.insert((operator_id, service_id));
    }

    pub fn set_operator_status(&self, operator_id: u32, status: OperatorStatus) {
        if let Some(operator) = self.data.write().operators.get_mut(&operator_id) {
            operator.status = status;
        }
    }

    // ---- Targets ----

    pub fn create_pool(&self, keeper: &mut RewardsKeeper, ctx: &BlockContext, pool_id: u32, denom: &str) -> crate::Result<Pool> {
        let pool = Pool::new(pool_id, denom);
        self.data.write().pools.insert(pool_id, pool.clone());
        keeper.after_delegation_target_created(ctx, DelegationType::Pool, pool_id)?;
        Ok(pool)
    }

    pub fn create_operator(&self, keeper: &mut RewardsKeeper, ctx: &BlockContext, operator_id: u32, admin: Address) -> crate::Result<Operator> {
        let operator = Operator::new(operator_id, admin);
        self.data.write().operators.insert(operator_id, operator.clone());
        keeper.after_delegation_target_created(ctx, DelegationType::Operator, operator_id)?;
        Ok(operator)
    }

    pub fn create_service(&self, keeper: &mut RewardsKeeper, ctx: &BlockContext, service_id: u32, admin: Address) -> crate::Result<Service> {
        let service = Service::new(service_id, admin);
        self.data.write().services.insert(service_id, service.clone());
        keeper.after_delegation_target_created(ctx, DelegationType::Service, service_id)?;
        Ok(service)
    }

    /// Remove a target and every delegation to it.
    pub fn remove_target(
        &self,
        keeper: &mut RewardsKeeper,
        ctx: &BlockContext,
        delegation_type: DelegationType,
        target_id: u32,
    ) -> crate::Result<()> {
        let target = {
            let mut data = self.data.write();
            let target = data
                .target(delegation_type, target_id)
                .ok_or_else(|| anyhow!("{delegation_type} {target_id} not found"))?;
            match delegation_type {
                DelegationType::Pool => {
                    data.pools.remove(&target_id);
                }
                DelegationType::Operator => {
                    data.operators.remove(&target_id);
                }
                DelegationType::Service => {
                    data.services.remove(&target_id);
                }
            }
            data.delegations
                .retain(|(kind, id, _), _| !(*kind == delegation_type && *id == target_id));
            target
        };
        keeper.after_delegation_target_removed(ctx, &target)
    }

    // ---- Delegations ----

    /// Delegate `amount` from `user` to a target.
    pub fn delegate(
        &self,
        keeper: &mut RewardsKeeper,
        ctx: &BlockContext,
        delegation_type: DelegationType,
        target_id: u32,
        user: Address,
        amount: &Coins,
    ) -> crate::Result<()> {
        let key = (delegation_type, target_id, user);
        let exists = self.data.read().delegations.contains_key(&key);
        if exists {
            keeper.before_delegation_shares_modified(ctx, delegation_type, target_id, &user)?;
        } else {
            keeper.before_delegation_created(ctx, delegation_type, target_id)?;
        }

        {
            let mut data = self.data.write();
            let target = data
                .target(delegation_type, target_id)
                .ok_or_else(|| anyhow!("{delegation_type} {target_id} not found"))?;
            let shares = shares_for_coins(&target.tokens(), &target.delegator_shares(), amount);
            data.apply_to_target(delegation_type, target_id, amount, &shares, true)?;

            let delegation = data
                .delegations
                .entry(key)
                .or_insert_with(|| Delegation::new(delegation_type, target_id, user, DecCoins::new()));
            delegation.shares = delegation.shares.add(&shares);
        }

        keeper.after_delegation_modified(ctx, delegation_type, target_id, &user)
    }

    /// Withdraw `amount` of stake. The delegation is removed once it holds
    /// no shares.
    pub fn undelegate(
        &self,
        keeper: &mut RewardsKeeper,
        ctx: &BlockContext,
        delegation_type: DelegationType,
        target_id: u32,
        user: Address,
        amount: &Coins,
    ) -> crate::Result<()> {
        let key = (delegation_type, target_id, user);
        if !self.data.read().delegations.contains_key(&key) {
            return Err(anyhow!("{delegation_type} delegation of {user} to {target_id} not found").into());
        }

        keeper.before_delegation_shares_modified(ctx, delegation_type, target_id, &user)?;

        let removed = {
            let mut data = self.data.write();
            let target = data
                .target(delegation_type, target_id)
                .ok_or_else(|| anyhow!("{delegation_type} {target_id} not found"))?;
            let held = data
                .delegations
                .get(&key)
                .map(|delegation| delegation.shares.clone())
                .unwrap_or_default();

            let mut burned = shares_for_coins(&target.tokens(), &target.delegator_shares(), amount);
            if burned.iter().any(|(denom, shares)| shares > held.amount_of(denom)) {
                burned = burned.intersect(&held);
            }
            data.apply_to_target(delegation_type, target_id, amount, &burned, false)?;

            let remaining = held.sub(&burned);
            if remaining.is_empty() || !remaining.is_all_positive() {
                data.delegations.remove(&key);
                true
            } else if let Some(delegation) = data.delegations.get_mut(&key) {
                delegation.shares = remaining;
                false
            } else {
                true
            }
        };

        if removed {
            Ok(())
        } else {
            keeper.after_delegation_modified(ctx, delegation_type, target_id, &user)
        }
    }

    // ---- Preferences ----

    pub fn set_user_preferences(
        &self,
        keeper: &mut RewardsKeeper,
        ctx: &BlockContext,
        user: Address,
        preferences: UserPreferences,
    ) -> crate::Result<()> {
        let before = {
            let mut data = self.data.write();
            data.preferences
                .insert(user, preferences.clone())
                .unwrap_or_default()
        };
        keeper.after_user_preferences_modified(ctx, &user, &before, &preferences)
    }

    /// Trust a single service through any pool, or drop its entry.
    pub fn set_trusted_service(
        &self,
        keeper: &mut RewardsKeeper,
        ctx: &BlockContext,
        user: Address,
        service_id: u32,
        trusted: bool,
    ) -> crate::Result<()> {
        let before = {
            let mut data = self.data.write();
            let preferences = data.preferences.entry(user).or_default();
            let already = preferences
                .trusted_services
                .iter()
                .any(|entry| entry.service_id == service_id);
            if already == trusted {
                return Ok(());
            }
            let before = preferences.clone();
            if trusted {
                preferences
                    .trusted_services
                    .push(TrustedServiceEntry::new(service_id, Vec::new()));
            } else {
                preferences
                    .trusted_services
                    .retain(|entry| entry.service_id != service_id);
            }
            before
        };
        keeper.after_user_trusted_service_updated(ctx, &user, service_id, trusted, &before)
    }
}

impl PoolsKeeper for MockRestaking {
    fn get_pool(&self, pool_id: u32) -> anyhow::Result<Option<Pool>> {
        Ok(self.data.read().pools.get(&pool_id).cloned())
    }

    fn get_pools(&self) -> anyhow::Result<Vec<Pool>> {
        Ok(self.data.read().pools.values().cloned().collect())
    }

    fn get_params(&self) -> anyhow::Result<PoolsParams> {
        Ok(self.data.read().pools_params.clone())
    }
}

impl OperatorsKeeper for MockRestaking {
    fn get_operator(&self, operator_id: u32) -> anyhow::Result<Option<Operator>> {
        Ok(self.data.read().operators.get(&operator_id).cloned())
    }

    fn get_operators(&self) -> anyhow::Result<Vec<Operator>> {
        Ok(self.data.read().operators.values().cloned().collect())
    }

    fn get_operator_params(&self, operator_id: u32) -> anyhow::Result<OperatorParams> {
        Ok(self
            .data
            .read()
            .operator_params
            .get(&operator_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl ServicesKeeper for MockRestaking {
    fn get_service(&self, service_id: u32) -> anyhow::Result<Option<Service>> {
        Ok(self.data.read().services.get(&service_id).cloned())
    }

    fn get_services(&self) -> anyhow::Result<Vec<Service>> {
        Ok(self.data.read().services.values().cloned().collect())
    }

    fn get_service_params(&self, service_id: u32) -> anyhow::Result<ServiceParams> {
        Ok(self
            .data
            .read()
            .service_params
            .get(&service_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl RestakingKeeper for MockRestaking {
    fn get_restakable_denoms(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.data.read().restakable_denoms.clone())
    }

    fn get_delegation(
        &self,
        delegation_type: DelegationType,
        target_id: u32,
        user: &Address,
    ) -> anyhow::Result<Option<Delegation>> {
        Ok(self
            .data
            .read()
            .delegations
            .get(&(delegation_type, target_id, *user))
            .cloned())
    }

    fn get_user_preferences(&self, user: &Address) -> anyhow::Result<UserPreferences> {
        Ok(self
            .data
            .read()
            .preferences
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    fn get_user_pool_delegations(&self, user: &Address) -> anyhow::Result<Vec<Delegation>> {
        Ok(self
            .data
            .read()
            .delegations
            .values()
            .filter(|delegation| {
                delegation.delegation_type == DelegationType::Pool && delegation.user == *user
            })
            .cloned()
            .collect())
    }

    fn get_all_delegations(&self, delegation_type: DelegationType) -> anyhow::Result<Vec<Delegation>> {
        Ok(self
            .data
            .read()
            .delegations
            .values()
            .filter(|delegation| delegation.delegation_type == delegation_type)
            .cloned()
            .collect())
    }

    fn has_operator_joined_service(&self, operator_id: u32, service_id: u32) -> anyhow::Result<bool> {
        Ok(self
            .data
            .read()
            .joined_services
            .contains(&(operator_id, service_id)))
    }
}
