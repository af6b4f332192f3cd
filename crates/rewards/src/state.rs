//! Persisted state of the rewards engine.
//!
//! Everything lives in ordered maps so a snapshot serialises to the same
//! bytes on every node and a clone can serve as a throwaway cache context.

use crate::params::Params;
use crate::plan::RewardsPlan;
use chrono::{DateTime, Utc};
use restake_types::{Address, DecCoins, DecPools, DelegationType, ServicePools};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rewards accrued by a target during its open period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRewards {
    pub rewards: ServicePools,
    pub period: u64,
}

/// Cumulative reward-per-token snapshot closing a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalRewards {
    pub cumulative_reward_ratios: ServicePools,
    /// Live references: the target's own pointer plus one per delegator
    /// snapshot starting at this period. Never above 2.
    pub reference_count: u32,
}

/// Accrued but not yet withdrawn rewards of a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingRewards {
    pub rewards: DecPools,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedCommission {
    pub commissions: DecPools,
}

/// Snapshot a delegator's rewards are computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorStartingInfo {
    pub previous_period: u64,
    pub stakes: DecCoins,
    pub height: u64,
}

/// Period ledger for every target of one delegation type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRewardsStore {
    #[serde(default)]
    pub current: BTreeMap<u32, CurrentRewards>,
    #[serde(default)]
    pub historical: BTreeMap<u32, BTreeMap<u64, HistoricalRewards>>,
    #[serde(default)]
    pub outstanding: BTreeMap<u32, OutstandingRewards>,
    #[serde(default)]
    pub starting_infos: BTreeMap<u32, BTreeMap<Address, DelegatorStartingInfo>>,
}

impl TargetRewardsStore {
    pub fn historical(&self, target_id: u32, period: u64) -> Option<&HistoricalRewards> {
        self.historical.get(&target_id)?.get(&period)
    }

    pub fn set_historical(&mut self, target_id: u32, period: u64, rewards: HistoricalRewards) {
        self.historical
            .entry(target_id)
            .or_default()
            .insert(period, rewards);
    }

    pub fn remove_historical(&mut self, target_id: u32, period: u64) {
        if let Some(periods) = self.historical.get_mut(&target_id) {
            periods.remove(&period);
            if periods.is_empty() {
                self.historical.remove(&target_id);
            }
        }
    }

    pub fn starting_info(&self, target_id: u32, delegator: &Address) -> Option<&DelegatorStartingInfo> {
        self.starting_infos.get(&target_id)?.get(delegator)
    }

    pub fn set_starting_info(&mut self, target_id: u32, delegator: Address, info: DelegatorStartingInfo) {
        self.starting_infos
            .entry(target_id)
            .or_default()
            .insert(delegator, info);
    }

    pub fn remove_starting_info(&mut self, target_id: u32, delegator: &Address) {
        if let Some(infos) = self.starting_infos.get_mut(&target_id) {
            infos.remove(delegator);
            if infos.is_empty() {
                self.starting_infos.remove(&target_id);
            }
        }
    }

    /// Sum of reference counts over every historical record.
    pub fn total_reference_count(&self) -> u64 {
        self.historical
            .values()
            .flat_map(BTreeMap::values)
            .map(|record| u64::from(record.reference_count))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsState {
    pub params: Params,
    pub next_rewards_plan_id: u64,
    #[serde(default)]
    pub rewards_plans: BTreeMap<u64, RewardsPlan>,
    #[serde(default)]
    pub last_rewards_allocation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub withdraw_addresses: BTreeMap<Address, Address>,
    #[serde(default)]
    pub pools: TargetRewardsStore,
    #[serde(default)]
    pub operators: TargetRewardsStore,
    #[serde(default)]
    pub services: TargetRewardsStore,
    #[serde(default)]
    pub operator_accumulated_commissions: BTreeMap<u32, AccumulatedCommission>,
    /// pool id -> service id -> shares of delegators trusting that service.
    #[serde(default)]
    pub pool_service_total_delegator_shares: BTreeMap<u32, BTreeMap<u32, DecCoins>>,
}

impl Default for RewardsState {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl RewardsState {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            next_rewards_plan_id: 1,
            rewards_plans: BTreeMap::new(),
            last_rewards_allocation_time: None,
            withdraw_addresses: BTreeMap::new(),
            pools: TargetRewardsStore::default(),
            operators: TargetRewardsStore::default(),
            services: TargetRewardsStore::default(),
            operator_accumulated_commissions: BTreeMap::new(),
            pool_service_total_delegator_shares: BTreeMap::new(),
        }
    }

    pub fn store(&self, delegation_type: DelegationType) -> &TargetRewardsStore {
        match delegation_type {
            DelegationType::Pool => &self.pools,
            DelegationType::Operator => &self.operators,
            DelegationType::Service => &self.services,
        }
    }

    pub fn store_mut(&mut self, delegation_type: DelegationType) -> &mut TargetRewardsStore {
        match delegation_type {
            DelegationType::Pool => &mut self.pools,
            DelegationType::Operator => &mut self.operators,
            DelegationType::Service => &mut self.services,
        }
    }

    pub fn pool_service_shares(&self, pool_id: u32, service_id: u32) -> DecCoins {
        self.pool_service_total_delegator_shares
            .get(&pool_id)
            .and_then(|services| services.get(&service_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Store the shares, deleting the record once it is empty.
    pub fn set_pool_service_shares(&mut self, pool_id: u32, service_id: u32, shares: DecCoins) {
        if shares.is_empty() {
            if let Some(services) = self.pool_service_total_delegator_shares.get_mut(&pool_id) {
                services.remove(&service_id);
                if services.is_empty() {
                    self.pool_service_total_delegator_shares.remove(&pool_id);
                }
            }
        } else {
            self.pool_service_total_delegator_shares
                .entry(pool_id)
                .or_default()
                .insert(service_id, shares);
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restake_types::Decimal;

    #[test]
    fn test_historical_records_cleanup() {
        let mut store = TargetRewardsStore::default();
        store.set_historical(1, 0, HistoricalRewards { reference_count: 1, ..Default::default() });
        assert_eq!(store.total_reference_count(), 1);

        store.remove_historical(1, 0);
        assert!(store.historical.is_empty());
        assert!(store.historical(1, 0).is_none());
    }

    #[test]
    fn test_pool_service_shares_deleted_when_empty() {
        let mut state = RewardsState::default();
        state.set_pool_service_shares(1, 2, DecCoins::single("umilk", Decimal::from(5)));
        assert_eq!(state.pool_service_shares(1, 2).amount_of("umilk"), Decimal::from(5));

        state.set_pool_service_shares(1, 2, DecCoins::new());
        assert!(state.pool_service_total_delegator_shares.is_empty());
    }

    #[test]
    fn test_state_json_roundtrip() {
        let mut state = RewardsState::default();
        let delegator = Address::from_seed("alice");
        state.pools.set_starting_info(
            1,
            delegator,
            DelegatorStartingInfo {
                previous_period: 3,
                stakes: DecCoins::single("umilk", Decimal::from(10)),
                height: 7,
            },
        );
        state.pools.set_historical(1, 3, HistoricalRewards { reference_count: 2, ..Default::default() });

        let json = state.to_json().unwrap();
        let restored = RewardsState::from_json(&json).unwrap();
        assert_eq!(restored, state);
    }
}
