//! Per-target reward ledger: current, historical and outstanding rewards.
//!
//! Each target accrues rewards into an open period. Closing a period folds
//! its rewards into a cumulative reward-per-token ratio stored under the
//! period number; delegators later price their stake against the difference
//! of two such ratios. Historical records are reference counted and deleted
//! once nothing points at them.

use crate::errors::{Result, RewardsError};
use crate::keeper::RewardsKeeper;
use crate::params::rewards_pool_address;
use crate::state::{AccumulatedCommission, CurrentRewards, HistoricalRewards, OutstandingRewards};
use restake_types::{
    DecCoins, DecPools, DelegationTarget, DelegationType, ServicePools,
};
use tracing::{debug, info};

/// Ratio accrued by an open period, plus the rewards nobody can claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PeriodRatio {
    pub ratio: ServicePools,
    pub community_funding: DecPools,
}

impl RewardsKeeper {
    /// Create the ledger of a new target: period 0 snapshot referenced once,
    /// open period 1, nothing outstanding.
    pub fn initialize_delegation_target(&mut self, target: &DelegationTarget) {
        let target_id = target.id();
        let delegation_type = target.delegation_type();
        let store = self.state.store_mut(delegation_type);

        store.set_historical(
            target_id,
            0,
            HistoricalRewards {
                cumulative_reward_ratios: ServicePools::new(),
                reference_count: 1,
            },
        );
        store.current.insert(
            target_id,
            CurrentRewards {
                rewards: ServicePools::new(),
                period: 1,
            },
        );
        store.outstanding.insert(target_id, OutstandingRewards::default());

        if delegation_type == DelegationType::Operator {
            self.state
                .operator_accumulated_commissions
                .insert(target_id, AccumulatedCommission::default());
        }

        debug!(
            target: "rewards",
            delegation_type = %delegation_type,
            target_id,
            "initialized delegation target rewards"
        );
    }

    pub fn has_delegation_target_ledger(&self, delegation_type: DelegationType, target_id: u32) -> bool {
        self.state.store(delegation_type).current.contains_key(&target_id)
    }

    pub fn get_current_rewards(&self, target: &DelegationTarget) -> Result<CurrentRewards> {
        self.state
            .store(target.delegation_type())
            .current
            .get(&target.id())
            .cloned()
            .ok_or(RewardsError::LedgerNotInitialized(target.delegation_type(), target.id()))
    }

    pub fn get_outstanding_rewards(&self, delegation_type: DelegationType, target_id: u32) -> OutstandingRewards {
        self.state
            .store(delegation_type)
            .outstanding
            .get(&target_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn set_outstanding_rewards(&mut self, delegation_type: DelegationType, target_id: u32, rewards: DecPools) {
        self.state
            .store_mut(delegation_type)
            .outstanding
            .insert(target_id, OutstandingRewards { rewards });
    }

    pub fn get_historical_rewards(&self, delegation_type: DelegationType, target_id: u32, period: u64) -> Option<HistoricalRewards> {
        self.state
            .store(delegation_type)
            .historical(target_id, period)
            .cloned()
    }

    /// Tokens per service used to turn a period's rewards into a ratio.
    ///
    /// A pool only counts the stake of delegators trusting the service, all
    /// other targets count their whole stake.
    fn ratio_tokens(&self, target: &DelegationTarget, service_id: u32) -> DecCoins {
        match target {
            DelegationTarget::Pool(pool) => {
                let shares = self.state.pool_service_shares(pool.id, service_id);
                target.tokens_from_shares_truncated(&shares)
            }
            _ => DecCoins::from_coins(&target.tokens()),
        }
    }

    /// Ratio the open period would contribute if it were closed now.
    pub(crate) fn compute_period_ratio(&self, target: &DelegationTarget, current: &CurrentRewards) -> PeriodRatio {
        let mut out = PeriodRatio::default();
        for (service_id, pools) in current.rewards.iter() {
            let tokens = self.ratio_tokens(target, service_id);
            for (denom, rewards) in pools.iter() {
                let token_amount = tokens.amount_of(denom);
                if token_amount.is_zero() {
                    out.community_funding.add_dec_coins(denom, rewards);
                    continue;
                }
                let ratio = DecPools::single(denom, rewards.quo_dec_truncate(token_amount));
                out.ratio.add_pools(service_id, &ratio);
            }
        }
        out
    }

    /// Close the open period of `target` and return its number.
    pub fn increment_delegation_target_period(&mut self, target: &DelegationTarget) -> Result<u64> {
        let delegation_type = target.delegation_type();
        let target_id = target.id();
        let current = self.get_current_rewards(target)?;
        let PeriodRatio {
            ratio,
            community_funding,
        } = self.compute_period_ratio(target, &current);

        if !community_funding.is_empty() {
            let (truncated, _) = community_funding.truncate_decimal();
            self.fund_community_pool(&rewards_pool_address(), &truncated.sum())?;

            let outstanding = self.get_outstanding_rewards(delegation_type, target_id);
            self.set_outstanding_rewards(
                delegation_type,
                target_id,
                outstanding.rewards.sub(&DecPools::from_pools(&truncated)),
            );
            info!(
                target: "rewards",
                delegation_type = %delegation_type,
                target_id,
                amount = %truncated.sum(),
                "rewards without eligible stake sent to community pool"
            );
        }

        let previous = self
            .state
            .store(delegation_type)
            .historical(target_id, current.period - 1)
            .cloned()
            .unwrap_or_else(|| {
                panic!(
                    "missing historical rewards for {delegation_type} {target_id} period {}",
                    current.period - 1
                )
            });

        self.decrement_reference_count(delegation_type, target_id, current.period - 1);

        let store = self.state.store_mut(delegation_type);
        store.set_historical(
            target_id,
            current.period,
            HistoricalRewards {
                cumulative_reward_ratios: previous.cumulative_reward_ratios.add(&ratio),
                reference_count: 1,
            },
        );
        store.current.insert(
            target_id,
            CurrentRewards {
                rewards: ServicePools::new(),
                period: current.period + 1,
            },
        );

        Ok(current.period)
    }

    pub(crate) fn increment_reference_count(&mut self, delegation_type: DelegationType, target_id: u32, period: u64) {
        let store = self.state.store_mut(delegation_type);
        let mut record = store.historical(target_id, period).cloned().unwrap_or_else(|| {
            panic!("missing historical rewards for {delegation_type} {target_id} period {period}")
        });
        if record.reference_count > 2 {
            panic!("reference count should never exceed 2");
        }
        record.reference_count += 1;
        store.set_historical(target_id, period, record);
    }

    pub(crate) fn decrement_reference_count(&mut self, delegation_type: DelegationType, target_id: u32, period: u64) {
        let store = self.state.store_mut(delegation_type);
        let mut record = store.historical(target_id, period).cloned().unwrap_or_else(|| {
            panic!("missing historical rewards for {delegation_type} {target_id} period {period}")
        });
        if record.reference_count == 0 {
            panic!("cannot set negative reference count");
        }
        record.reference_count -= 1;
        if record.reference_count == 0 {
            store.remove_historical(target_id, period);
        } else {
            store.set_historical(target_id, period, record);
        }
    }

    /// Drop every ledger record of a target that is being removed.
    ///
    /// Operator commission is paid out first, unclaimed outstanding rewards
    /// go to the community pool.
    pub fn clear_delegation_target(&mut self, target: &DelegationTarget) -> Result<()> {
        let delegation_type = target.delegation_type();
        let target_id = target.id();

        match target {
            DelegationTarget::Operator(operator) => {
                match self.settle_operator_commission(operator) {
                    Ok(_) | Err(RewardsError::NoOperatorCommission) => {}
                    Err(err) => return Err(err),
                }
            }
            DelegationTarget::Service(_) => {
                let pools: Vec<u32> = self
                    .state
                    .pool_service_total_delegator_shares
                    .keys()
                    .copied()
                    .collect();
                for pool_id in pools {
                    self.state
                        .set_pool_service_shares(pool_id, target_id, DecCoins::new());
                }
            }
            DelegationTarget::Pool(_) => {
                self.state
                    .pool_service_total_delegator_shares
                    .remove(&target_id);
            }
        }

        let outstanding = self.get_outstanding_rewards(delegation_type, target_id);
        let (truncated, _) = outstanding.rewards.truncate_decimal();
        self.fund_community_pool(&rewards_pool_address(), &truncated.sum())?;

        if delegation_type == DelegationType::Operator {
            self.state.operator_accumulated_commissions.remove(&target_id);
        }
        let store = self.state.store_mut(delegation_type);
        store.outstanding.remove(&target_id);
        store.historical.remove(&target_id);
        store.current.remove(&target_id);
        store.starting_infos.remove(&target_id);

        info!(
            target: "rewards",
            delegation_type = %delegation_type,
            target_id,
            community_funding = %truncated.sum(),
            "cleared delegation target rewards"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::test_keeper;
    use restake_types::{Decimal, Pool};

    fn staked_pool(tokens: u128) -> DelegationTarget {
        let mut pool = Pool::new(1, "umilk");
        pool.tokens = tokens;
        pool.delegator_shares = Decimal::from(tokens);
        DelegationTarget::Pool(pool)
    }

    fn reference_count(keeper: &RewardsKeeper, period: u64) -> Option<u32> {
        keeper
            .get_historical_rewards(DelegationType::Pool, 1, period)
            .map(|record| record.reference_count)
    }

    #[test]
    fn test_initialize_references_period_zero_once() {
        let mut keeper = test_keeper();
        let pool = staked_pool(100);
        keeper.initialize_delegation_target(&pool);

        assert_eq!(reference_count(&keeper, 0), Some(1));
        assert_eq!(keeper.get_current_rewards(&pool).unwrap().period, 1);
        assert!(keeper
            .get_outstanding_rewards(DelegationType::Pool, 1)
            .rewards
            .is_empty());
    }

    #[test]
    fn test_increment_period_moves_the_target_reference() {
        let mut keeper = test_keeper();
        let pool = staked_pool(100);
        keeper.initialize_delegation_target(&pool);

        assert_eq!(keeper.increment_delegation_target_period(&pool).unwrap(), 1);
        assert_eq!(reference_count(&keeper, 0), None);
        assert_eq!(reference_count(&keeper, 1), Some(1));
        assert_eq!(keeper.get_current_rewards(&pool).unwrap().period, 2);

        // A delegator snapshot keeps period 1 alive across the next close.
        keeper.increment_reference_count(DelegationType::Pool, 1, 1);
        assert_eq!(keeper.increment_delegation_target_period(&pool).unwrap(), 2);
        assert_eq!(reference_count(&keeper, 1), Some(1));
        assert_eq!(reference_count(&keeper, 2), Some(1));
    }

    #[test]
    fn test_increment_period_accumulates_ratio() {
        let mut keeper = test_keeper();
        let pool = staked_pool(100);
        keeper.initialize_delegation_target(&pool);
        keeper.state.set_pool_service_shares(1, 1, DecCoins::single("umilk", Decimal::from(100)));

        let rewards = ServicePools::single(
            1,
            DecPools::single("umilk", DecCoins::single("service", Decimal::from(50))),
        );
        keeper.state.store_mut(DelegationType::Pool).current.insert(
            1,
            CurrentRewards { rewards, period: 1 },
        );

        let period = keeper.increment_delegation_target_period(&pool).unwrap();
        let record = keeper
            .get_historical_rewards(DelegationType::Pool, 1, period)
            .unwrap();
        let expected = ServicePools::single(
            1,
            DecPools::single("umilk", DecCoins::single("service", Decimal::new(5, 1))),
        );
        assert_eq!(record.cumulative_reward_ratios, expected);
    }

    #[test]
    fn test_reference_count_reaches_three() {
        let mut keeper = test_keeper();
        keeper.initialize_delegation_target(&staked_pool(100));
        keeper.increment_reference_count(DelegationType::Pool, 1, 0);
        keeper.increment_reference_count(DelegationType::Pool, 1, 0);
        assert_eq!(reference_count(&keeper, 0), Some(3));
    }

    #[test]
    #[should_panic(expected = "reference count should never exceed 2")]
    fn test_increment_reference_count_above_two_panics() {
        let mut keeper = test_keeper();
        keeper.initialize_delegation_target(&staked_pool(100));
        for _ in 0..3 {
            keeper.increment_reference_count(DelegationType::Pool, 1, 0);
        }
    }

    #[test]
    fn test_decrement_deletes_record_at_zero() {
        let mut keeper = test_keeper();
        keeper.initialize_delegation_target(&staked_pool(100));
        keeper.increment_reference_count(DelegationType::Pool, 1, 0);

        keeper.decrement_reference_count(DelegationType::Pool, 1, 0);
        assert_eq!(reference_count(&keeper, 0), Some(1));
        keeper.decrement_reference_count(DelegationType::Pool, 1, 0);
        assert_eq!(reference_count(&keeper, 0), None);
    }

    #[test]
    #[should_panic(expected = "cannot set negative reference count")]
    fn test_decrement_reference_count_at_zero_panics() {
        let mut keeper = test_keeper();
        keeper.state.store_mut(DelegationType::Pool).set_historical(
            1,
            0,
            HistoricalRewards {
                cumulative_reward_ratios: ServicePools::new(),
                reference_count: 0,
            },
        );
        keeper.decrement_reference_count(DelegationType::Pool, 1, 0);
    }

    #[test]
    #[should_panic(expected = "missing historical rewards")]
    fn test_decrement_deleted_period_panics() {
        let mut keeper = test_keeper();
        keeper.initialize_delegation_target(&staked_pool(100));
        keeper.decrement_reference_count(DelegationType::Pool, 1, 0);
        keeper.decrement_reference_count(DelegationType::Pool, 1, 0);
    }
}
