//! Delegator starting info and lazy reward calculation.
//!
//! A delegator's reward for a window of periods is its stake multiplied by
//! the growth of the target's cumulative reward ratio over that window.
//! Pool delegators only collect the ratio growth paid by services they
//! trust with that pool.

use crate::errors::{Result, RewardsError};
use crate::events::RewardsEvent;
use crate::keeper::{BlockContext, RewardsKeeper};
use crate::state::DelegatorStartingInfo;
use restake_types::{
    smallest_dec, Address, DecCoins, DecPools, Decimal, Delegation, DelegationTarget, Pools,
    ServicePools, UserPreferences,
};
use tracing::info;

impl RewardsKeeper {
    pub fn get_delegator_starting_info(&self, target: &DelegationTarget, delegator: &Address) -> Option<DelegatorStartingInfo> {
        self.state
            .store(target.delegation_type())
            .starting_info(target.id(), delegator)
            .cloned()
    }

    pub(crate) fn get_delegation(&self, target: &DelegationTarget, delegator: &Address) -> Result<Delegation> {
        self.restaking
            .get_delegation(target.delegation_type(), target.id(), delegator)?
            .ok_or(RewardsError::DelegationNotFound {
                delegation_type: target.delegation_type(),
                target_id: target.id(),
                user: *delegator,
            })
    }

    /// Snapshot the delegation so it starts earning from the period that was
    /// just closed. The target must already reflect the new share balance.
    pub fn initialize_delegation(&mut self, ctx: &BlockContext, target: &DelegationTarget, delegator: &Address) -> Result<()> {
        let delegation_type = target.delegation_type();
        let target_id = target.id();
        let current = self.get_current_rewards(target)?;
        let previous_period = current.period - 1;

        self.increment_reference_count(delegation_type, target_id, previous_period);

        let delegation = self.get_delegation(target, delegator)?;
        let stakes = target.tokens_from_shares_truncated(&delegation.shares);

        self.state.store_mut(delegation_type).set_starting_info(
            target_id,
            *delegator,
            DelegatorStartingInfo {
                previous_period,
                stakes,
                height: ctx.height,
            },
        );
        Ok(())
    }

    /// `stakes × (ending − starting)`, summed over the services the
    /// delegator may collect from.
    fn rewards_between_ratios(
        &self,
        target: &DelegationTarget,
        preferences: Option<&UserPreferences>,
        starting: &ServicePools,
        ending: &ServicePools,
        stakes: &DecCoins,
    ) -> DecPools {
        if stakes.is_any_negative() {
            panic!("stake should not be negative");
        }

        let differences = ending.sub(starting);
        if differences.is_any_negative() {
            panic!(
                "negative rewards ratio for {} {}",
                target.delegation_type(),
                target.id()
            );
        }

        let mut ratios = DecPools::new();
        for (service_id, pools) in differences.iter() {
            let collectable = match (preferences, target) {
                (Some(prefs), DelegationTarget::Pool(pool)) => {
                    prefs.is_service_trusted_with_pool(service_id, pool.id)
                }
                _ => true,
            };
            if collectable {
                ratios = ratios.add(pools);
            }
        }

        let mut rewards = DecPools::new();
        for (denom, ratio) in ratios.iter() {
            let stake = stakes.amount_of(denom);
            if stake.is_zero() {
                continue;
            }
            rewards.add_dec_coins(denom, &ratio.mul_dec_truncate(stake));
        }
        rewards
    }

    /// Preferences gating what a pool delegator collects. Other targets pay
    /// every service.
    fn collection_preferences(&self, target: &DelegationTarget, delegator: &Address) -> Result<Option<UserPreferences>> {
        match target {
            DelegationTarget::Pool(_) => Ok(Some(self.restaking.get_user_preferences(delegator)?)),
            _ => Ok(None),
        }
    }

    fn rewards_between_periods(
        &self,
        target: &DelegationTarget,
        preferences: Option<&UserPreferences>,
        starting_period: u64,
        ending_period: u64,
        stakes: &DecCoins,
    ) -> DecPools {
        if starting_period > ending_period {
            panic!("starting period cannot be greater than ending period");
        }
        let starting = self.historical_ratios(target, starting_period);
        let ending = self.historical_ratios(target, ending_period);
        self.rewards_between_ratios(target, preferences, &starting, &ending, stakes)
    }

    fn historical_ratios(&self, target: &DelegationTarget, period: u64) -> ServicePools {
        self.state
            .store(target.delegation_type())
            .historical(target.id(), period)
            .map(|record| record.cumulative_reward_ratios.clone())
            .unwrap_or_else(|| {
                panic!(
                    "missing historical rewards for {} {} period {period}",
                    target.delegation_type(),
                    target.id()
                )
            })
    }

    /// Stored stakes checked against the stake the delegation's shares are
    /// worth now. Rounding noise up to three units of the last decimal is
    /// clamped away, anything larger is a broken invariant.
    fn sanitized_stakes(&self, target: &DelegationTarget, delegation: &Delegation, stakes: &DecCoins) -> DecCoins {
        let current_stakes = target.tokens_from_shares(&delegation.shares);
        let margin = smallest_dec() * Decimal::from(3);

        let mut out = DecCoins::new();
        for (denom, stake) in stakes.iter() {
            let current = current_stakes.amount_of(denom);
            if stake > current {
                if stake <= current + margin {
                    out.add_amount(denom, current);
                    continue;
                }
                panic!(
                    "calculated final stake for delegator {} greater than current stake\n\tstake denom:\t{}\n\tfinal stake:\t{}\n\tcurrent stake:\t{}",
                    delegation.user, denom, stake, current
                );
            }
            out.add_amount(denom, stake);
        }
        out
    }

    /// Rewards accrued by `delegation` up to `ending_period`.
    pub fn calculate_delegation_rewards(
        &self,
        ctx: &BlockContext,
        target: &DelegationTarget,
        delegation: &Delegation,
        ending_period: u64,
    ) -> Result<DecPools> {
        let preferences = self.collection_preferences(target, &delegation.user)?;
        self.delegation_rewards_with(ctx, target, delegation, ending_period, preferences.as_ref())
    }

    fn delegation_rewards_with(
        &self,
        ctx: &BlockContext,
        target: &DelegationTarget,
        delegation: &Delegation,
        ending_period: u64,
        preferences: Option<&UserPreferences>,
    ) -> Result<DecPools> {
        let starting_info = self
            .get_delegator_starting_info(target, &delegation.user)
            .ok_or(RewardsError::EmptyDelegationDistInfo)?;

        // Started this block: nothing earned yet.
        if starting_info.height == ctx.height {
            return Ok(DecPools::new());
        }

        let stakes = self.sanitized_stakes(target, delegation, &starting_info.stakes);
        Ok(self.rewards_between_periods(
            target,
            preferences,
            starting_info.previous_period,
            ending_period,
            &stakes,
        ))
    }

    /// Rewards `delegator` would receive by withdrawing now, computed
    /// without touching state.
    pub fn delegation_rewards_preview(&self, ctx: &BlockContext, target: &DelegationTarget, delegator: &Address) -> Result<DecPools> {
        let delegation = self.get_delegation(target, delegator)?;
        let starting_info = self
            .get_delegator_starting_info(target, delegator)
            .ok_or(RewardsError::EmptyDelegationDistInfo)?;
        if starting_info.height == ctx.height {
            return Ok(DecPools::new());
        }

        let current = self.get_current_rewards(target)?;
        let pending = self.compute_period_ratio(target, &current);
        let ending = self
            .historical_ratios(target, current.period - 1)
            .add(&pending.ratio);
        let starting = self.historical_ratios(target, starting_info.previous_period);

        let stakes = self.sanitized_stakes(target, &delegation, &starting_info.stakes);
        let preferences = self.collection_preferences(target, delegator)?;
        let raw = self.rewards_between_ratios(target, preferences.as_ref(), &starting, &ending, &stakes);

        let (community_funding, _) = pending.community_funding.truncate_decimal();
        let outstanding = self
            .get_outstanding_rewards(target.delegation_type(), target.id())
            .rewards
            .sub(&DecPools::from_pools(&community_funding));
        Ok(raw.intersect(&outstanding))
    }

    /// Settle the rewards of `delegation` and pay them to the delegator's
    /// withdraw address.
    ///
    /// The starting info is removed afterwards; callers must re-initialize
    /// the delegation (see [`RewardsKeeper::initialize_delegation`]).
    pub fn withdraw_delegation_rewards(
        &mut self,
        ctx: &BlockContext,
        target: &DelegationTarget,
        delegation: &Delegation,
    ) -> Result<Pools> {
        let preferences = self.collection_preferences(target, &delegation.user)?;
        self.settle_delegation_rewards(ctx, target, delegation, preferences.as_ref())
    }

    /// Withdraw under explicit trust preferences. Trust updates settle
    /// against the preferences that were in force while the rewards accrued.
    pub(crate) fn settle_delegation_rewards(
        &mut self,
        ctx: &BlockContext,
        target: &DelegationTarget,
        delegation: &Delegation,
        preferences: Option<&UserPreferences>,
    ) -> Result<Pools> {
        let delegation_type = target.delegation_type();
        let target_id = target.id();
        let delegator = delegation.user;

        let starting_info = self
            .get_delegator_starting_info(target, &delegator)
            .ok_or(RewardsError::EmptyDelegationDistInfo)?;

        let ending_period = self.increment_delegation_target_period(target)?;
        let raw = self.delegation_rewards_with(ctx, target, delegation, ending_period, preferences)?;
        let outstanding = self.get_outstanding_rewards(delegation_type, target_id).rewards;

        let rewards = raw.intersect(&outstanding);
        if rewards != raw {
            info!(
                target: "rewards",
                delegator = %delegator,
                delegation_type = %delegation_type,
                target_id,
                got = %rewards,
                expected = %raw,
                "rounding error withdrawing rewards from delegation target"
            );
        }

        let (pools, _) = rewards.truncate_decimal();
        let coins = pools.sum();
        if !coins.is_zero() {
            let withdraw_address = self.get_withdraw_address(&delegator);
            self.send_from_rewards_pool(&withdraw_address, &coins)?;
        }

        self.set_outstanding_rewards(delegation_type, target_id, outstanding.sub(&rewards));

        self.decrement_reference_count(delegation_type, target_id, starting_info.previous_period);
        self.state
            .store_mut(delegation_type)
            .remove_starting_info(target_id, &delegator);

        self.emit(RewardsEvent::WithdrawRewards {
            delegation_type,
            target_id,
            delegator,
            amount: coins,
        });

        Ok(pools)
    }

    /// Withdraw the rewards of `delegator` and start a new accrual window.
    pub fn claim_delegation_rewards(&mut self, ctx: &BlockContext, delegator: &Address, target: &DelegationTarget) -> Result<Pools> {
        let delegation = self.get_delegation(target, delegator)?;
        let rewards = self.withdraw_delegation_rewards(ctx, target, &delegation)?;
        self.initialize_delegation(ctx, target, delegator)?;
        Ok(rewards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::test_keeper;
    use restake_types::{DelegationType, Pool, TrustedServiceEntry};

    fn staked_pool() -> DelegationTarget {
        let mut pool = Pool::new(1, "umilk");
        pool.tokens = 100;
        pool.delegator_shares = Decimal::from(100);
        DelegationTarget::Pool(pool)
    }

    fn delegation_of(shares: u64) -> Delegation {
        Delegation::new(
            DelegationType::Pool,
            1,
            Address::from_seed("delegator"),
            DecCoins::single("umilk", Decimal::from(shares)),
        )
    }

    fn ratio(service_id: u32, amount: Decimal) -> ServicePools {
        ServicePools::single(service_id, DecPools::single("umilk", DecCoins::single("service", amount)))
    }

    #[test]
    fn test_sanitized_stakes_clamps_rounding_noise() {
        let keeper = test_keeper();
        let stored = DecCoins::single("umilk", Decimal::from(10) + smallest_dec() * Decimal::from(3));
        let stakes = keeper.sanitized_stakes(&staked_pool(), &delegation_of(10), &stored);
        assert_eq!(stakes, DecCoins::single("umilk", Decimal::from(10)));
    }

    #[test]
    fn test_sanitized_stakes_keeps_smaller_stake() {
        let keeper = test_keeper();
        let stored = DecCoins::single("umilk", Decimal::from(7));
        let stakes = keeper.sanitized_stakes(&staked_pool(), &delegation_of(10), &stored);
        assert_eq!(stakes, stored);
    }

    #[test]
    #[should_panic(expected = "greater than current stake")]
    fn test_sanitized_stakes_panics_beyond_tolerance() {
        let keeper = test_keeper();
        let stored = DecCoins::single("umilk", Decimal::from(10) + smallest_dec() * Decimal::from(4));
        keeper.sanitized_stakes(&staked_pool(), &delegation_of(10), &stored);
    }

    #[test]
    fn test_rewards_between_ratios_only_pays_trusted_services() {
        let keeper = test_keeper();
        let mut ending = ratio(1, Decimal::new(5, 1));
        ending.add_pools(2, &DecPools::single("umilk", DecCoins::single("service", Decimal::ONE)));
        let stakes = DecCoins::single("umilk", Decimal::from(10));
        let preferences = UserPreferences::new(vec![TrustedServiceEntry::new(1, vec![1])]);

        let rewards = keeper.rewards_between_ratios(
            &staked_pool(),
            Some(&preferences),
            &ServicePools::new(),
            &ending,
            &stakes,
        );
        assert_eq!(
            rewards,
            DecPools::single("umilk", DecCoins::single("service", Decimal::from(5)))
        );

        let everything = keeper.rewards_between_ratios(&staked_pool(), None, &ServicePools::new(), &ending, &stakes);
        assert_eq!(
            everything,
            DecPools::single("umilk", DecCoins::single("service", Decimal::from(15)))
        );
    }

    #[test]
    #[should_panic(expected = "negative rewards ratio")]
    fn test_negative_ratio_difference_panics() {
        let keeper = test_keeper();
        keeper.rewards_between_ratios(
            &staked_pool(),
            None,
            &ratio(1, Decimal::ONE),
            &ratio(1, Decimal::new(5, 1)),
            &DecCoins::single("umilk", Decimal::from(10)),
        );
    }

    #[test]
    #[should_panic(expected = "starting period cannot be greater than ending period")]
    fn test_starting_after_ending_period_panics() {
        let mut keeper = test_keeper();
        let pool = staked_pool();
        keeper.initialize_delegation_target(&pool);
        keeper.rewards_between_periods(&pool, None, 2, 1, &DecCoins::single("umilk", Decimal::from(10)));
    }
}
