//! Per-block allocation of rewards plans to delegation targets.

use crate::commission::split_commission;
use crate::distribution::{split_between_groups, DistributionInfo, GroupValues};
use crate::errors::Result;
use crate::events::RewardsEvent;
use crate::keeper::{BlockContext, RewardsKeeper};
use crate::params::{rewards_pool_address, DAY_MILLIS};
use crate::plan::{DistributionType, RewardsPlan, UsersDistributionType};
use restake_types::{
    dec_from_amount, Coins, DecCoins, DecExt, DecPools, Decimal, DelegationTarget, Operator,
    Pool, Service,
};
use tracing::{debug, info};

/// Denoms a plan's service counts as stake, given the global restakable
/// list and the service's own allow-list. `None` means the two lists do not
/// overlap and the plan cannot pay anything.
pub fn service_restakable_denoms(global: &[String], service_allowed: &[String]) -> Option<Vec<String>> {
    if global.is_empty() {
        return Some(service_allowed.to_vec());
    }
    if service_allowed.is_empty() {
        return Some(global.to_vec());
    }
    let common: Vec<String> = service_allowed
        .iter()
        .filter(|denom| global.contains(denom))
        .cloned()
        .collect();
    if common.is_empty() {
        None
    } else {
        Some(common)
    }
}

/// Rewards owed for `elapsed_millis` of a daily amount, truncated to whole
/// coins.
pub fn tick_amount(amount_per_day: u128, elapsed_millis: i64) -> u128 {
    dec_from_amount(amount_per_day)
        .mul_quo_truncate(Decimal::from(elapsed_millis), Decimal::from(DAY_MILLIS))
        .to_amount()
}

fn restakable_tokens(tokens: &Coins, denoms: &[String]) -> Coins {
    if denoms.is_empty() {
        tokens.clone()
    } else {
        tokens.filter_denoms(denoms)
    }
}

impl RewardsKeeper {
    /// Block entry point: allocate active plans, then close ended ones.
    pub fn begin_block(&mut self, ctx: &BlockContext) -> Result<()> {
        self.allocate_rewards(ctx)?;
        self.terminate_ended_rewards_plans(ctx)
    }

    /// Pay every active plan for the time elapsed since the previous call.
    ///
    /// The first call only records the block time. The time is always
    /// recorded, so skipped ticks are never paid later.
    pub fn allocate_rewards(&mut self, ctx: &BlockContext) -> Result<()> {
        let last = self.state.last_rewards_allocation_time.replace(ctx.time);
        let Some(last) = last else {
            debug!(target: "rewards", time = %ctx.time, "recorded first rewards allocation time");
            return Ok(());
        };

        let elapsed_millis = (ctx.time - last).num_milliseconds();
        if elapsed_millis <= 0 {
            return Ok(());
        }

        let restakable_denoms = self.restaking.get_restakable_denoms()?;
        let pools: Vec<Pool> = self
            .pools
            .get_pools()?
            .into_iter()
            .filter(|pool| restakable_denoms.is_empty() || restakable_denoms.contains(&pool.denom))
            .collect();
        let operators = self.operators.get_operators()?;

        let plans: Vec<RewardsPlan> = self
            .state
            .rewards_plans
            .values()
            .filter(|plan| plan.is_active_at(ctx.time))
            .cloned()
            .collect();

        for plan in plans {
            let Some(service) = self.services.get_service(plan.service_id)? else {
                info!(
                    target: "rewards",
                    plan_id = plan.id,
                    service_id = plan.service_id,
                    "skipping rewards plan of unknown service"
                );
                continue;
            };
            let service_params = self.services.get_service_params(plan.service_id)?;
            let Some(denoms) =
                service_restakable_denoms(&restakable_denoms, &service_params.allowed_denoms)
            else {
                info!(
                    target: "rewards",
                    plan_id = plan.id,
                    "skipping rewards plan because none of the service's allowed denoms are restakable"
                );
                continue;
            };
            self.allocate_rewards_by_plan(&plan, &service, elapsed_millis, &pools, &operators, &denoms)?;
        }
        Ok(())
    }

    /// Allocate one plan's tick to pools, operators and the service's own
    /// delegators.
    pub fn allocate_rewards_by_plan(
        &mut self,
        plan: &RewardsPlan,
        service: &Service,
        elapsed_millis: i64,
        pools: &[Pool],
        operators: &[Operator],
        restakable_denoms: &[String],
    ) -> Result<()> {
        let eligible_pools = self.eligible_pools(service, pools)?;
        let (pool_infos, pools_value) = self.distribution_infos(eligible_pools, restakable_denoms)?;

        let eligible_operators = self.eligible_operators(service, operators)?;
        let (operator_infos, operators_value) =
            self.distribution_infos(eligible_operators, restakable_denoms)?;

        let users_tokens = restakable_tokens(&service.tokens, restakable_denoms);
        let users_value = self.oracle.coins_value(&users_tokens)?;

        let values = GroupValues {
            pools: pools_value,
            operators: operators_value,
            users: users_value,
        };
        if values.total().is_zero() {
            debug!(target: "rewards", plan_id = plan.id, "no delegations to reward");
            return Ok(());
        }

        let tick = Coins::single(
            plan.amount_per_day.denom.clone(),
            tick_amount(plan.amount_per_day.amount, elapsed_millis),
        );
        let balances = self.bank.get_all_balances(&plan.rewards_pool);
        if !balances.is_all_gte(&tick) {
            info!(
                target: "rewards",
                plan_id = plan.id,
                balances = %balances,
                rewards = %tick,
                "skipping rewards plan because its rewards pool has insufficient balances"
            );
            return Ok(());
        }
        if tick.is_zero() {
            return Ok(());
        }
        self.bank
            .send_coins(&plan.rewards_pool, &rewards_pool_address(), &tick)?;

        let rewards = DecCoins::from_coins(&tick);
        let split = split_between_groups(plan, &values, &rewards);

        if split.pools.is_all_positive() {
            self.allocate_group(
                plan.service_id,
                &plan.pools_distribution.distribution_type,
                &pool_infos,
                &split.pools,
            )?;
        }
        if split.operators.is_all_positive() {
            self.allocate_group(
                plan.service_id,
                &plan.operators_distribution.distribution_type,
                &operator_infos,
                &split.operators,
            )?;
        }
        if split.users.is_all_positive() {
            match plan.users_distribution.distribution_type {
                UsersDistributionType::Basic => {
                    let info = DistributionInfo {
                        target: DelegationTarget::Service(service.clone()),
                        tokens: users_tokens,
                        delegations_value: users_value,
                    };
                    self.allocate_delegation_target_rewards(plan.service_id, &info, &split.users)?;
                }
            }
        }

        debug!(
            target: "rewards",
            plan_id = plan.id,
            amount = %tick,
            pools = %split.pools,
            operators = %split.operators,
            users = %split.users,
            "allocated rewards plan tick"
        );
        Ok(())
    }

    /// Pools the service borrows security from, provided pools may secure it
    /// at all.
    fn eligible_pools(&self, service: &Service, pools: &[Pool]) -> Result<Vec<DelegationTarget>> {
        let params = self.pools.get_params()?;
        if !params.allowed_services_ids.contains(&service.id) {
            return Ok(Vec::new());
        }
        let mut eligible = Vec::new();
        for pool in pools {
            if self.is_service_secured_by_pool(service.id, pool.id)? {
                eligible.push(DelegationTarget::Pool(pool.clone()));
            }
        }
        Ok(eligible)
    }

    /// Active operators that joined the service and may validate it.
    fn eligible_operators(&self, service: &Service, operators: &[Operator]) -> Result<Vec<DelegationTarget>> {
        let mut eligible = Vec::new();
        for operator in operators {
            if !operator.is_active() {
                continue;
            }
            if !self
                .restaking
                .has_operator_joined_service(operator.id, service.id)?
            {
                continue;
            }
            if self.can_operator_validate_service(service.id, operator.id)? {
                eligible.push(DelegationTarget::Operator(operator.clone()));
            }
        }
        Ok(eligible)
    }

    /// Value every candidate's restakable stake, dropping worthless ones.
    fn distribution_infos(
        &self,
        targets: Vec<DelegationTarget>,
        restakable_denoms: &[String],
    ) -> Result<(Vec<DistributionInfo>, Decimal)> {
        let mut infos = Vec::new();
        let mut total = Decimal::ZERO;
        for target in targets {
            let tokens = restakable_tokens(&target.tokens(), restakable_denoms);
            let value = self.oracle.coins_value(&tokens)?;
            if value.is_zero() {
                continue;
            }
            total += value;
            infos.push(DistributionInfo {
                target,
                tokens,
                delegations_value: value,
            });
        }
        Ok((infos, total))
    }

    fn allocate_group(
        &mut self,
        service_id: u32,
        distribution_type: &DistributionType,
        infos: &[DistributionInfo],
        rewards: &DecCoins,
    ) -> Result<()> {
        for (info, share) in distribution_type.split(infos, rewards) {
            self.allocate_delegation_target_rewards(service_id, info, &share)?;
        }
        Ok(())
    }

    /// Spread a target's share over its staked denoms by value.
    fn allocate_delegation_target_rewards(
        &mut self,
        service_id: u32,
        info: &DistributionInfo,
        rewards: &DecCoins,
    ) -> Result<()> {
        for (denom, amount) in info.tokens.iter() {
            let token_value = self.oracle.coin_value(denom, amount)?;
            if token_value.is_zero() {
                continue;
            }
            let token_rewards = rewards.mul_quo_dec_truncate(token_value, info.delegations_value);
            self.allocate_rewards_pool(service_id, &info.target, denom, &token_rewards)?;
        }
        Ok(())
    }

    /// Credit `rewards` earned on `denom` stake to a target.
    fn allocate_rewards_pool(
        &mut self,
        service_id: u32,
        target: &DelegationTarget,
        denom: &str,
        rewards: &DecCoins,
    ) -> Result<()> {
        if rewards.is_empty() {
            return Ok(());
        }
        if !self.has_delegation_target_ledger(target.delegation_type(), target.id()) {
            self.initialize_delegation_target(target);
        }

        let mut shared = rewards.clone();
        if let DelegationTarget::Operator(operator) = target {
            let params = self.operators.get_operator_params(operator.id)?;
            let (commission, rest) = split_commission(rewards, params.commission_rate);
            self.emit(RewardsEvent::Commission {
                operator_id: operator.id,
                pool: denom.to_string(),
                amount: commission.clone(),
            });
            self.add_operator_commission(operator.id, denom, &commission);
            shared = rest;
        }

        let mut current = self.get_current_rewards(target)?;
        current
            .rewards
            .add_pools(service_id, &DecPools::single(denom, shared));
        self.state
            .store_mut(target.delegation_type())
            .current
            .insert(target.id(), current);

        let outstanding = self.get_outstanding_rewards(target.delegation_type(), target.id());
        self.set_outstanding_rewards(
            target.delegation_type(),
            target.id(),
            outstanding
                .rewards
                .add(&DecPools::single(denom, rewards.clone())),
        );

        self.emit(RewardsEvent::Rewards {
            delegation_type: target.delegation_type(),
            target_id: target.id(),
            pool: denom.to_string(),
            amount: rewards.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_amount_for_ten_seconds() {
        // 100_000000 per day, 10s elapsed.
        assert_eq!(tick_amount(100_000_000, 10_000), 11_574);
    }

    #[test]
    fn test_tick_amount_full_day() {
        assert_eq!(tick_amount(1_000, DAY_MILLIS), 1_000);
        assert_eq!(tick_amount(1_000, 0), 0);
    }

    #[test]
    fn test_service_restakable_denoms() {
        let s = |v: &[&str]| v.iter().map(|d| d.to_string()).collect::<Vec<_>>();

        assert_eq!(service_restakable_denoms(&[], &s(&["umilk"])), Some(s(&["umilk"])));
        assert_eq!(service_restakable_denoms(&s(&["umilk"]), &[]), Some(s(&["umilk"])));
        assert_eq!(
            service_restakable_denoms(&s(&["umilk", "uinit"]), &s(&["uinit", "uatom"])),
            Some(s(&["uinit"]))
        );
        assert_eq!(service_restakable_denoms(&s(&["umilk"]), &s(&["uatom"])), None);
    }
}
