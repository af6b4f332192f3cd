//! Read-only queries. None of these touch state.

use crate::errors::{Result, RewardsError};
use crate::keeper::{BlockContext, RewardsKeeper};
use crate::params::Params;
use crate::plan::RewardsPlan;
use restake_types::{Address, DecCoins, DecPools, DelegationType};
use serde::{Deserialize, Serialize};

/// Pending rewards of one delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationReward {
    pub delegation_type: DelegationType,
    pub target_id: u32,
    pub reward: DecPools,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorTotalRewards {
    pub rewards: Vec<DelegationReward>,
    pub total: DecCoins,
}

impl RewardsKeeper {
    pub fn query_params(&self) -> Params {
        self.state.params.clone()
    }

    pub fn query_rewards_plan(&self, plan_id: u64) -> Result<RewardsPlan> {
        self.get_rewards_plan(plan_id)
    }

    pub fn query_rewards_plans(&self) -> Vec<RewardsPlan> {
        self.get_rewards_plans()
    }

    pub fn query_outstanding_rewards(&self, delegation_type: DelegationType, target_id: u32) -> Result<DecPools> {
        self.get_delegation_target(delegation_type, target_id)?;
        Ok(self.get_outstanding_rewards(delegation_type, target_id).rewards)
    }

    pub fn query_operator_commission(&self, operator_id: u32) -> Result<DecPools> {
        self.get_delegation_target(DelegationType::Operator, operator_id)?;
        Ok(self.get_operator_accumulated_commission(operator_id).commissions)
    }

    /// What `delegator` would receive by withdrawing from the target now.
    pub fn query_delegation_rewards(
        &self,
        ctx: &BlockContext,
        delegation_type: DelegationType,
        target_id: u32,
        delegator: &Address,
    ) -> Result<DecPools> {
        if target_id == 0 {
            return Err(RewardsError::InvalidRequest("invalid delegation target ID: 0".into()));
        }
        let target = self.get_delegation_target(delegation_type, target_id)?;
        self.delegation_rewards_preview(ctx, &target, delegator)
    }

    /// Pending rewards over every delegation of `delegator`.
    pub fn query_delegator_total_rewards(&self, ctx: &BlockContext, delegator: &Address) -> Result<DelegatorTotalRewards> {
        let mut out = DelegatorTotalRewards::default();
        for delegation_type in DelegationType::ALL {
            for delegation in self.restaking.get_all_delegations(delegation_type)? {
                if delegation.user != *delegator {
                    continue;
                }
                let target = self.get_delegation_target(delegation_type, delegation.target_id)?;
                let reward = self.delegation_rewards_preview(ctx, &target, delegator)?;
                out.total = out.total.add(&reward.sum());
                out.rewards.push(DelegationReward {
                    delegation_type,
                    target_id: delegation.target_id,
                    reward,
                });
            }
        }
        Ok(out)
    }

    pub fn query_delegator_withdraw_address(&self, delegator: &Address) -> Address {
        self.get_withdraw_address(delegator)
    }

    pub fn query_pool_service_total_delegator_shares(&self, pool_id: u32, service_id: u32) -> DecCoins {
        self.get_pool_service_total_delegator_shares(pool_id, service_id)
    }
}
