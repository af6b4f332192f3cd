//! Rewards plan lifecycle: creation, edits, fees and termination.

use crate::errors::{Result, RewardsError};
use crate::events::RewardsEvent;
use crate::keeper::{BlockContext, RewardsKeeper};
use crate::plan::{Distribution, DistributionType, RewardsPlan, UsersDistribution};
use chrono::{DateTime, Utc};
use restake_types::{Address, Coin, Coins, DelegationType};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Editable terms of a plan. The service and the id never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTerms {
    pub description: String,
    pub amount_per_day: Coin,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub pools_distribution: Distribution,
    pub operators_distribution: Distribution,
    pub users_distribution: UsersDistribution,
}

impl PlanTerms {
    fn into_plan(self, id: u64, service_id: u32) -> RewardsPlan {
        RewardsPlan::new(
            id,
            self.description,
            service_id,
            self.amount_per_day,
            self.start_time,
            self.end_time,
            self.pools_distribution,
            self.operators_distribution,
            self.users_distribution,
        )
    }
}

impl RewardsKeeper {
    pub fn get_rewards_plan(&self, plan_id: u64) -> Result<RewardsPlan> {
        self.state
            .rewards_plans
            .get(&plan_id)
            .cloned()
            .ok_or(RewardsError::PlanNotFound(plan_id))
    }

    pub fn get_rewards_plans(&self) -> Vec<RewardsPlan> {
        self.state.rewards_plans.values().cloned().collect()
    }

    /// Store a new plan for `service_id` under the next plan id.
    pub fn create_rewards_plan(&mut self, service_id: u32, terms: PlanTerms) -> Result<RewardsPlan> {
        self.services
            .get_service(service_id)?
            .ok_or(RewardsError::TargetNotFound(DelegationType::Service, service_id))?;

        let plan_id = self.state.next_rewards_plan_id;
        let plan = terms.into_plan(plan_id, service_id);
        plan.validate()?;
        self.validate_distribution_targets(&plan.pools_distribution)?;
        self.validate_distribution_targets(&plan.operators_distribution)?;

        self.state.next_rewards_plan_id += 1;
        self.state.rewards_plans.insert(plan_id, plan.clone());
        info!(
            target: "rewards",
            plan_id,
            service_id,
            amount_per_day = %plan.amount_per_day,
            escrow = %plan.rewards_pool,
            "created rewards plan"
        );
        Ok(plan)
    }

    /// Replace the terms of a plan that has not ended yet.
    pub fn edit_rewards_plan(&mut self, ctx: &BlockContext, plan_id: u64, terms: PlanTerms) -> Result<RewardsPlan> {
        if plan_id == 0 {
            return Err(RewardsError::InvalidRequest("invalid plan ID".into()));
        }
        let existing = self.get_rewards_plan(plan_id)?;
        if ctx.time >= existing.end_time {
            return Err(RewardsError::InvalidRequest("rewards plan is completed".into()));
        }

        self.validate_distribution_targets(&terms.pools_distribution)?;
        self.validate_distribution_targets(&terms.operators_distribution)?;

        let edited = terms.into_plan(plan_id, existing.service_id);
        edited.validate()?;
        self.state.rewards_plans.insert(plan_id, edited.clone());
        Ok(edited)
    }

    /// Weighted distributions may only name targets that exist.
    fn validate_distribution_targets(&self, distribution: &Distribution) -> Result<()> {
        let DistributionType::Weighted { weights } = &distribution.distribution_type else {
            return Ok(());
        };
        for weight in weights {
            self.get_delegation_target(distribution.delegation_type, weight.delegation_target_id)?;
        }
        Ok(())
    }

    /// Charge the plan creation fee to `payer`, using the first fee coin it
    /// can afford. The fee goes to the community pool.
    pub fn pay_rewards_plan_creation_fee(&mut self, payer: &Address) -> Result<()> {
        let fee = self.state.params.rewards_plan_creation_fee.clone();
        if fee.is_zero() {
            return Ok(());
        }

        let balance = self.bank.get_all_balances(payer);
        for (denom, amount) in fee.iter() {
            if balance.amount_of(denom) >= amount {
                return self.fund_community_pool(payer, &Coins::single(denom, amount));
            }
        }
        Err(RewardsError::InsufficientFunds(format!(
            "not enough balance to pay the rewards plan creation fee: {fee}"
        )))
    }

    /// Close every plan whose end time has been reached. What is left in the
    /// escrow goes back to the service.
    pub fn terminate_ended_rewards_plans(&mut self, ctx: &BlockContext) -> Result<()> {
        let ended: Vec<RewardsPlan> = self
            .state
            .rewards_plans
            .values()
            .filter(|plan| ctx.time >= plan.end_time)
            .cloned()
            .collect();

        for plan in ended {
            self.terminate_rewards_plan(&plan)?;
        }
        Ok(())
    }

    fn terminate_rewards_plan(&mut self, plan: &RewardsPlan) -> Result<()> {
        let remaining = self.bank.get_all_balances(&plan.rewards_pool);
        if !remaining.is_zero() {
            match self.services.get_service(plan.service_id)? {
                Some(service) => {
                    self.bank
                        .send_coins(&plan.rewards_pool, &service.address, &remaining)?;
                }
                None => {
                    warn!(
                        target: "rewards",
                        plan_id = plan.id,
                        service_id = plan.service_id,
                        remaining = %remaining,
                        "service of terminated plan no longer exists, sending remaining rewards to community pool"
                    );
                    self.fund_community_pool(&plan.rewards_pool, &remaining)?;
                }
            }
        }

        self.state.rewards_plans.remove(&plan.id);
        info!(
            target: "rewards",
            plan_id = plan.id,
            remaining = %remaining,
            "terminated rewards plan"
        );
        self.emit(RewardsEvent::TerminateRewardsPlan {
            plan_id: plan.id,
            remaining_rewards: remaining,
        });
        Ok(())
    }
}
