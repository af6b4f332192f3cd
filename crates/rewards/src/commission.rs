//! Operator commission: the operator's cut of rewards sent to it.

use crate::errors::{Result, RewardsError};
use crate::events::RewardsEvent;
use crate::keeper::RewardsKeeper;
use crate::state::AccumulatedCommission;
use restake_types::{DecCoins, DecPools, Decimal, DelegationType, Operator, Pools};
use tracing::info;

/// Split operator rewards into `(commission, delegators_share)`.
///
/// The commission is truncated and the delegators get exactly the rest, so
/// the two parts always add up to `rewards`.
pub fn split_commission(rewards: &DecCoins, commission_rate: Decimal) -> (DecCoins, DecCoins) {
    let commission = rewards.mul_dec_truncate(commission_rate);
    let shared = rewards.sub(&commission);
    (commission, shared)
}

impl RewardsKeeper {
    pub fn get_operator_accumulated_commission(&self, operator_id: u32) -> AccumulatedCommission {
        self.state
            .operator_accumulated_commissions
            .get(&operator_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn add_operator_commission(&mut self, operator_id: u32, denom: &str, commission: &DecCoins) {
        let entry = self
            .state
            .operator_accumulated_commissions
            .entry(operator_id)
            .or_default();
        entry.commissions.add_dec_coins(denom, commission);
    }

    /// Pay the whole-coin part of an operator's commission to the admin's
    /// withdraw address. Fractions stay accumulated for next time.
    pub fn withdraw_operator_commission(&mut self, operator_id: u32) -> Result<Pools> {
        let operator = self
            .operators
            .get_operator(operator_id)?
            .ok_or(RewardsError::TargetNotFound(DelegationType::Operator, operator_id))?;
        self.settle_operator_commission(&operator)
    }

    pub(crate) fn settle_operator_commission(&mut self, operator: &Operator) -> Result<Pools> {
        let accumulated = self.get_operator_accumulated_commission(operator.id);
        if accumulated.commissions.is_empty() {
            return Err(RewardsError::NoOperatorCommission);
        }

        let (commissions, remainder) = accumulated.commissions.truncate_decimal();
        self.state.operator_accumulated_commissions.insert(
            operator.id,
            AccumulatedCommission {
                commissions: remainder,
            },
        );

        let outstanding = self.get_outstanding_rewards(DelegationType::Operator, operator.id);
        self.set_outstanding_rewards(
            DelegationType::Operator,
            operator.id,
            outstanding.rewards.sub(&DecPools::from_pools(&commissions)),
        );

        let coins = commissions.sum();
        if !coins.is_zero() {
            let withdraw_address = self.get_withdraw_address(&operator.admin);
            self.send_from_rewards_pool(&withdraw_address, &coins)?;
        }

        info!(
            target: "rewards",
            operator_id = operator.id,
            amount = %coins,
            "withdrew operator commission"
        );
        self.emit(RewardsEvent::WithdrawCommission {
            operator_id: operator.id,
            amount: coins,
        });

        Ok(commissions)
    }
}
