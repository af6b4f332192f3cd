//! Transaction handlers.
//!
//! Every handler runs inside [`RewardsKeeper::cache_context`]: a failing
//! message leaves no state or events behind.

use crate::errors::{Result, RewardsError};
use crate::events::RewardsEvent;
use crate::keeper::{BlockContext, RewardsKeeper};
use crate::params::Params;
use crate::plans::PlanTerms;
use restake_types::{Address, Coins, DelegationType};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateRewardsPlan {
    pub sender: Address,
    pub service_id: u32,
    pub terms: PlanTerms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEditRewardsPlan {
    pub sender: Address,
    pub plan_id: u64,
    pub terms: PlanTerms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetWithdrawAddress {
    pub sender: Address,
    pub withdraw_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWithdrawDelegatorReward {
    pub delegator: Address,
    pub delegation_type: DelegationType,
    pub target_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWithdrawOperatorCommission {
    pub sender: Address,
    pub operator_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateParams {
    pub authority: Address,
    pub params: Params,
}

/// Any message the rewards engine accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum RewardsMsg {
    CreateRewardsPlan(MsgCreateRewardsPlan),
    EditRewardsPlan(MsgEditRewardsPlan),
    SetWithdrawAddress(MsgSetWithdrawAddress),
    WithdrawDelegatorReward(MsgWithdrawDelegatorReward),
    WithdrawOperatorCommission(MsgWithdrawOperatorCommission),
    UpdateParams(MsgUpdateParams),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum RewardsMsgResponse {
    CreateRewardsPlan { plan_id: u64 },
    EditRewardsPlan,
    SetWithdrawAddress,
    WithdrawDelegatorReward { amount: Coins },
    WithdrawOperatorCommission { amount: Coins },
    UpdateParams,
}

impl RewardsKeeper {
    pub fn handle_msg(&mut self, ctx: &BlockContext, msg: RewardsMsg) -> Result<RewardsMsgResponse> {
        match msg {
            RewardsMsg::CreateRewardsPlan(msg) => self
                .msg_create_rewards_plan(msg)
                .map(|plan_id| RewardsMsgResponse::CreateRewardsPlan { plan_id }),
            RewardsMsg::EditRewardsPlan(msg) => self
                .msg_edit_rewards_plan(ctx, msg)
                .map(|_| RewardsMsgResponse::EditRewardsPlan),
            RewardsMsg::SetWithdrawAddress(msg) => self
                .msg_set_withdraw_address(msg)
                .map(|_| RewardsMsgResponse::SetWithdrawAddress),
            RewardsMsg::WithdrawDelegatorReward(msg) => self
                .msg_withdraw_delegator_reward(ctx, msg)
                .map(|amount| RewardsMsgResponse::WithdrawDelegatorReward { amount }),
            RewardsMsg::WithdrawOperatorCommission(msg) => self
                .msg_withdraw_operator_commission(msg)
                .map(|amount| RewardsMsgResponse::WithdrawOperatorCommission { amount }),
            RewardsMsg::UpdateParams(msg) => self
                .msg_update_params(msg)
                .map(|_| RewardsMsgResponse::UpdateParams),
        }
    }

    /// Returns the id of the new plan.
    pub fn msg_create_rewards_plan(&mut self, msg: MsgCreateRewardsPlan) -> Result<u64> {
        self.cache_context(|k| {
            let service = k
                .services
                .get_service(msg.service_id)?
                .ok_or(RewardsError::TargetNotFound(DelegationType::Service, msg.service_id))?;
            if msg.sender != service.admin {
                return Err(RewardsError::Unauthorized(
                    "only service admin can create rewards plan".into(),
                ));
            }

            let plan = k.create_rewards_plan(msg.service_id, msg.terms)?;
            k.pay_rewards_plan_creation_fee(&msg.sender)?;

            k.emit(RewardsEvent::CreateRewardsPlan {
                plan_id: plan.id,
                service_id: plan.service_id,
            });
            Ok(plan.id)
        })
    }

    pub fn msg_edit_rewards_plan(&mut self, ctx: &BlockContext, msg: MsgEditRewardsPlan) -> Result<()> {
        self.cache_context(|k| {
            let plan = k.get_rewards_plan(msg.plan_id)?;
            let service = k
                .services
                .get_service(plan.service_id)?
                .ok_or(RewardsError::TargetNotFound(DelegationType::Service, plan.service_id))?;
            if msg.sender != service.admin {
                return Err(RewardsError::Unauthorized(
                    "only service admin can edit rewards plan".into(),
                ));
            }

            k.edit_rewards_plan(ctx, msg.plan_id, msg.terms)?;
            k.emit(RewardsEvent::EditRewardsPlan {
                plan_id: plan.id,
                service_id: plan.service_id,
            });
            Ok(())
        })
    }

    pub fn msg_set_withdraw_address(&mut self, msg: MsgSetWithdrawAddress) -> Result<()> {
        self.cache_context(|k| {
            k.set_withdraw_address(msg.sender, msg.withdraw_address)?;
            k.emit(RewardsEvent::SetWithdrawAddress {
                sender: msg.sender,
                withdraw_address: msg.withdraw_address,
            });
            Ok(())
        })
    }

    /// Returns the withdrawn amount.
    pub fn msg_withdraw_delegator_reward(&mut self, ctx: &BlockContext, msg: MsgWithdrawDelegatorReward) -> Result<Coins> {
        if msg.target_id == 0 {
            return Err(RewardsError::InvalidRequest(format!(
                "invalid delegation target ID: {}",
                msg.target_id
            )));
        }
        self.cache_context(|k| {
            let target = k.get_delegation_target(msg.delegation_type, msg.target_id)?;
            let rewards = k.claim_delegation_rewards(ctx, &msg.delegator, &target)?;
            Ok(rewards.sum())
        })
    }

    /// Returns the withdrawn commission.
    pub fn msg_withdraw_operator_commission(&mut self, msg: MsgWithdrawOperatorCommission) -> Result<Coins> {
        self.cache_context(|k| {
            let operator = k
                .operators
                .get_operator(msg.operator_id)?
                .ok_or(RewardsError::TargetNotFound(DelegationType::Operator, msg.operator_id))?;
            if msg.sender != operator.admin {
                return Err(RewardsError::Unauthorized(
                    "only operator admin can withdraw operator commission".into(),
                ));
            }
            let commission = k.withdraw_operator_commission(msg.operator_id)?;
            Ok(commission.sum())
        })
    }

    pub fn msg_update_params(&mut self, msg: MsgUpdateParams) -> Result<()> {
        if msg.authority != self.authority {
            return Err(RewardsError::Unauthorized(format!(
                "invalid authority; expected {}, got {}",
                self.authority, msg.authority
            )));
        }
        msg.params.validate()?;
        self.state.params = msg.params;
        info!(target: "rewards", params = ?self.state.params, "updated params");
        Ok(())
    }
}
