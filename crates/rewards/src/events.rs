//! Typed events emitted by the rewards engine.

use restake_types::{Address, Coins, DecCoins, DelegationType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardsEvent {
    CreateRewardsPlan {
        plan_id: u64,
        service_id: u32,
    },
    EditRewardsPlan {
        plan_id: u64,
        service_id: u32,
    },
    TerminateRewardsPlan {
        plan_id: u64,
        remaining_rewards: Coins,
    },
    SetWithdrawAddress {
        sender: Address,
        withdraw_address: Address,
    },
    /// Rewards credited to a target for one staked denom (pre-commission).
    Rewards {
        delegation_type: DelegationType,
        target_id: u32,
        pool: String,
        amount: DecCoins,
    },
    Commission {
        operator_id: u32,
        pool: String,
        amount: DecCoins,
    },
    WithdrawRewards {
        delegation_type: DelegationType,
        target_id: u32,
        delegator: Address,
        amount: Coins,
    },
    WithdrawCommission {
        operator_id: u32,
        amount: Coins,
    },
}

impl RewardsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RewardsEvent::CreateRewardsPlan { .. } => "create_rewards_plan",
            RewardsEvent::EditRewardsPlan { .. } => "edit_rewards_plan",
            RewardsEvent::TerminateRewardsPlan { .. } => "terminate_rewards_plan",
            RewardsEvent::SetWithdrawAddress { .. } => "set_withdraw_address",
            RewardsEvent::Rewards { .. } => "rewards",
            RewardsEvent::Commission { .. } => "commission",
            RewardsEvent::WithdrawRewards { .. } => "withdraw_rewards",
            RewardsEvent::WithdrawCommission { .. } => "withdraw_commission",
        }
    }
}
