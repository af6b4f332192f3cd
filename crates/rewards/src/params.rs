//! Module parameters and well-known accounts.

use crate::errors::{Result, RewardsError};
use restake_types::{validate_denom, Address, Coins};
use serde::{Deserialize, Serialize};

pub const MODULE_NAME: &str = "rewards";

/// Account holding every reward that has been allocated but not withdrawn.
pub const REWARDS_POOL_NAME: &str = "rewards_pool";

/// Account collecting creation fees and rewards that nobody can claim.
pub const COMMUNITY_POOL_NAME: &str = "community_pool";

/// Upper bound on a rewards plan description.
pub const MAX_REWARDS_PLAN_DESCRIPTION_LENGTH: usize = 1000;

/// Milliseconds per day; plan amounts are expressed per day.
pub const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

pub fn rewards_pool_address() -> Address {
    Address::module(REWARDS_POOL_NAME)
}

pub fn community_pool_address() -> Address {
    Address::module(COMMUNITY_POOL_NAME)
}

/// Escrow account funding a plan, derived from its id.
pub fn rewards_plan_escrow_address(plan_id: u64) -> Address {
    Address::derived(MODULE_NAME, &format!("rewards-plan-{plan_id}"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Fee charged for creating a plan. Any single listed coin is enough.
    #[serde(default)]
    pub rewards_plan_creation_fee: Coins,
}

impl Params {
    pub fn new(rewards_plan_creation_fee: Coins) -> Self {
        Self {
            rewards_plan_creation_fee,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for denom in self.rewards_plan_creation_fee.denoms() {
            validate_denom(denom).map_err(|err| {
                RewardsError::InvalidParams(format!("invalid rewards plan creation fee: {err}"))
            })?;
        }
        Ok(())
    }
}
