//! Rewards plans and their distribution settings.

use crate::errors::{Result, RewardsError};
use crate::params::{rewards_plan_escrow_address, MAX_REWARDS_PLAN_DESCRIPTION_LENGTH};
use chrono::{DateTime, Utc};
use restake_types::{validate_denom, Address, Coin, DelegationType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Explicit weight of one target inside a weighted distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionWeight {
    pub delegation_target_id: u32,
    pub weight: u32,
}

impl DistributionWeight {
    pub fn new(delegation_target_id: u32, weight: u32) -> Self {
        Self {
            delegation_target_id,
            weight,
        }
    }
}

/// How a group's share is split among its targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionType {
    /// Proportional to each target's delegation value.
    Basic,
    /// Proportional to the listed weights.
    Weighted { weights: Vec<DistributionWeight> },
    /// Equal parts for every eligible target.
    Egalitarian,
}

impl DistributionType {
    pub fn validate(&self) -> Result<()> {
        let DistributionType::Weighted { weights } = self else {
            return Ok(());
        };
        if weights.is_empty() {
            return Err(RewardsError::InvalidPlan(
                "weighted distribution must list at least one target".into(),
            ));
        }
        let mut seen = HashSet::new();
        for weight in weights {
            if !seen.insert(weight.delegation_target_id) {
                return Err(RewardsError::InvalidPlan(format!(
                    "duplicated weight for the same delegation target ID: {}",
                    weight.delegation_target_id
                )));
            }
            if weight.weight == 0 {
                return Err(RewardsError::InvalidPlan(format!(
                    "weight must be positive: {}",
                    weight.weight
                )));
            }
            if weight.delegation_target_id == 0 {
                return Err(RewardsError::InvalidPlan(
                    "invalid delegation target ID: 0".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Distribution settings for the pools or the operators group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub delegation_type: DelegationType,
    /// Relative weight of the group. Zero everywhere means value-proportional.
    pub weight: u32,
    pub distribution_type: DistributionType,
}

impl Distribution {
    pub fn new(delegation_type: DelegationType, weight: u32, distribution_type: DistributionType) -> Self {
        Self {
            delegation_type,
            weight,
            distribution_type,
        }
    }

    pub fn basic(delegation_type: DelegationType, weight: u32) -> Self {
        Self::new(delegation_type, weight, DistributionType::Basic)
    }

    pub fn weighted(delegation_type: DelegationType, weight: u32, weights: Vec<DistributionWeight>) -> Self {
        Self::new(delegation_type, weight, DistributionType::Weighted { weights })
    }

    pub fn egalitarian(delegation_type: DelegationType, weight: u32) -> Self {
        Self::new(delegation_type, weight, DistributionType::Egalitarian)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsersDistributionType {
    /// Everything goes to the service's own delegators.
    Basic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersDistribution {
    pub weight: u32,
    pub distribution_type: UsersDistributionType,
}

impl UsersDistribution {
    pub fn basic(weight: u32) -> Self {
        Self {
            weight,
            distribution_type: UsersDistributionType::Basic,
        }
    }
}

/// A service's schedule for paying rewards out of its escrow account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsPlan {
    pub id: u64,
    pub description: String,
    pub service_id: u32,
    pub amount_per_day: Coin,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Escrow funding the plan, derived from `id`.
    pub rewards_pool: Address,
    pub pools_distribution: Distribution,
    pub operators_distribution: Distribution,
    pub users_distribution: UsersDistribution,
}

impl RewardsPlan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        description: impl Into<String>,
        service_id: u32,
        amount_per_day: Coin,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        pools_distribution: Distribution,
        operators_distribution: Distribution,
        users_distribution: UsersDistribution,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            service_id,
            amount_per_day,
            start_time,
            end_time,
            rewards_pool: rewards_plan_escrow_address(id),
            pools_distribution,
            operators_distribution,
            users_distribution,
        }
    }

    /// `start <= t < end`.
    pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
        self.start_time <= t && t < self.end_time
    }

    pub fn validate(&self) -> Result<()> {
        if self.id == 0 {
            return Err(RewardsError::InvalidPlan("invalid plan ID: 0".into()));
        }
        if self.description.chars().count() > MAX_REWARDS_PLAN_DESCRIPTION_LENGTH {
            return Err(RewardsError::InvalidPlan("too long description".into()));
        }
        if self.service_id == 0 {
            return Err(RewardsError::InvalidPlan("invalid service ID: 0".into()));
        }
        validate_denom(&self.amount_per_day.denom)
            .map_err(|err| RewardsError::InvalidPlan(format!("invalid amount per day: {err}")))?;
        if self.end_time <= self.start_time {
            return Err(RewardsError::InvalidPlan(format!(
                "end time must be after start time: {} <= {}",
                self.end_time.to_rfc3339(),
                self.start_time.to_rfc3339()
            )));
        }
        if self.pools_distribution.delegation_type != DelegationType::Pool {
            return Err(RewardsError::InvalidPlan(format!(
                "pools distribution has invalid delegation type: {}",
                self.pools_distribution.delegation_type
            )));
        }
        self.pools_distribution
            .distribution_type
            .validate()
            .map_err(|err| RewardsError::InvalidPlan(format!("invalid pools distribution type: {err}")))?;
        if self.operators_distribution.delegation_type != DelegationType::Operator {
            return Err(RewardsError::InvalidPlan(format!(
                "operators distribution has invalid delegation type: {}",
                self.operators_distribution.delegation_type
            )));
        }
        self.operators_distribution
            .distribution_type
            .validate()
            .map_err(|err| {
                RewardsError::InvalidPlan(format!("invalid operators distribution type: {err}"))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn time(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn plan() -> RewardsPlan {
        RewardsPlan::new(
            1,
            "Rewards plan",
            1,
            Coin::new("service", 100_000_000),
            time(0),
            time(86_400),
            Distribution::basic(DelegationType::Pool, 0),
            Distribution::basic(DelegationType::Operator, 0),
            UsersDistribution::basic(0),
        )
    }

    #[test]
    fn test_valid_plan() {
        assert!(plan().validate().is_ok());
    }

    #[test]
    fn test_is_active_at() {
        let plan = plan();
        assert!(plan.is_active_at(time(0)));
        assert!(plan.is_active_at(time(86_399)));
        assert!(!plan.is_active_at(time(86_400)));
        assert!(!plan.is_active_at(time(-1)));
    }

    #[test]
    fn test_end_time_must_follow_start_time() {
        let mut plan = plan();
        plan.end_time = plan.start_time;
        assert!(matches!(plan.validate(), Err(RewardsError::InvalidPlan(_))));
    }

    #[test]
    fn test_zero_ids_rejected() {
        let mut p = plan();
        p.id = 0;
        assert!(p.validate().is_err());

        let mut p = plan();
        p.service_id = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_description_length_limit() {
        let mut plan = plan();
        plan.description = "a".repeat(MAX_REWARDS_PLAN_DESCRIPTION_LENGTH + 1);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_mismatched_distribution_types_rejected() {
        let mut plan = plan();
        plan.pools_distribution = Distribution::basic(DelegationType::Operator, 0);
        assert!(plan.validate().is_err());

        let mut plan = self::plan();
        plan.operators_distribution = Distribution::egalitarian(DelegationType::Service, 0);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_weighted_validation() {
        let duplicated = DistributionType::Weighted {
            weights: vec![DistributionWeight::new(1, 1), DistributionWeight::new(1, 2)],
        };
        assert!(duplicated.validate().is_err());

        let zero_weight = DistributionType::Weighted {
            weights: vec![DistributionWeight::new(1, 0)],
        };
        assert!(zero_weight.validate().is_err());

        let zero_target = DistributionType::Weighted {
            weights: vec![DistributionWeight::new(0, 1)],
        };
        assert!(zero_target.validate().is_err());

        let empty = DistributionType::Weighted { weights: vec![] };
        assert!(empty.validate().is_err());

        let ok = DistributionType::Weighted {
            weights: vec![DistributionWeight::new(1, 1), DistributionWeight::new(2, 3)],
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_escrow_address_follows_id() {
        let a = plan();
        let mut b = plan();
        b.id = 2;
        let b = RewardsPlan::new(
            b.id,
            b.description,
            b.service_id,
            b.amount_per_day,
            b.start_time,
            b.end_time,
            b.pools_distribution,
            b.operators_distribution,
            b.users_distribution,
        );
        assert_ne!(a.rewards_pool, b.rewards_pool);
        assert_eq!(a.rewards_pool, rewards_plan_escrow_address(1));
    }
}
