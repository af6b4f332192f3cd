//! Splitting of a tick's rewards between groups and among targets.
//!
//! Everything here is pure: the allocator gathers values and eligibility,
//! then asks these functions how much each group and each target gets.

use crate::plan::{DistributionType, RewardsPlan};
use restake_types::{Coins, DecCoins, DelegationTarget, Decimal};
use std::collections::HashMap;

/// A target eligible for a tick together with its restakable stake and the
/// value of that stake.
#[derive(Debug, Clone)]
pub struct DistributionInfo {
    pub target: DelegationTarget,
    pub tokens: Coins,
    pub delegations_value: Decimal,
}

/// Value of each group's stake for one plan tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupValues {
    pub pools: Decimal,
    pub operators: Decimal,
    pub users: Decimal,
}

impl GroupValues {
    pub fn total(&self) -> Decimal {
        self.pools + self.operators + self.users
    }
}

/// Rewards assigned to each group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRewards {
    pub pools: DecCoins,
    pub operators: DecCoins,
    pub users: DecCoins,
}

/// Split `rewards` between pools, operators and users.
///
/// Only groups with a positive value take part. With a positive weight sum
/// over those groups each gets `weight / sum`; otherwise each group gets
/// `value / total_value`. Callers skip the tick when the total value is zero.
pub fn split_between_groups(plan: &RewardsPlan, values: &GroupValues, rewards: &DecCoins) -> GroupRewards {
    let mut weights_sum: u64 = 0;
    if values.pools > Decimal::ZERO {
        weights_sum += u64::from(plan.pools_distribution.weight);
    }
    if values.operators > Decimal::ZERO {
        weights_sum += u64::from(plan.operators_distribution.weight);
    }
    if values.users > Decimal::ZERO {
        weights_sum += u64::from(plan.users_distribution.weight);
    }

    if weights_sum > 0 {
        let total = Decimal::from(weights_sum);
        let share = |value: Decimal, weight: u32| {
            if value > Decimal::ZERO {
                rewards.mul_quo_dec_truncate(Decimal::from(weight), total)
            } else {
                DecCoins::new()
            }
        };
        GroupRewards {
            pools: share(values.pools, plan.pools_distribution.weight),
            operators: share(values.operators, plan.operators_distribution.weight),
            users: share(values.users, plan.users_distribution.weight),
        }
    } else {
        let total = values.total();
        let share = |value: Decimal| rewards.mul_quo_dec_truncate(value, total);
        GroupRewards {
            pools: share(values.pools),
            operators: share(values.operators),
            users: share(values.users),
        }
    }
}

impl DistributionType {
    /// Split a group's rewards among its eligible targets.
    ///
    /// Targets missing from `infos` receive nothing, even when a weighted
    /// distribution names them.
    pub fn split<'a>(&self, infos: &'a [DistributionInfo], rewards: &DecCoins) -> Vec<(&'a DistributionInfo, DecCoins)> {
        match self {
            DistributionType::Basic => {
                let total: Decimal = infos.iter().map(|info| info.delegations_value).sum();
                if total.is_zero() {
                    return Vec::new();
                }
                infos
                    .iter()
                    .map(|info| {
                        let share = rewards.mul_quo_dec_truncate(info.delegations_value, total);
                        (info, share)
                    })
                    .collect()
            }
            DistributionType::Weighted { weights } => {
                let by_id: HashMap<u32, &DistributionInfo> =
                    infos.iter().map(|info| (info.target.id(), info)).collect();

                let total: u64 = weights
                    .iter()
                    .filter(|w| by_id.contains_key(&w.delegation_target_id))
                    .map(|w| u64::from(w.weight))
                    .sum();
                if total == 0 {
                    return Vec::new();
                }
                let total = Decimal::from(total);

                weights
                    .iter()
                    .filter_map(|w| {
                        let info = *by_id.get(&w.delegation_target_id)?;
                        let share = rewards.mul_quo_dec_truncate(Decimal::from(w.weight), total);
                        Some((info, share))
                    })
                    .collect()
            }
            DistributionType::Egalitarian => {
                if infos.is_empty() {
                    return Vec::new();
                }
                let count = Decimal::from(infos.len() as u64);
                infos
                    .iter()
                    .map(|info| (info, rewards.quo_dec_truncate(count)))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Distribution, DistributionWeight, UsersDistribution};
    use chrono::{TimeZone, Utc};
    use restake_types::{Coin, DelegationType, Pool};

    fn info(id: u32, value: i64) -> DistributionInfo {
        DistributionInfo {
            target: DelegationTarget::Pool(Pool::new(id, "umilk")),
            tokens: Coins::single("umilk", value as u128),
            delegations_value: Decimal::from(value),
        }
    }

    fn rewards(amount: i64) -> DecCoins {
        DecCoins::single("service", Decimal::from(amount))
    }

    fn plan(pools: u32, operators: u32, users: u32) -> RewardsPlan {
        RewardsPlan::new(
            1,
            "",
            1,
            Coin::new("service", 1),
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(1, 0).unwrap(),
            Distribution::basic(DelegationType::Pool, pools),
            Distribution::basic(DelegationType::Operator, operators),
            UsersDistribution::basic(users),
        )
    }

    #[test]
    fn test_groups_split_by_value_without_weights() {
        let values = GroupValues {
            pools: Decimal::from(300),
            operators: Decimal::from(100),
            users: Decimal::ZERO,
        };
        let split = split_between_groups(&plan(0, 0, 0), &values, &rewards(1_000));
        assert_eq!(split.pools, rewards(750));
        assert_eq!(split.operators, rewards(250));
        assert!(split.users.is_empty());
    }

    #[test]
    fn test_groups_split_by_weight_ignores_zero_value_groups() {
        let values = GroupValues {
            pools: Decimal::from(1),
            operators: Decimal::from(1_000_000),
            users: Decimal::ZERO,
        };
        // Users weight is dropped because their value is zero.
        let split = split_between_groups(&plan(1, 3, 4), &values, &rewards(1_000));
        assert_eq!(split.pools, rewards(250));
        assert_eq!(split.operators, rewards(750));
        assert!(split.users.is_empty());
    }

    #[test]
    fn test_basic_split_is_value_proportional() {
        let infos = vec![info(1, 1), info(2, 3)];
        let split = DistributionType::Basic.split(&infos, &rewards(100));
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].1, rewards(25));
        assert_eq!(split[1].1, rewards(75));
    }

    #[test]
    fn test_weighted_split_skips_unknown_targets() {
        let infos = vec![info(1, 1_000), info(2, 1)];
        let kind = DistributionType::Weighted {
            weights: vec![
                DistributionWeight::new(1, 1),
                DistributionWeight::new(2, 3),
                DistributionWeight::new(9, 100),
            ],
        };
        let split = kind.split(&infos, &rewards(100));
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].0.target.id(), 1);
        assert_eq!(split[0].1, rewards(25));
        assert_eq!(split[1].1, rewards(75));
    }

    #[test]
    fn test_egalitarian_split_ignores_value() {
        let infos = vec![info(1, 1), info(2, 1_000), info(3, 50)];
        let split = DistributionType::Egalitarian.split(&infos, &rewards(90));
        assert!(split.iter().all(|(_, share)| *share == rewards(30)));
    }

    #[test]
    fn test_empty_candidates_get_nothing() {
        assert!(DistributionType::Basic.split(&[], &rewards(10)).is_empty());
        assert!(DistributionType::Egalitarian.split(&[], &rewards(10)).is_empty());
    }
}
