//! Reward accumulators keyed by the staked token they were earned on.
//!
//! A [`DecPools`] maps a staked denom to the reward coins accrued on it, and
//! a [`ServicePools`] further keys those by the service that paid them. The
//! service layer is what lets pool delegators collect only from the services
//! they trust.

use crate::coins::{Coins, DecCoins};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Integer rewards per staked denom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pools(BTreeMap<String, Coins>);

impl Pools {
    pub fn add_coins(&mut self, denom: impl Into<String>, coins: Coins) {
        if coins.is_zero() {
            return;
        }
        let denom = denom.into();
        let merged = self.coins_of(&denom).add(&coins);
        self.0.insert(denom, merged);
    }

    pub fn coins_of(&self, denom: &str) -> Coins {
        self.0.get(denom).cloned().unwrap_or_default()
    }

    /// Total across all staked denoms.
    pub fn sum(&self) -> Coins {
        self.0.values().fold(Coins::new(), |acc, coins| acc.add(coins))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Coins)> {
        self.0.iter().map(|(denom, coins)| (denom.as_str(), coins))
    }
}

/// Decimal rewards per staked denom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecPools(BTreeMap<String, DecCoins>);

impl DecPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(denom: impl Into<String>, coins: DecCoins) -> Self {
        let mut pools = Self::new();
        pools.add_dec_coins(denom, &coins);
        pools
    }

    pub fn from_pools(pools: &Pools) -> Self {
        let mut out = Self::new();
        for (denom, coins) in pools.iter() {
            out.add_dec_coins(denom, &DecCoins::from_coins(coins));
        }
        out
    }

    pub fn add_dec_coins(&mut self, denom: impl Into<String>, coins: &DecCoins) {
        let denom = denom.into();
        let merged = self.coins_of(&denom).add(coins);
        self.set(denom, merged);
    }

    pub fn add(&self, other: &DecPools) -> DecPools {
        let mut out = self.clone();
        for (denom, coins) in other.iter() {
            out.add_dec_coins(denom, coins);
        }
        out
    }

    /// Per-denom subtraction. Negative amounts are kept so that callers can
    /// detect them.
    pub fn sub(&self, other: &DecPools) -> DecPools {
        let mut out = self.clone();
        for (denom, coins) in other.iter() {
            let diff = out.coins_of(denom).sub(coins);
            out.set(denom.to_string(), diff);
        }
        out
    }

    pub fn coins_of(&self, denom: &str) -> DecCoins {
        self.0.get(denom).cloned().unwrap_or_default()
    }

    /// Rewards summed across staked denoms.
    pub fn sum(&self) -> DecCoins {
        self.0
            .values()
            .fold(DecCoins::new(), |acc, coins| acc.add(coins))
    }

    /// Whole coins per pool and the fractional change per pool.
    pub fn truncate_decimal(&self) -> (Pools, DecPools) {
        let mut truncated = Pools::default();
        let mut change = DecPools::new();
        for (denom, coins) in self.iter() {
            let (whole, rest) = coins.truncate_decimal();
            truncated.add_coins(denom, whole);
            change.add_dec_coins(denom, &rest);
        }
        (truncated, change)
    }

    /// Per-pool intersection over the pools both sides contain.
    pub fn intersect(&self, other: &DecPools) -> DecPools {
        let mut out = DecPools::new();
        for (denom, coins) in self.iter() {
            if let Some(theirs) = other.0.get(denom) {
                out.add_dec_coins(denom, &coins.intersect(theirs));
            }
        }
        out
    }

    pub fn is_any_negative(&self) -> bool {
        self.0.values().any(DecCoins::is_any_negative)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DecCoins)> {
        self.0.iter().map(|(denom, coins)| (denom.as_str(), coins))
    }

    fn set(&mut self, denom: String, coins: DecCoins) {
        if coins.is_empty() {
            self.0.remove(&denom);
        } else {
            self.0.insert(denom, coins);
        }
    }
}

impl fmt::Display for DecPools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(denom, coins)| format!("{denom}:{coins}"))
            .collect();
        f.write_str(&parts.join(";"))
    }
}

/// Decimal rewards per paying service, then per staked denom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServicePools(BTreeMap<u32, DecPools>);

impl ServicePools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(service_id: u32, pools: DecPools) -> Self {
        let mut out = Self::new();
        out.add_pools(service_id, &pools);
        out
    }

    pub fn add_pools(&mut self, service_id: u32, pools: &DecPools) {
        let merged = self.pools_of(service_id).add(pools);
        self.set(service_id, merged);
    }

    pub fn add(&self, other: &ServicePools) -> ServicePools {
        let mut out = self.clone();
        for (service_id, pools) in other.iter() {
            out.add_pools(service_id, pools);
        }
        out
    }

    pub fn sub(&self, other: &ServicePools) -> ServicePools {
        let mut out = self.clone();
        for (service_id, pools) in other.iter() {
            let diff = out.pools_of(service_id).sub(pools);
            out.set(service_id, diff);
        }
        out
    }

    pub fn pools_of(&self, service_id: u32) -> DecPools {
        self.0.get(&service_id).cloned().unwrap_or_default()
    }

    pub fn is_any_negative(&self) -> bool {
        self.0.values().any(DecPools::is_any_negative)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &DecPools)> {
        self.0.iter().map(|(id, pools)| (*id, pools))
    }

    fn set(&mut self, service_id: u32, pools: DecPools) {
        if pools.is_empty() {
            self.0.remove(&service_id);
        } else {
            self.0.insert(service_id, pools);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn pool(denom: &str, reward_denom: &str, amount: &str) -> DecPools {
        DecPools::single(denom, DecCoins::single(reward_denom, dec(amount)))
    }

    #[test]
    fn test_dec_pools_sum_and_truncate() {
        let pools = pool("umilk", "service", "10.5").add(&pool("uinit", "service", "2.25"));
        assert_eq!(pools.sum().amount_of("service"), dec("12.75"));

        let (whole, change) = pools.truncate_decimal();
        assert_eq!(whole.sum().amount_of("service"), 12);
        assert_eq!(change.coins_of("umilk").amount_of("service"), dec("0.5"));
        assert_eq!(change.coins_of("uinit").amount_of("service"), dec("0.25"));
    }

    #[test]
    fn test_dec_pools_sub_drops_empty_pools() {
        let a = pool("umilk", "service", "3");
        assert!(a.sub(&a).is_empty());
        assert!(pool("umilk", "service", "1").sub(&a).is_any_negative());
    }

    #[test]
    fn test_dec_pools_intersect() {
        let a = pool("umilk", "service", "3").add(&pool("uinit", "service", "1"));
        let b = pool("umilk", "service", "2.5");
        let i = a.intersect(&b);
        assert_eq!(i, pool("umilk", "service", "2.5"));
    }

    #[test]
    fn test_service_pools_add_sub() {
        let a = ServicePools::single(1, pool("umilk", "service", "1"));
        let b = ServicePools::single(2, pool("umilk", "other", "4"));
        let sum = a.add(&b).add(&a);
        assert_eq!(sum.pools_of(1), pool("umilk", "service", "2"));
        assert_eq!(sum.pools_of(2), pool("umilk", "other", "4"));

        let diff = sum.sub(&a);
        assert_eq!(diff.pools_of(1), pool("umilk", "service", "1"));
        assert!(!diff.is_any_negative());
        assert!(a.sub(&sum).is_any_negative());
    }
}
