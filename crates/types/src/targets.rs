//! Delegation targets: the pools, operators and services that receive stake.
//!
//! These entities are owned by their own subsystems; the rewards engine only
//! reads them through [`DelegationTarget`].

use crate::address::Address;
use crate::coins::{Coins, DecCoins};
use crate::dec::{dec_from_amount, DecExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of entity a delegation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationType {
    Pool,
    Operator,
    Service,
}

impl DelegationType {
    pub const ALL: [DelegationType; 3] = [
        DelegationType::Pool,
        DelegationType::Operator,
        DelegationType::Service,
    ];
}

impl fmt::Display for DelegationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            DelegationType::Pool => "pool",
            DelegationType::Operator => "operator",
            DelegationType::Service => "service",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorStatus {
    Active,
    Inactivating,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Created,
    Active,
    Inactive,
}

/// Single-denom liquidity pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: u32,
    pub denom: String,
    pub address: Address,
    pub tokens: u128,
    pub delegator_shares: Decimal,
}

impl Pool {
    pub fn new(id: u32, denom: impl Into<String>) -> Self {
        Self {
            id,
            denom: denom.into(),
            address: Address::derived("pools", &format!("pool-{id}")),
            tokens: 0,
            delegator_shares: Decimal::ZERO,
        }
    }

    /// Shares minted for a deposit of `amount` tokens.
    pub fn shares_for(&self, amount: u128) -> Decimal {
        shares_for(self.tokens, self.delegator_shares, amount)
    }
}

/// Node operator that can accept multi-denom delegations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: u32,
    pub admin: Address,
    pub address: Address,
    pub status: OperatorStatus,
    pub tokens: Coins,
    pub delegator_shares: DecCoins,
}

impl Operator {
    pub fn new(id: u32, admin: Address) -> Self {
        Self {
            id,
            admin,
            address: Address::derived("operators", &format!("operator-{id}")),
            status: OperatorStatus::Active,
            tokens: Coins::new(),
            delegator_shares: DecCoins::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == OperatorStatus::Active
    }
}

/// Actively validated service buying security from restakers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: u32,
    pub admin: Address,
    pub address: Address,
    pub status: ServiceStatus,
    pub tokens: Coins,
    pub delegator_shares: DecCoins,
}

impl Service {
    pub fn new(id: u32, admin: Address) -> Self {
        Self {
            id,
            admin,
            address: Address::derived("services", &format!("service-{id}")),
            status: ServiceStatus::Active,
            tokens: Coins::new(),
            delegator_shares: DecCoins::new(),
        }
    }

    /// Tokens restricted to the given denoms.
    pub fn allowed_tokens(&self, denoms: &[String]) -> Coins {
        self.tokens.filter_denoms(denoms)
    }
}

/// Shares minted per denom for a multi-denom deposit.
pub fn shares_for_coins(tokens: &Coins, delegator_shares: &DecCoins, amount: &Coins) -> DecCoins {
    let mut shares = DecCoins::new();
    for (denom, deposit) in amount.iter() {
        let minted = shares_for(
            tokens.amount_of(denom),
            delegator_shares.amount_of(denom),
            deposit,
        );
        shares.add_amount(denom, minted);
    }
    shares
}

fn shares_for(tokens: u128, delegator_shares: Decimal, amount: u128) -> Decimal {
    let amount = dec_from_amount(amount);
    if tokens == 0 || delegator_shares.is_zero() {
        return amount;
    }
    delegator_shares.mul_quo_truncate(amount, dec_from_amount(tokens))
}

/// Polymorphic view over the three target kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelegationTarget {
    Pool(Pool),
    Operator(Operator),
    Service(Service),
}

impl DelegationTarget {
    pub fn id(&self) -> u32 {
        match self {
            DelegationTarget::Pool(pool) => pool.id,
            DelegationTarget::Operator(operator) => operator.id,
            DelegationTarget::Service(service) => service.id,
        }
    }

    pub fn delegation_type(&self) -> DelegationType {
        match self {
            DelegationTarget::Pool(_) => DelegationType::Pool,
            DelegationTarget::Operator(_) => DelegationType::Operator,
            DelegationTarget::Service(_) => DelegationType::Service,
        }
    }

    pub fn address(&self) -> Address {
        match self {
            DelegationTarget::Pool(pool) => pool.address,
            DelegationTarget::Operator(operator) => operator.address,
            DelegationTarget::Service(service) => service.address,
        }
    }

    /// Total tokens delegated to the target.
    pub fn tokens(&self) -> Coins {
        match self {
            DelegationTarget::Pool(pool) => Coins::single(pool.denom.clone(), pool.tokens),
            DelegationTarget::Operator(operator) => operator.tokens.clone(),
            DelegationTarget::Service(service) => service.tokens.clone(),
        }
    }

    /// Total shares issued by the target, keyed by token denom.
    pub fn delegator_shares(&self) -> DecCoins {
        match self {
            DelegationTarget::Pool(pool) => {
                DecCoins::single(pool.denom.clone(), pool.delegator_shares)
            }
            DelegationTarget::Operator(operator) => operator.delegator_shares.clone(),
            DelegationTarget::Service(service) => service.delegator_shares.clone(),
        }
    }

    /// Tokens represented by `shares`, rounded.
    pub fn tokens_from_shares(&self, shares: &DecCoins) -> DecCoins {
        self.convert_shares(shares, |amount, tokens, total| amount.mul_quo_round(tokens, total))
    }

    /// Tokens represented by `shares`, truncated.
    pub fn tokens_from_shares_truncated(&self, shares: &DecCoins) -> DecCoins {
        self.convert_shares(shares, |amount, tokens, total| amount.mul_quo_truncate(tokens, total))
    }

    fn convert_shares(
        &self,
        shares: &DecCoins,
        convert: impl Fn(Decimal, Decimal, Decimal) -> Decimal,
    ) -> DecCoins {
        let tokens = self.tokens();
        let total_shares = self.delegator_shares();
        let mut out = DecCoins::new();
        for (denom, amount) in shares.iter() {
            let total = total_shares.amount_of(denom);
            if total.is_zero() {
                continue;
            }
            out.add_amount(denom, convert(amount, dec_from_amount(tokens.amount_of(denom)), total));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(tokens: u128, shares: u128) -> Pool {
        let mut pool = Pool::new(1, "umilk");
        pool.tokens = tokens;
        pool.delegator_shares = dec_from_amount(shares);
        pool
    }

    #[test]
    fn test_first_deposit_mints_one_to_one() {
        let pool = Pool::new(1, "umilk");
        assert_eq!(pool.shares_for(500), Decimal::from(500));
    }

    #[test]
    fn test_tokens_from_shares_after_appreciation() {
        // 1000 shares backed by 1500 tokens.
        let target = DelegationTarget::Pool(pool_with(1_500, 1_000));
        let tokens = target.tokens_from_shares(&DecCoins::single("umilk", Decimal::from(100)));
        assert_eq!(tokens.amount_of("umilk"), Decimal::from(150));

        let truncated =
            target.tokens_from_shares_truncated(&DecCoins::single("umilk", Decimal::from(1)));
        assert_eq!(truncated.amount_of("umilk"), Decimal::new(15, 1));
    }

    #[test]
    fn test_unknown_share_denom_maps_to_nothing() {
        let target = DelegationTarget::Pool(pool_with(100, 100));
        let tokens = target.tokens_from_shares(&DecCoins::single("uinit", Decimal::from(5)));
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_multi_denom_operator_shares() {
        let mut operator = Operator::new(7, Address::from_seed("admin"));
        let deposit = Coins::single("umilk", 100).add(&Coins::single("uinit", 40));
        let shares = shares_for_coins(&operator.tokens, &operator.delegator_shares, &deposit);
        operator.tokens = deposit;
        operator.delegator_shares = shares.clone();

        let target = DelegationTarget::Operator(operator);
        assert_eq!(target.delegation_type(), DelegationType::Operator);
        assert_eq!(target.id(), 7);
        assert_eq!(target.tokens_from_shares(&shares), DecCoins::from_coins(&target.tokens()));
    }

    #[test]
    fn test_service_allowed_tokens() {
        let mut service = Service::new(1, Address::from_seed("admin"));
        service.tokens = Coins::single("umilk", 10).add(&Coins::single("uatom", 3));
        let allowed = service.allowed_tokens(&["umilk".to_string()]);
        assert_eq!(allowed, Coins::single("umilk", 10));
    }
}
