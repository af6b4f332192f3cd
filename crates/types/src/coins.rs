//! Integer and decimal multi-denom coin sets.
//!
//! Both collections are sorted by denom and never hold zero entries, which
//! keeps equality checks and serialised snapshots canonical.

use crate::dec::{dec_from_amount, DecExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoinsError {
    #[error("insufficient funds: {available} < {required}")]
    InsufficientFunds { available: String, required: String },
    #[error("invalid denom: {0:?}")]
    InvalidDenom(String),
}

/// Validate a token denom: 2-128 chars, starting with a letter.
pub fn validate_denom(denom: &str) -> Result<(), CoinsError> {
    let valid = (2..=128).contains(&denom.len())
        && denom.starts_with(|c: char| c.is_ascii_alphabetic())
        && denom
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(CoinsError::InvalidDenom(denom.to_string()))
    }
}

/// A single integer coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Sorted set of integer coins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coins(BTreeMap<String, u128>);

impl Coins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(denom: impl Into<String>, amount: u128) -> Self {
        let mut coins = Self::new();
        coins.add_amount(denom, amount);
        coins
    }

    pub fn from_coins(coins: impl IntoIterator<Item = Coin>) -> Self {
        let mut out = Self::new();
        for coin in coins {
            out.add_amount(coin.denom, coin.amount);
        }
        out
    }

    pub fn add_amount(&mut self, denom: impl Into<String>, amount: u128) {
        if amount == 0 {
            return;
        }
        let entry = self.0.entry(denom.into()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn add(&self, other: &Coins) -> Coins {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            out.add_amount(denom, amount);
        }
        out
    }

    /// Subtract `other`, failing when any denom would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Result<Coins, CoinsError> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            let available = out.amount_of(denom);
            if available < amount {
                return Err(CoinsError::InsufficientFunds {
                    available: self.to_string(),
                    required: other.to_string(),
                });
            }
            if available == amount {
                out.0.remove(denom);
            } else {
                out.0.insert(denom.to_string(), available - amount);
            }
        }
        Ok(out)
    }

    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0.get(denom).copied().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every denom of `other` is covered by `self`.
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other
            .iter()
            .all(|(denom, amount)| self.amount_of(denom) >= amount)
    }

    /// Keep only the listed denoms.
    pub fn filter_denoms(&self, denoms: &[String]) -> Coins {
        Coins(
            self.0
                .iter()
                .filter(|(denom, _)| denoms.iter().any(|d| d == *denom))
                .map(|(denom, amount)| (denom.clone(), *amount))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u128)> {
        self.0.iter().map(|(denom, amount)| (denom.as_str(), *amount))
    }

    pub fn denoms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_coin_vec(&self) -> Vec<Coin> {
        self.iter().map(|(denom, amount)| Coin::new(denom, amount)).collect()
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(denom, amount)| format!("{amount}{denom}"))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Sorted set of decimal coins.
///
/// Intermediate results of [`DecCoins::sub`] may carry negative amounts so
/// callers can detect invariant violations with [`DecCoins::is_any_negative`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecCoins(BTreeMap<String, Decimal>);

impl DecCoins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(denom: impl Into<String>, amount: Decimal) -> Self {
        let mut coins = Self::new();
        coins.add_amount(denom, amount);
        coins
    }

    pub fn from_coins(coins: &Coins) -> Self {
        Self(
            coins
                .iter()
                .map(|(denom, amount)| (denom.to_string(), dec_from_amount(amount)))
                .collect(),
        )
    }

    pub fn add_amount(&mut self, denom: impl Into<String>, amount: Decimal) {
        let denom = denom.into();
        let sum = self.amount_of(&denom) + amount;
        if sum.is_zero() {
            self.0.remove(&denom);
        } else {
            self.0.insert(denom, sum);
        }
    }

    pub fn add(&self, other: &DecCoins) -> DecCoins {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            out.add_amount(denom, amount);
        }
        out
    }

    pub fn sub(&self, other: &DecCoins) -> DecCoins {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            out.add_amount(denom, -amount);
        }
        out
    }

    /// Every amount multiplied by `factor`, truncated.
    pub fn mul_dec_truncate(&self, factor: Decimal) -> DecCoins {
        self.map_amounts(|amount| amount.mul_truncate(factor))
    }

    /// Every amount multiplied by `mul` and divided by `quo`, truncated.
    pub fn mul_quo_dec_truncate(&self, mul: Decimal, quo: Decimal) -> DecCoins {
        self.map_amounts(|amount| amount.mul_quo_truncate(mul, quo))
    }

    /// Every amount divided by `divisor`, truncated.
    pub fn quo_dec_truncate(&self, divisor: Decimal) -> DecCoins {
        self.map_amounts(|amount| amount.quo_truncate(divisor))
    }

    /// Split into whole coins and the fractional change left behind.
    pub fn truncate_decimal(&self) -> (Coins, DecCoins) {
        let mut truncated = Coins::new();
        let mut change = DecCoins::new();
        for (denom, amount) in self.iter() {
            let whole = amount.trunc();
            truncated.add_amount(denom, whole.to_amount());
            change.add_amount(denom, amount - whole);
        }
        (truncated, change)
    }

    /// Per-denom minimum over the denoms both sets contain.
    pub fn intersect(&self, other: &DecCoins) -> DecCoins {
        let mut out = DecCoins::new();
        for (denom, amount) in self.iter() {
            let theirs = other.amount_of(denom);
            if !theirs.is_zero() {
                out.add_amount(denom, amount.min(theirs));
            }
        }
        out
    }

    pub fn amount_of(&self, denom: &str) -> Decimal {
        self.0.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn is_any_negative(&self) -> bool {
        self.0.values().any(|amount| amount.is_sign_negative())
    }

    /// Non-empty with every amount strictly positive.
    pub fn is_all_positive(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|amount| *amount > Decimal::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(denom, amount)| (denom.as_str(), *amount))
    }

    pub fn denoms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn map_amounts(&self, f: impl Fn(Decimal) -> Decimal) -> DecCoins {
        let mut out = DecCoins::new();
        for (denom, amount) in self.iter() {
            out.add_amount(denom, f(amount));
        }
        out
    }
}

impl fmt::Display for DecCoins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(denom, amount)| format!("{}{denom}", amount.normalize()))
            .collect();
        f.write_str(&parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_coins_add_and_sub() {
        let a = Coins::from_coins([Coin::new("umilk", 100), Coin::new("uinit", 5)]);
        let b = Coins::single("umilk", 40);
        assert_eq!(a.add(&b).amount_of("umilk"), 140);

        let rest = a.checked_sub(&b).unwrap();
        assert_eq!(rest.amount_of("umilk"), 60);
        assert_eq!(rest.amount_of("uinit"), 5);

        let err = b.checked_sub(&a).unwrap_err();
        assert!(matches!(err, CoinsError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_zero_entries_are_dropped() {
        let a = Coins::single("umilk", 10);
        assert!(a.checked_sub(&a).unwrap().is_zero());
        assert!(Coins::single("umilk", 0).is_zero());

        let d = DecCoins::single("umilk", dec("1.5"));
        assert!(d.sub(&d).is_empty());
    }

    #[test]
    fn test_is_all_gte() {
        let balance = Coins::from_coins([Coin::new("service", 1_000), Coin::new("umilk", 3)]);
        assert!(balance.is_all_gte(&Coins::single("service", 1_000)));
        assert!(!balance.is_all_gte(&Coins::single("service", 1_001)));
        assert!(!balance.is_all_gte(&Coins::single("uinit", 1)));
        assert!(balance.is_all_gte(&Coins::new()));
    }

    #[test]
    fn test_truncate_decimal_keeps_change() {
        let d = DecCoins::from_coins(&Coins::single("service", 11_574)).add(&DecCoins::single("uinit", dec("0.75")));
        let (whole, change) = d.truncate_decimal();
        assert_eq!(whole.amount_of("service"), 11_574);
        assert_eq!(whole.amount_of("uinit"), 0);
        assert_eq!(change.amount_of("uinit"), dec("0.75"));
        assert_eq!(change.amount_of("service"), Decimal::ZERO);
    }

    #[test]
    fn test_intersect_takes_minimum_of_common_denoms() {
        let a = DecCoins::single("a", dec("10")).add(&DecCoins::single("b", dec("3")));
        let b = DecCoins::single("a", dec("9.5")).add(&DecCoins::single("c", dec("1")));
        let i = a.intersect(&b);
        assert_eq!(i.amount_of("a"), dec("9.5"));
        assert_eq!(i.amount_of("b"), Decimal::ZERO);
        assert_eq!(i.amount_of("c"), Decimal::ZERO);
    }

    #[test]
    fn test_negative_detection() {
        let a = DecCoins::single("a", dec("1"));
        let b = DecCoins::single("a", dec("2"));
        assert!(a.sub(&b).is_any_negative());
        assert!(!b.sub(&a).is_any_negative());
        assert!(!DecCoins::new().is_all_positive());
    }

    #[test]
    fn test_validate_denom() {
        assert!(validate_denom("umilk").is_ok());
        assert!(validate_denom("ibc/27394FB092D2ECCD").is_ok());
        assert!(validate_denom("1abc").is_err());
        assert!(validate_denom("").is_err());
    }

    #[test]
    fn test_display() {
        let coins = Coins::from_coins([Coin::new("umilk", 10), Coin::new("uinit", 2)]);
        assert_eq!(coins.to_string(), "2uinit,10umilk");
        assert_eq!(DecCoins::single("umilk", dec("1.50")).to_string(), "1.5umilk");
    }
}
