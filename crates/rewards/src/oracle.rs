//! Conversion of token amounts into a common value unit.

use crate::errors::Result;
use crate::keepers::PriceOracle;
use parking_lot::RwLock;
use restake_types::{dec_from_amount, Coins, DecExt, Decimal};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Wraps the external price feed. Unknown denoms are worth zero rather than
/// an error, so a missing price only excludes stake from value-weighted
/// splits.
#[derive(Clone)]
pub struct ValueOracle {
    feed: Arc<dyn PriceOracle>,
}

impl ValueOracle {
    pub fn new(feed: Arc<dyn PriceOracle>) -> Self {
        Self { feed }
    }

    pub fn get_price(&self, denom: &str) -> Result<Decimal> {
        Ok(self.feed.get_price(denom)?.unwrap_or(Decimal::ZERO))
    }

    pub fn coin_value(&self, denom: &str, amount: u128) -> Result<Decimal> {
        let price = self.get_price(denom)?;
        Ok(price.mul_truncate(dec_from_amount(amount)))
    }

    pub fn coins_value(&self, coins: &Coins) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        for (denom, amount) in coins.iter() {
            total += self.coin_value(denom, amount)?;
        }
        Ok(total)
    }
}

/// Price table set by hand. Used by tests and the simulator.
#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    prices: RwLock<BTreeMap<String, Decimal>>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices<I, S>(prices: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let oracle = Self::new();
        for (denom, price) in prices {
            oracle.set_price(denom, price);
        }
        oracle
    }

    pub fn set_price(&self, denom: impl Into<String>, price: Decimal) {
        self.prices.write().insert(denom.into(), price);
    }

    pub fn remove_price(&self, denom: &str) {
        self.prices.write().remove(denom);
    }
}

impl PriceOracle for StaticPriceOracle {
    fn get_price(&self, denom: &str) -> anyhow::Result<Option<Decimal>> {
        Ok(self.prices.read().get(denom).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> ValueOracle {
        ValueOracle::new(Arc::new(StaticPriceOracle::with_prices([
            ("umilk", Decimal::from(2)),
            ("uinit", Decimal::from(3)),
        ])))
    }

    #[test]
    fn test_unknown_denom_is_worth_zero() {
        let oracle = oracle();
        assert_eq!(oracle.get_price("uatom").unwrap(), Decimal::ZERO);
        assert_eq!(oracle.coin_value("uatom", 1_000).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_coins_value_sums_denoms() {
        let oracle = oracle();
        let coins = Coins::single("umilk", 100).add(&Coins::single("uinit", 10)).add(&Coins::single("uatom", 7));
        assert_eq!(oracle.coins_value(&coins).unwrap(), Decimal::from(230));
    }
}
