//! In-memory token ledgers implementing [`BankKeeper`].
//!
//! Used by the simulator and by tests. Balances live behind a
//! `parking_lot::RwLock` so a single bank can be shared through `Arc`
//! between the rewards keeper and the code driving it.

use crate::keepers::BankKeeper;
use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use restake_types::{Address, Coins};
use std::collections::{HashMap, HashSet};

// -----------------------------------------------------------------------------
// 🧠 In-memory implementation
// -----------------------------------------------------------------------------
#[derive(Debug, Default)]
pub struct InMemoryBank {
    balances: RwLock<HashMap<Address, Coins>>,
    blocked: RwLock<HashSet<Address>>,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create tokens out of thin air. Only meant for scenario setup.
    pub fn mint(&self, address: &Address, amount: &Coins) {
        let mut balances = self.balances.write();
        let balance = balances.entry(*address).or_default();
        *balance = balance.add(amount);
    }

    pub fn block_address(&self, address: Address) {
        self.blocked.write().insert(address);
    }

    pub fn balances(&self) -> HashMap<Address, Coins> {
        self.balances.read().clone()
    }
}

impl BankKeeper for InMemoryBank {
    fn get_all_balances(&self, address: &Address) -> Coins {
        self.balances.read().get(address).cloned().unwrap_or_default()
    }

    fn send_coins(&self, from: &Address, to: &Address, amount: &Coins) -> Result<()> {
        transfer(&mut self.balances.write(), from, to, amount)
    }

    fn is_blocked(&self, address: &Address) -> bool {
        self.blocked.read().contains(address)
    }
}

fn transfer(
    balances: &mut HashMap<Address, Coins>,
    from: &Address,
    to: &Address,
    amount: &Coins,
) -> Result<()> {
    if amount.is_zero() {
        return Ok(());
    }
    let sender = balances.get(from).cloned().unwrap_or_default();
    let remaining = sender
        .checked_sub(amount)
        .map_err(|err| anyhow!("cannot send {amount} from {from}: {err}"))?;
    if remaining.is_zero() {
        balances.remove(from);
    } else {
        balances.insert(*from, remaining);
    }
    let receiver = balances.entry(*to).or_default();
    *receiver = receiver.add(amount);
    Ok(())
}

// -----------------------------------------------------------------------------
// 🧪 Mock bank (records every transfer)
// -----------------------------------------------------------------------------
#[derive(Debug, Default)]
pub struct MockBank {
    balances: RwLock<HashMap<Address, Coins>>,
    send_calls: RwLock<Vec<(Address, Address, Coins)>>,
}

impl MockBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, address: &Address, amount: &Coins) {
        let mut balances = self.balances.write();
        let balance = balances.entry(*address).or_default();
        *balance = balance.add(amount);
    }

    pub fn get_send_calls(&self) -> Vec<(Address, Address, Coins)> {
        self.send_calls.read().clone()
    }

    pub fn clear_calls(&self) {
        self.send_calls.write().clear();
    }
}

impl BankKeeper for MockBank {
    fn get_all_balances(&self, address: &Address) -> Coins {
        self.balances.read().get(address).cloned().unwrap_or_default()
    }

    fn send_coins(&self, from: &Address, to: &Address, amount: &Coins) -> Result<()> {
        self.send_calls.write().push((*from, *to, amount.clone()));
        transfer(&mut self.balances.write(), from, to, amount)
    }

    fn is_blocked(&self, _address: &Address) -> bool {
        false
    }
}

// -----------------------------------------------------------------------------
// ✅ Tests
// -----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    fn test_address(s: &str) -> Address {
        Address::from_seed(s)
    }

    #[test]
    fn test_in_memory_bank_transfers() {
        let bank = InMemoryBank::new();
        let alice = test_address("alice");
        let bob = test_address("bob");

        bank.mint(&alice, &Coins::single("umilk", 1_000));
        bank.send_coins(&alice, &bob, &Coins::single("umilk", 300)).unwrap();

        assert_eq!(bank.get_all_balances(&alice), Coins::single("umilk", 700));
        assert_eq!(bank.get_all_balances(&bob), Coins::single("umilk", 300));
    }

    #[test]
    fn test_insufficient_balance() {
        let bank = InMemoryBank::new();
        let alice = test_address("alice");
        bank.mint(&alice, &Coins::single("umilk", 100));

        let result = bank.send_coins(&alice, &test_address("bob"), &Coins::single("umilk", 150));
        assert!(result.is_err());
        assert_eq!(bank.get_all_balances(&alice), Coins::single("umilk", 100));
    }

    #[test]
    fn test_blocked_addresses() {
        let bank = InMemoryBank::new();
        let module = Address::module("rewards_pool");
        bank.block_address(module);
        assert!(bank.is_blocked(&module));
        assert!(!bank.is_blocked(&test_address("alice")));
    }

    #[test]
    fn test_mock_bank_records_calls() {
        let bank = MockBank::new();
        let alice = test_address("alice");
        let bob = test_address("bob");
        bank.mint(&alice, &Coins::single("umilk", 10));

        bank.send_coins(&alice, &bob, &Coins::single("umilk", 4)).unwrap();
        assert!(bank.send_coins(&alice, &bob, &Coins::single("umilk", 40)).is_err());

        let calls = bank.get_send_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (alice, bob, Coins::single("umilk", 4)));

        bank.clear_calls();
        assert!(bank.get_send_calls().is_empty());
    }
}
