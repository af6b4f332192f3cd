//! Delegations and the trust preferences that gate pool rewards.

use crate::address::Address;
use crate::coins::DecCoins;
use crate::targets::DelegationType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Shares a user holds in one delegation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegation_type: DelegationType,
    pub target_id: u32,
    pub user: Address,
    pub shares: DecCoins,
}

impl Delegation {
    pub fn new(
        delegation_type: DelegationType,
        target_id: u32,
        user: Address,
        shares: DecCoins,
    ) -> Self {
        Self {
            delegation_type,
            target_id,
            user,
            shares,
        }
    }
}

/// A service the user trusts, optionally restricted to specific pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedServiceEntry {
    pub service_id: u32,
    /// Empty means "through any pool".
    #[serde(default)]
    pub pools_ids: Vec<u32>,
}

impl TrustedServiceEntry {
    pub fn new(service_id: u32, pools_ids: Vec<u32>) -> Self {
        Self {
            service_id,
            pools_ids,
        }
    }
}

/// Per-user trust preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub trusted_services: Vec<TrustedServiceEntry>,
}

impl UserPreferences {
    pub fn new(trusted_services: Vec<TrustedServiceEntry>) -> Self {
        Self { trusted_services }
    }

    fn entry(&self, service_id: u32) -> Option<&TrustedServiceEntry> {
        self.trusted_services
            .iter()
            .find(|entry| entry.service_id == service_id)
    }

    /// Whether the user lets `service_id` count stake held in `pool_id`.
    pub fn is_service_trusted_with_pool(&self, service_id: u32, pool_id: u32) -> bool {
        if self.trusted_services.is_empty() {
            return false;
        }
        match self.entry(service_id) {
            Some(entry) => entry.pools_ids.is_empty() || entry.pools_ids.contains(&pool_id),
            None => false,
        }
    }

    pub fn trusted_services_ids(&self) -> Vec<u32> {
        self.trusted_services
            .iter()
            .map(|entry| entry.service_id)
            .collect()
    }
}

/// Services whose trust entry differs between `before` and `after`: added,
/// removed, or with a different pool list.
pub fn compute_changed_services_ids(before: &UserPreferences, after: &UserPreferences) -> Vec<u32> {
    let mut changed = BTreeSet::new();
    for entry in &before.trusted_services {
        match after.entry(entry.service_id) {
            Some(other) if same_pools(&entry.pools_ids, &other.pools_ids) => {}
            _ => {
                changed.insert(entry.service_id);
            }
        }
    }
    for entry in &after.trusted_services {
        if before.entry(entry.service_id).is_none() {
            changed.insert(entry.service_id);
        }
    }
    changed.into_iter().collect()
}

fn same_pools(a: &[u32], b: &[u32]) -> bool {
    let a: BTreeSet<_> = a.iter().collect();
    let b: BTreeSet<_> = b.iter().collect();
    a == b
}
