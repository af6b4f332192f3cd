//! Trust-gated pool accounting.
//!
//! A pool pays a service's rewards only to the stake of delegators that
//! trust that service. The keeper tracks those shares per (pool, service)
//! so the allocator never has to walk delegators.

use crate::errors::Result;
use crate::keeper::{BlockContext, RewardsKeeper};
use restake_types::{
    compute_changed_services_ids, Address, DecCoins, Delegation, DelegationTarget, DelegationType,
    TrustedServiceEntry, UserPreferences,
};
use tracing::debug;

impl RewardsKeeper {
    pub fn get_pool_service_total_delegator_shares(&self, pool_id: u32, service_id: u32) -> DecCoins {
        self.state.pool_service_shares(pool_id, service_id)
    }

    pub(crate) fn increment_pool_service_total_delegator_shares(&mut self, pool_id: u32, service_id: u32, shares: &DecCoins) {
        let total = self.state.pool_service_shares(pool_id, service_id).add(shares);
        self.state.set_pool_service_shares(pool_id, service_id, total);
    }

    /// The record is deleted once it reaches zero.
    pub(crate) fn decrement_pool_service_total_delegator_shares(&mut self, pool_id: u32, service_id: u32, shares: &DecCoins) {
        let total = self.state.pool_service_shares(pool_id, service_id).sub(shares);
        if total.is_any_negative() {
            panic!("negative pool-service delegator shares for pool {pool_id} service {service_id}: {total}");
        }
        self.state.set_pool_service_shares(pool_id, service_id, total);
    }

    /// Add or remove a pool delegation's shares from every service the
    /// delegator trusts with the pool.
    ///
    /// Whether the service is secured by the pool is left to the allocator:
    /// the before and after hooks of one change must touch the same records
    /// even if the service's pool allow-list moves in between.
    pub(crate) fn apply_trusted_pool_shares(&mut self, preferences: &UserPreferences, delegation: &Delegation, add: bool) {
        let pool_id = delegation.target_id;
        for service_id in preferences.trusted_services_ids() {
            if !preferences.is_service_trusted_with_pool(service_id, pool_id) {
                continue;
            }
            if add {
                self.increment_pool_service_total_delegator_shares(pool_id, service_id, &delegation.shares);
            } else {
                self.decrement_pool_service_total_delegator_shares(pool_id, service_id, &delegation.shares);
            }
        }
    }

    /// Settle a pool delegation under `settle_with` and start a new window.
    fn resettle_pool_delegation(
        &mut self,
        ctx: &BlockContext,
        pool: &DelegationTarget,
        delegation: &Delegation,
        settle_with: &UserPreferences,
    ) -> Result<()> {
        self.settle_delegation_rewards(ctx, pool, delegation, Some(settle_with))?;
        self.initialize_delegation(ctx, pool, &delegation.user)
    }

    /// `user` started or stopped trusting `service_id`; `before` holds the
    /// preferences in force until now.
    ///
    /// Only pools whose trust flag for the service flips are settled under
    /// the previous trust and move their shares in or out of the
    /// pool-service total.
    pub fn resync_trusted_service(
        &mut self,
        ctx: &BlockContext,
        user: &Address,
        service_id: u32,
        trusted: bool,
        before: &UserPreferences,
    ) -> Result<()> {
        let after = self.restaking.get_user_preferences(user)?;
        debug!(
            target: "rewards",
            user = %user,
            service_id,
            trusted,
            "resyncing pool-service shares after trust change"
        );
        self.resync_services(ctx, user, before, &after, &[service_id])
    }

    /// `user` replaced their preferences. Only services whose trust flag
    /// flips for a given pool are touched.
    pub fn resync_user_preferences(
        &mut self,
        ctx: &BlockContext,
        user: &Address,
        before: &UserPreferences,
        after: &UserPreferences,
    ) -> Result<()> {
        let changed = compute_changed_services_ids(before, after);
        if changed.is_empty() {
            return Ok(());
        }
        self.resync_services(ctx, user, before, after, &changed)
    }

    fn resync_services(
        &mut self,
        ctx: &BlockContext,
        user: &Address,
        before: &UserPreferences,
        after: &UserPreferences,
        services_ids: &[u32],
    ) -> Result<()> {
        for delegation in self.restaking.get_user_pool_delegations(user)? {
            let pool_id = delegation.target_id;
            let pool = self.get_delegation_target(DelegationType::Pool, pool_id)?;
            // Settlements inside the loop must see the trust already applied
            // for the services handled before.
            let mut in_force = before.clone();

            for &service_id in services_ids {
                let trusted_before = before.is_service_trusted_with_pool(service_id, pool_id);
                let trusted_after = after.is_service_trusted_with_pool(service_id, pool_id);
                if trusted_before == trusted_after {
                    continue;
                }

                self.resettle_pool_delegation(ctx, &pool, &delegation, &in_force)?;
                in_force = preferences_with_entry(&in_force, after, service_id);

                if trusted_after {
                    self.increment_pool_service_total_delegator_shares(pool_id, service_id, &delegation.shares);
                } else {
                    self.decrement_pool_service_total_delegator_shares(pool_id, service_id, &delegation.shares);
                }
                debug!(
                    target: "rewards",
                    user = %user,
                    pool_id,
                    service_id,
                    trusted = trusted_after,
                    "updated pool-service shares"
                );
            }
        }
        Ok(())
    }
}

/// `base` with the entry for `service_id` taken from `source`.
fn preferences_with_entry(base: &UserPreferences, source: &UserPreferences, service_id: u32) -> UserPreferences {
    let mut entries: Vec<TrustedServiceEntry> = base
        .trusted_services
        .iter()
        .filter(|entry| entry.service_id != service_id)
        .cloned()
        .collect();
    if let Some(entry) = source
        .trusted_services
        .iter()
        .find(|entry| entry.service_id == service_id)
    {
        entries.push(entry.clone());
    }
    UserPreferences::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_with_entry_copies_pool_list() {
        let base = UserPreferences::new(vec![TrustedServiceEntry::new(1, vec![])]);
        let source = UserPreferences::new(vec![TrustedServiceEntry::new(2, vec![5])]);

        let merged = preferences_with_entry(&base, &source, 2);
        assert!(merged.is_service_trusted_with_pool(2, 5));
        assert!(!merged.is_service_trusted_with_pool(2, 6));

        let dropped = preferences_with_entry(&merged, &base, 2);
        assert!(!dropped.is_service_trusted_with_pool(2, 5));
        assert!(dropped.is_service_trusted_with_pool(1, 5));
    }
}
