//! Callbacks the restaking subsystem invokes around delegation changes.
//!
//! Call order is always Before* → mutate → After*. A returned error aborts
//! the surrounding transaction.

use crate::errors::Result;
use crate::keeper::{BlockContext, RewardsKeeper};
use restake_types::{Address, DelegationTarget, DelegationType, UserPreferences};

pub trait RestakingHooks {
    /// A delegation to `target_id` is about to be created.
    fn before_delegation_created(&mut self, ctx: &BlockContext, delegation_type: DelegationType, target_id: u32) -> Result<()>;

    /// An existing delegation is about to change shares or be removed.
    fn before_delegation_shares_modified(
        &mut self,
        ctx: &BlockContext,
        delegation_type: DelegationType,
        target_id: u32,
        delegator: &Address,
    ) -> Result<()>;

    /// A delegation was created or changed and is stored with its new shares.
    fn after_delegation_modified(
        &mut self,
        ctx: &BlockContext,
        delegation_type: DelegationType,
        target_id: u32,
        delegator: &Address,
    ) -> Result<()>;

    fn after_delegation_target_created(&mut self, ctx: &BlockContext, delegation_type: DelegationType, target_id: u32) -> Result<()>;

    /// `target` is the entity as it was right before removal.
    fn after_delegation_target_removed(&mut self, ctx: &BlockContext, target: &DelegationTarget) -> Result<()>;

    /// `before` holds the user's preferences as they were prior to the update.
    fn after_user_trusted_service_updated(
        &mut self,
        ctx: &BlockContext,
        user: &Address,
        service_id: u32,
        trusted: bool,
        before: &UserPreferences,
    ) -> Result<()>;

    fn after_user_preferences_modified(
        &mut self,
        ctx: &BlockContext,
        user: &Address,
        before: &UserPreferences,
        after: &UserPreferences,
    ) -> Result<()>;
}

impl RestakingHooks for RewardsKeeper {
    fn before_delegation_created(&mut self, _ctx: &BlockContext, delegation_type: DelegationType, target_id: u32) -> Result<()> {
        let target = self.get_delegation_target(delegation_type, target_id)?;
        if !self.has_delegation_target_ledger(delegation_type, target_id) {
            self.initialize_delegation_target(&target);
        }
        self.increment_delegation_target_period(&target)?;
        Ok(())
    }

    fn before_delegation_shares_modified(
        &mut self,
        ctx: &BlockContext,
        delegation_type: DelegationType,
        target_id: u32,
        delegator: &Address,
    ) -> Result<()> {
        let target = self.get_delegation_target(delegation_type, target_id)?;
        let delegation = self.get_delegation(&target, delegator)?;
        self.withdraw_delegation_rewards(ctx, &target, &delegation)?;

        if delegation_type == DelegationType::Pool {
            let preferences = self.restaking.get_user_preferences(delegator)?;
            self.apply_trusted_pool_shares(&preferences, &delegation, false);
        }
        Ok(())
    }

    fn after_delegation_modified(
        &mut self,
        ctx: &BlockContext,
        delegation_type: DelegationType,
        target_id: u32,
        delegator: &Address,
    ) -> Result<()> {
        let target = self.get_delegation_target(delegation_type, target_id)?;
        self.initialize_delegation(ctx, &target, delegator)?;

        if delegation_type == DelegationType::Pool {
            let delegation = self.get_delegation(&target, delegator)?;
            let preferences = self.restaking.get_user_preferences(delegator)?;
            self.apply_trusted_pool_shares(&preferences, &delegation, true);
        }
        Ok(())
    }

    fn after_delegation_target_created(&mut self, _ctx: &BlockContext, delegation_type: DelegationType, target_id: u32) -> Result<()> {
        let target = self.get_delegation_target(delegation_type, target_id)?;
        self.initialize_delegation_target(&target);
        Ok(())
    }

    fn after_delegation_target_removed(&mut self, _ctx: &BlockContext, target: &DelegationTarget) -> Result<()> {
        self.clear_delegation_target(target)
    }

    fn after_user_trusted_service_updated(
        &mut self,
        ctx: &BlockContext,
        user: &Address,
        service_id: u32,
        trusted: bool,
        before: &UserPreferences,
    ) -> Result<()> {
        self.resync_trusted_service(ctx, user, service_id, trusted, before)
    }

    fn after_user_preferences_modified(
        &mut self,
        ctx: &BlockContext,
        user: &Address,
        before: &UserPreferences,
        after: &UserPreferences,
    ) -> Result<()> {
        self.resync_user_preferences(ctx, user, before, after)
    }
}
