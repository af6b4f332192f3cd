//! Consistency checks over the whole rewards ledger.
//!
//! Each check returns [`RewardsError::InvariantBroken`] describing the
//! first violation found. None of them mutate state or move funds.

use crate::errors::{Result, RewardsError};
use crate::keeper::{BlockContext, RewardsKeeper};
use crate::params::rewards_pool_address;
use restake_types::{DecCoins, DecPools, DelegationType};
use std::collections::BTreeMap;
use std::fmt::Write;

pub const NON_NEGATIVE_OUTSTANDING: &str = "nonnegative-outstanding";
pub const CAN_WITHDRAW: &str = "can-withdraw";
pub const REFERENCE_COUNT: &str = "reference-count";
pub const MODULE_ACCOUNT: &str = "module-account";

fn broken(route: &'static str, message: String) -> RewardsError {
    RewardsError::InvariantBroken { route, message }
}

impl RewardsKeeper {
    /// Run every invariant, stopping at the first broken one.
    pub fn all_invariants(&self, ctx: &BlockContext) -> Result<()> {
        self.check_can_withdraw(ctx)?;
        self.check_non_negative_outstanding()?;
        self.check_reference_count()?;
        self.check_module_account()
    }

    pub fn check_non_negative_outstanding(&self) -> Result<()> {
        let mut message = String::new();
        let mut count = 0;
        for delegation_type in DelegationType::ALL {
            for (target_id, outstanding) in &self.state.store(delegation_type).outstanding {
                if outstanding.rewards.is_any_negative() {
                    count += 1;
                    let _ = writeln!(
                        message,
                        "\t{delegation_type} {target_id} has negative outstanding coins: {}",
                        outstanding.rewards
                    );
                }
            }
        }
        if count > 0 {
            return Err(broken(
                NON_NEGATIVE_OUTSTANDING,
                format!("found {count} delegation targets with negative outstanding rewards\n{message}"),
            ));
        }
        Ok(())
    }

    /// Every delegation could withdraw its previewed rewards, and operators
    /// their commission, without driving outstanding negative.
    pub fn check_can_withdraw(&self, ctx: &BlockContext) -> Result<()> {
        for delegation_type in DelegationType::ALL {
            let mut owed: BTreeMap<u32, DecPools> = BTreeMap::new();
            for delegation in self.restaking.get_all_delegations(delegation_type)? {
                let target = self.get_delegation_target(delegation_type, delegation.target_id)?;
                let preview = self.delegation_rewards_preview(ctx, &target, &delegation.user)?;
                let entry = owed.entry(delegation.target_id).or_default();
                *entry = entry.add(&preview);
            }

            for (target_id, outstanding) in &self.state.store(delegation_type).outstanding {
                let mut remaining = outstanding.rewards.clone();
                if let Some(rewards) = owed.get(target_id) {
                    remaining = remaining.sub(rewards);
                }
                if delegation_type == DelegationType::Operator {
                    let commission = self.get_operator_accumulated_commission(*target_id);
                    remaining = remaining.sub(&commission.commissions);
                }
                if remaining.is_any_negative() {
                    return Err(broken(
                        CAN_WITHDRAW,
                        format!("{delegation_type} {target_id} remaining coins: {remaining}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Historical references = one per target ledger + one per delegation.
    pub fn check_reference_count(&self) -> Result<()> {
        for delegation_type in DelegationType::ALL {
            let store = self.state.store(delegation_type);
            let targets = store.current.len() as u64;
            let delegations = self.restaking.get_all_delegations(delegation_type)?.len() as u64;
            let expected = targets + delegations;
            let references = store.total_reference_count();
            if references != expected {
                return Err(broken(
                    REFERENCE_COUNT,
                    format!(
                        "expected historical reference count: {expected} = {targets} delegation targets + {delegations} delegations\n\
                         total {delegation_type} historical reference count: {references}"
                    ),
                ));
            }
        }
        Ok(())
    }

    /// The rewards pool holds at least every outstanding reward.
    pub fn check_module_account(&self) -> Result<()> {
        let mut expected = DecCoins::new();
        for delegation_type in DelegationType::ALL {
            for outstanding in self.state.store(delegation_type).outstanding.values() {
                expected = expected.add(&outstanding.rewards.sum());
            }
        }
        let (expected, _) = expected.truncate_decimal();
        let balances = self.bank.get_all_balances(&rewards_pool_address());
        if !balances.is_all_gte(&expected) {
            return Err(broken(
                MODULE_ACCOUNT,
                format!("expected rewards pool coins: {expected}, rewards pool coins: {balances}"),
            ));
        }
        Ok(())
    }
}
