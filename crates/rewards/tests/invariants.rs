//! Invariant Property Tests
//!
//! Random sequences of delegations, trust changes, withdrawals and blocks
//! must keep every registered invariant intact.
//!
//! Run with: cargo test -p restake-rewards --test invariants

mod common;

use common::{basic_terms, coins, test_address, TestEnv};
use proptest::prelude::*;
use restake_types::DelegationType;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Action {
    Delegate { kind: u8, user: u32, amount: u128 },
    Undelegate { kind: u8, user: u32 },
    Withdraw { kind: u8, user: u32 },
    Trust { user: u32, trusted: bool },
    Advance { seconds: i64 },
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u8..3, 1u32..4, 1u128..1_000_000_000)
            .prop_map(|(kind, user, amount)| Action::Delegate { kind, user, amount }),
        (0u8..3, 1u32..4).prop_map(|(kind, user)| Action::Undelegate { kind, user }),
        (0u8..3, 1u32..4).prop_map(|(kind, user)| Action::Withdraw { kind, user }),
        (1u32..4, any::<bool>()).prop_map(|(user, trusted)| Action::Trust { user, trusted }),
        (1i64..20_000).prop_map(|seconds| Action::Advance { seconds }),
    ]
}

fn delegation_type(kind: u8) -> DelegationType {
    match kind {
        0 => DelegationType::Pool,
        1 => DelegationType::Operator,
        _ => DelegationType::Service,
    }
}

fn setup() -> TestEnv {
    let mut env = TestEnv::new();
    env.create_service(1, test_address(100));
    env.create_pool(1, "umilk", vec![1]);
    env.create_operator(1, test_address(200), "0.07", 1);
    env.create_plan(1, basic_terms(123_456_789), 1_000_000_000_000);
    env.begin_block();
    env
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_invariants_hold_for_any_sequence(actions in prop::collection::vec(action(), 1..40)) {
        let mut env = setup();
        let mut staked: HashMap<(u8, u32), u128> = HashMap::new();

        for action in actions {
            match action {
                Action::Delegate { kind, user, amount } => {
                    env.delegate(delegation_type(kind), 1, test_address(user), coins("umilk", amount));
                    *staked.entry((kind, user)).or_default() += amount;
                }
                Action::Undelegate { kind, user } => {
                    let Some(amount) = staked.remove(&(kind, user)) else { continue };
                    env.undelegate(delegation_type(kind), 1, test_address(user), coins("umilk", amount));
                }
                Action::Withdraw { kind, user } => {
                    if staked.contains_key(&(kind, user)) {
                        env.withdraw(delegation_type(kind), 1, test_address(user));
                    }
                }
                Action::Trust { user, trusted } => {
                    env.restaking
                        .set_trusted_service(&mut env.keeper, &env.ctx, test_address(user), 1, trusted)
                        .unwrap();
                }
                Action::Advance { seconds } => env.advance(seconds),
            }

            prop_assert!(env.keeper.all_invariants(&env.ctx).is_ok());
        }
    }

    #[test]
    fn prop_trusted_shares_match_trusting_delegations(
        delegations in prop::collection::vec((1u32..5, 1u128..1_000_000, any::<bool>()), 1..12)
    ) {
        let mut env = setup();
        let mut expected = 0u128;
        let mut trusting: HashMap<u32, bool> = HashMap::new();
        let mut held: HashMap<u32, u128> = HashMap::new();

        for (user, amount, trusted) in delegations {
            env.delegate(DelegationType::Pool, 1, test_address(user), coins("umilk", amount));
            *held.entry(user).or_default() += amount;
            env.restaking
                .set_trusted_service(&mut env.keeper, &env.ctx, test_address(user), 1, trusted)
                .unwrap();
            trusting.insert(user, trusted);
        }
        for (user, amount) in &held {
            if trusting.get(user).copied().unwrap_or(false) {
                expected += amount;
            }
        }

        let shares = env.keeper.query_pool_service_total_delegator_shares(1, 1);
        prop_assert_eq!(shares.amount_of("umilk"), restake_types::Decimal::from(expected));
    }
}
