//! Shared fixtures for the rewards integration tests.

#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use restake_rewards::{
    BlockContext, Collaborators, Distribution, InMemoryBank, MockRestaking, MsgUpdateParams,
    MsgWithdrawDelegatorReward, OperatorParams, Params, PlanTerms, PoolsParams, RewardsKeeper,
    RewardsPlan, RewardsState, StaticPriceOracle, UsersDistribution,
};
use restake_types::{Address, Coin, Coins, DelegationType, Decimal, TrustedServiceEntry, UserPreferences};
use std::str::FromStr;
use std::sync::Arc;

pub fn test_address(n: u32) -> Address {
    Address::from_seed(&format!("test-user-{n}"))
}

pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

pub fn coins(denom: &str, amount: u128) -> Coins {
    Coins::single(denom, amount)
}

pub fn plan_terms(amount_per_day: u128, pools: Distribution, operators: Distribution, users: UsersDistribution) -> PlanTerms {
    PlanTerms {
        description: "test plan".into(),
        amount_per_day: Coin::new("service", amount_per_day),
        start_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        end_time: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        pools_distribution: pools,
        operators_distribution: operators,
        users_distribution: users,
    }
}

pub fn basic_terms(amount_per_day: u128) -> PlanTerms {
    plan_terms(
        amount_per_day,
        Distribution::basic(DelegationType::Pool, 0),
        Distribution::basic(DelegationType::Operator, 0),
        UsersDistribution::basic(0),
    )
}

pub struct TestEnv {
    pub keeper: RewardsKeeper,
    pub bank: Arc<InMemoryBank>,
    pub oracle: Arc<StaticPriceOracle>,
    pub restaking: Arc<MockRestaking>,
    pub ctx: BlockContext,
    pub authority: Address,
}

impl TestEnv {
    /// Keeper at 2024-01-01 with `umilk` and `uinit` priced at 1.
    pub fn new() -> Self {
        let bank = Arc::new(InMemoryBank::new());
        let oracle = Arc::new(StaticPriceOracle::with_prices([
            ("umilk", Decimal::ONE),
            ("uinit", Decimal::ONE),
        ]));
        let restaking = Arc::new(MockRestaking::new());
        let authority = Address::module("gov");

        let keeper = RewardsKeeper::new(
            Collaborators {
                bank: bank.clone(),
                oracle: oracle.clone(),
                pools: restaking.clone(),
                operators: restaking.clone(),
                services: restaking.clone(),
                restaking: restaking.clone(),
            },
            authority,
            RewardsState::default(),
        );

        Self {
            keeper,
            bank,
            oracle,
            restaking,
            ctx: BlockContext::new(1, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            authority,
        }
    }

    /// Run the block hook at the current time.
    pub fn begin_block(&mut self) {
        self.keeper.begin_block(&self.ctx).unwrap();
    }

    /// Move to the next block `seconds` later and run the block hook.
    pub fn advance(&mut self, seconds: i64) {
        self.ctx = BlockContext::new(self.ctx.height + 1, self.ctx.time + Duration::seconds(seconds));
        self.begin_block();
    }

    pub fn create_service(&mut self, service_id: u32, admin: Address) {
        self.restaking
            .create_service(&mut self.keeper, &self.ctx, service_id, admin)
            .unwrap();
    }

    /// Pool that may secure every listed service.
    pub fn create_pool(&mut self, pool_id: u32, denom: &str, allowed_services: Vec<u32>) {
        self.restaking
            .create_pool(&mut self.keeper, &self.ctx, pool_id, denom)
            .unwrap();
        self.restaking.set_pools_params(PoolsParams {
            allowed_services_ids: allowed_services,
        });
    }

    /// Operator joined to `service_id`.
    pub fn create_operator(&mut self, operator_id: u32, admin: Address, commission_rate: &str, service_id: u32) {
        self.restaking
            .create_operator(&mut self.keeper, &self.ctx, operator_id, admin)
            .unwrap();
        self.restaking.set_operator_params(
            operator_id,
            OperatorParams {
                commission_rate: dec(commission_rate),
            },
        );
        self.restaking.join_service(operator_id, service_id);
    }

    /// Store a plan for `service_id` and fund its escrow.
    pub fn create_plan(&mut self, service_id: u32, terms: PlanTerms, funding: u128) -> RewardsPlan {
        let plan = self.keeper.create_rewards_plan(service_id, terms).unwrap();
        self.bank.mint(&plan.rewards_pool, &coins("service", funding));
        plan
    }

    pub fn delegate(&mut self, delegation_type: DelegationType, target_id: u32, user: Address, amount: Coins) {
        self.restaking
            .delegate(&mut self.keeper, &self.ctx, delegation_type, target_id, user, &amount)
            .unwrap();
    }

    pub fn undelegate(&mut self, delegation_type: DelegationType, target_id: u32, user: Address, amount: Coins) {
        self.restaking
            .undelegate(&mut self.keeper, &self.ctx, delegation_type, target_id, user, &amount)
            .unwrap();
    }

    /// Trust `services` through any pool.
    pub fn trust(&mut self, user: Address, services: &[u32]) {
        let preferences = UserPreferences::new(
            services
                .iter()
                .map(|id| TrustedServiceEntry::new(*id, Vec::new()))
                .collect(),
        );
        self.restaking
            .set_user_preferences(&mut self.keeper, &self.ctx, user, preferences)
            .unwrap();
    }

    pub fn withdraw(&mut self, delegation_type: DelegationType, target_id: u32, user: Address) -> Coins {
        self.keeper
            .msg_withdraw_delegator_reward(
                &self.ctx,
                MsgWithdrawDelegatorReward {
                    delegator: user,
                    delegation_type,
                    target_id,
                },
            )
            .unwrap()
    }

    pub fn set_params(&mut self, params: Params) {
        self.keeper
            .msg_update_params(MsgUpdateParams {
                authority: self.authority,
                params,
            })
            .unwrap();
    }

    pub fn balance(&self, address: &Address, denom: &str) -> u128 {
        use restake_rewards::BankKeeper;
        self.bank.get_all_balances(address).amount_of(denom)
    }
}
