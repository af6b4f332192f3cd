//! Builds a rewards keeper from a [`SimConfig`] and drives it block by block.

use crate::settings::SimConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use restake_rewards::{
    community_pool_address, BankKeeper, BlockContext, Collaborators, Distribution, InMemoryBank,
    MockRestaking, MsgCreateRewardsPlan, MsgUpdateParams, MsgWithdrawDelegatorReward, Params,
    PlanTerms, PoolsParams, OperatorParams, RewardsKeeper, RewardsState, ServiceParams,
    StaticPriceOracle, UsersDistribution,
};
use restake_types::{
    Address, Coin, Coins, DecCoins, DecPools, DelegationType, TrustedServiceEntry, UserPreferences,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    pub name: String,
    pub address: Address,
    pub pending: DecCoins,
    pub withdrawn: Coins,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub delegation_type: DelegationType,
    pub target_id: u32,
    pub outstanding: DecPools,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub plan_id: u64,
    pub service_id: u32,
    pub escrow: Coins,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub height: u64,
    pub time: DateTime<Utc>,
    pub users: Vec<UserReport>,
    pub targets: Vec<TargetReport>,
    pub operator_commissions: BTreeMap<u32, DecPools>,
    pub active_plans: Vec<PlanReport>,
    pub community_pool: Coins,
    pub invariants_ok: bool,
}

pub struct Simulation {
    config: SimConfig,
    keeper: RewardsKeeper,
    bank: Arc<InMemoryBank>,
    restaking: Arc<MockRestaking>,
    ctx: BlockContext,
    users: BTreeMap<String, Address>,
    reward_denoms: BTreeSet<String>,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        let bank = Arc::new(InMemoryBank::new());
        let oracle = Arc::new(StaticPriceOracle::with_prices(
            config
                .prices
                .iter()
                .map(|price| (price.denom.clone(), price.price)),
        ));
        let restaking = Arc::new(MockRestaking::new());

        let keeper = RewardsKeeper::new(
            Collaborators {
                bank: bank.clone(),
                oracle,
                pools: restaking.clone(),
                operators: restaking.clone(),
                services: restaking.clone(),
                restaking: restaking.clone(),
            },
            Address::module("gov"),
            RewardsState::default(),
        );

        let users = config
            .delegations
            .iter()
            .map(|delegation| delegation.user.clone())
            .chain(config.trust.iter().map(|trust| trust.user.clone()))
            .map(|name| {
                let address = Address::from_seed(&name);
                (name, address)
            })
            .collect();
        let reward_denoms = config.plans.iter().map(|plan| plan.denom.clone()).collect();

        Self {
            ctx: BlockContext::new(1, config.start_time),
            config,
            keeper,
            bank,
            restaking,
            users,
            reward_denoms,
        }
    }

    /// Register entities, plans, preferences and delegations at the start
    /// time, then run the first block.
    pub fn setup(&mut self) -> Result<()> {
        let ctx = self.ctx;

        self.restaking
            .set_restakable_denoms(self.config.restakable_denoms.clone());
        self.restaking.set_pools_params(PoolsParams {
            allowed_services_ids: self.config.pools_allowed_services.clone(),
        });

        let fee = Coins::from_coins(
            self.config
                .rewards_plan_creation_fee
                .iter()
                .map(|fee| Coin::new(fee.denom.clone(), u128::from(fee.amount))),
        );
        let authority = self.keeper.authority();
        self.keeper.msg_update_params(MsgUpdateParams {
            authority,
            params: Params::new(fee.clone()),
        })?;

        for service in &self.config.services {
            let admin = Address::from_seed(&service.admin);
            self.restaking
                .create_service(&mut self.keeper, &ctx, service.id, admin)?;
            self.restaking.set_service_params(
                service.id,
                ServiceParams {
                    allowed_denoms: service.allowed_denoms.clone(),
                    ..ServiceParams::default()
                },
            );
            self.bank.mint(&admin, &fee);
        }
        for pool in &self.config.pools {
            self.restaking
                .create_pool(&mut self.keeper, &ctx, pool.id, &pool.denom)?;
        }
        for operator in &self.config.operators {
            self.restaking.create_operator(
                &mut self.keeper,
                &ctx,
                operator.id,
                Address::from_seed(&operator.admin),
            )?;
            self.restaking.set_operator_params(
                operator.id,
                OperatorParams {
                    commission_rate: operator.commission_rate,
                },
            );
            for service_id in &operator.joined_services {
                self.restaking.join_service(operator.id, *service_id);
            }
        }

        for plan in &self.config.plans {
            let service = self
                .config
                .services
                .iter()
                .find(|service| service.id == plan.service_id)
                .with_context(|| format!("unknown service {}", plan.service_id))?;
            let terms = PlanTerms {
                description: format!("service {} rewards", plan.service_id),
                amount_per_day: Coin::new(plan.denom.clone(), u128::from(plan.amount_per_day)),
                start_time: self.config.start_time,
                end_time: self.config.start_time + Duration::days(plan.duration_days),
                pools_distribution: Distribution::basic(DelegationType::Pool, plan.pools_weight),
                operators_distribution: Distribution::basic(
                    DelegationType::Operator,
                    plan.operators_weight,
                ),
                users_distribution: UsersDistribution::basic(plan.users_weight),
            };
            let plan_id = self.keeper.msg_create_rewards_plan(MsgCreateRewardsPlan {
                sender: Address::from_seed(&service.admin),
                service_id: plan.service_id,
                terms,
            })?;
            let escrow = self.keeper.query_rewards_plan(plan_id)?.rewards_pool;
            self.bank
                .mint(&escrow, &Coins::single(plan.denom.clone(), u128::from(plan.funding)));
            info!(plan_id, service_id = plan.service_id, funding = plan.funding, "created rewards plan");
        }

        for trust in &self.config.trust {
            let preferences = UserPreferences::new(
                trust
                    .services
                    .iter()
                    .map(|service_id| TrustedServiceEntry::new(*service_id, Vec::new()))
                    .collect(),
            );
            self.restaking.set_user_preferences(
                &mut self.keeper,
                &ctx,
                Address::from_seed(&trust.user),
                preferences,
            )?;
        }

        for delegation in &self.config.delegations {
            self.restaking.delegate(
                &mut self.keeper,
                &ctx,
                delegation.delegation_type,
                delegation.target_id,
                Address::from_seed(&delegation.user),
                &Coins::single(delegation.denom.clone(), u128::from(delegation.amount)),
            )?;
        }

        self.keeper.begin_block(&ctx)?;
        Ok(())
    }

    /// Run the configured number of blocks. Invariants are checked every
    /// `invariants_every` blocks when set.
    pub fn run(&mut self, invariants_every: Option<u64>) -> Result<()> {
        let block_time = Duration::seconds(self.config.block_time_secs);
        for _ in 0..self.config.blocks {
            self.ctx = BlockContext::new(self.ctx.height + 1, self.ctx.time + block_time);
            self.keeper.begin_block(&self.ctx)?;
            debug!(height = self.ctx.height, time = %self.ctx.time, "processed block");

            if let Some(every) = invariants_every.filter(|every| *every > 0) {
                if self.ctx.height % every == 0 {
                    self.keeper.all_invariants(&self.ctx)?;
                }
            }
        }
        info!(height = self.ctx.height, time = %self.ctx.time, "simulation finished");
        Ok(())
    }

    /// Withdraw every configured delegation's rewards.
    pub fn withdraw_all(&mut self) -> Result<()> {
        let delegations: BTreeSet<(DelegationType, u32, Address)> = self
            .config
            .delegations
            .iter()
            .map(|d| (d.delegation_type, d.target_id, Address::from_seed(&d.user)))
            .collect();
        for (delegation_type, target_id, delegator) in delegations {
            let amount = self.keeper.msg_withdraw_delegator_reward(
                &self.ctx,
                MsgWithdrawDelegatorReward {
                    delegator,
                    delegation_type,
                    target_id,
                },
            )?;
            debug!(%delegation_type, target_id, %delegator, %amount, "withdrew rewards");
        }
        Ok(())
    }

    pub fn report(&self) -> Result<Report> {
        let mut users = Vec::new();
        for (name, address) in &self.users {
            let pending = self
                .keeper
                .query_delegator_total_rewards(&self.ctx, address)?
                .total;
            let balances = self.bank.get_all_balances(address);
            let withdrawn = Coins::from_coins(
                self.reward_denoms
                    .iter()
                    .map(|denom| Coin::new(denom.clone(), balances.amount_of(denom)))
                    .filter(|coin| coin.amount > 0),
            );
            users.push(UserReport {
                name: name.clone(),
                address: *address,
                pending,
                withdrawn,
            });
        }

        let mut targets = Vec::new();
        let entities = self
            .config
            .pools
            .iter()
            .map(|pool| (DelegationType::Pool, pool.id))
            .chain(self.config.operators.iter().map(|op| (DelegationType::Operator, op.id)))
            .chain(self.config.services.iter().map(|s| (DelegationType::Service, s.id)));
        for (delegation_type, target_id) in entities {
            targets.push(TargetReport {
                delegation_type,
                target_id,
                outstanding: self.keeper.query_outstanding_rewards(delegation_type, target_id)?,
            });
        }

        let mut operator_commissions = BTreeMap::new();
        for operator in &self.config.operators {
            operator_commissions.insert(
                operator.id,
                self.keeper.query_operator_commission(operator.id)?,
            );
        }

        let active_plans = self
            .keeper
            .query_rewards_plans()
            .into_iter()
            .map(|plan| PlanReport {
                plan_id: plan.id,
                service_id: plan.service_id,
                escrow: self.bank.get_all_balances(&plan.rewards_pool),
            })
            .collect();

        let invariants_ok = match self.keeper.all_invariants(&self.ctx) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "invariant broken at end of simulation");
                false
            }
        };

        Ok(Report {
            height: self.ctx.height,
            time: self.ctx.time,
            users,
            targets,
            operator_commissions,
            active_plans,
            community_pool: self.bank.get_all_balances(&community_pool_address()),
            invariants_ok,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DelegationConfig, PlanConfig, PriceConfig, ServiceConfig};
    use chrono::TimeZone;
    use restake_types::Decimal;

    fn config() -> SimConfig {
        SimConfig {
            log_level: "info".into(),
            log_format: "pretty".into(),
            start_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            blocks: 10,
            block_time_secs: 1,
            restakable_denoms: Vec::new(),
            pools_allowed_services: Vec::new(),
            rewards_plan_creation_fee: Vec::new(),
            prices: vec![PriceConfig {
                denom: "umilk".into(),
                price: Decimal::ONE,
            }],
            services: vec![ServiceConfig {
                id: 1,
                admin: "admin".into(),
                allowed_denoms: Vec::new(),
            }],
            pools: Vec::new(),
            operators: Vec::new(),
            plans: vec![PlanConfig {
                service_id: 1,
                denom: "service".into(),
                amount_per_day: 100_000_000,
                funding: 1_000_000_000,
                duration_days: 30,
                pools_weight: 0,
                operators_weight: 0,
                users_weight: 0,
            }],
            trust: Vec::new(),
            delegations: ["alice", "bob"]
                .into_iter()
                .map(|user| DelegationConfig {
                    delegation_type: DelegationType::Service,
                    target_id: 1,
                    user: user.into(),
                    denom: "umilk".into(),
                    amount: 100_000_000,
                })
                .collect(),
        }
    }

    #[test]
    fn test_two_delegators_split_ten_seconds() {
        let mut sim = Simulation::new(config());
        sim.setup().unwrap();
        sim.run(Some(1)).unwrap();
        sim.withdraw_all().unwrap();

        let report = sim.report().unwrap();
        assert_eq!(report.height, 11);
        assert!(report.invariants_ok);
        for user in &report.users {
            assert_eq!(user.withdrawn, Coins::single("service", 5_787));
            assert!(user.pending.is_empty());
        }
        assert_eq!(report.active_plans.len(), 1);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut sim = Simulation::new(config());
        sim.setup().unwrap();
        sim.run(None).unwrap();
        let json = serde_json::to_value(sim.report().unwrap()).unwrap();
        assert_eq!(json["height"], 11);
        assert_eq!(json["users"].as_array().unwrap().len(), 2);
    }
}
