//! Restaking Rewards Module
//!
//! Pays rewards plans funded by services to the pools, operators and
//! services that secure them, and settles delegator rewards lazily with
//! period-based cumulative reward ratios.

pub mod allocation;
pub mod bank;
pub mod commission;
pub mod delegation;
pub mod distribution;
pub mod errors;
pub mod events;
pub mod hooks;
pub mod invariants;
pub mod keeper;
pub mod keepers;
pub mod ledger;
pub mod msg_server;
pub mod oracle;
pub mod params;
pub mod plan;
pub mod plans;
pub mod queries;
pub mod restaking;
pub mod state;
pub mod trust;

pub use bank::{InMemoryBank, MockBank};
pub use commission::split_commission;
pub use distribution::{DistributionInfo, GroupRewards, GroupValues};
pub use errors::{Result, RewardsError};
pub use events::RewardsEvent;
pub use hooks::RestakingHooks;
pub use keeper::{BlockContext, Collaborators, RewardsKeeper};
pub use keepers::{
    BankKeeper, OperatorParams, OperatorsKeeper, PoolsKeeper, PoolsParams, PriceOracle,
    RestakingKeeper, ServiceParams, ServicesKeeper,
};
pub use msg_server::{
    MsgCreateRewardsPlan, MsgEditRewardsPlan, MsgSetWithdrawAddress, MsgUpdateParams,
    MsgWithdrawDelegatorReward, MsgWithdrawOperatorCommission, RewardsMsg, RewardsMsgResponse,
};
pub use oracle::{StaticPriceOracle, ValueOracle};
pub use params::{community_pool_address, rewards_plan_escrow_address, rewards_pool_address, Params};
pub use plan::{
    Distribution, DistributionType, DistributionWeight, RewardsPlan, UsersDistribution,
    UsersDistributionType,
};
pub use plans::PlanTerms;
pub use queries::{DelegationReward, DelegatorTotalRewards};
pub use restaking::MockRestaking;
pub use state::{
    AccumulatedCommission, CurrentRewards, DelegatorStartingInfo, HistoricalRewards,
    OutstandingRewards, RewardsState,
};
