//! Interfaces of the subsystems the rewards engine depends on.
//!
//! Token transfers, prices, entity lookups and delegation bookkeeping are
//! owned elsewhere. The engine only talks to them through these traits, and
//! their failures surface as [`anyhow::Error`].

use anyhow::Result;
use restake_types::{
    Address, Coins, Decimal, Delegation, DelegationType, Operator, Pool, Service,
    UserPreferences,
};
use serde::{Deserialize, Serialize};

/// Token balances and transfers.
pub trait BankKeeper: Send + Sync {
    fn get_all_balances(&self, address: &Address) -> Coins;

    fn send_coins(&self, from: &Address, to: &Address, amount: &Coins) -> Result<()>;

    /// Addresses that must never receive user withdrawals (module accounts).
    fn is_blocked(&self, address: &Address) -> bool;
}

/// External price feed. `None` means the denom has no known price.
pub trait PriceOracle: Send + Sync {
    fn get_price(&self, denom: &str) -> Result<Option<Decimal>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolsParams {
    /// Services allowed to borrow security from pools.
    #[serde(default)]
    pub allowed_services_ids: Vec<u32>,
}

pub trait PoolsKeeper: Send + Sync {
    fn get_pool(&self, pool_id: u32) -> Result<Option<Pool>>;

    fn get_pools(&self) -> Result<Vec<Pool>>;

    fn get_params(&self) -> Result<PoolsParams>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorParams {
    pub commission_rate: Decimal,
}

pub trait OperatorsKeeper: Send + Sync {
    fn get_operator(&self, operator_id: u32) -> Result<Option<Operator>>;

    fn get_operators(&self) -> Result<Vec<Operator>>;

    fn get_operator_params(&self, operator_id: u32) -> Result<OperatorParams>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceParams {
    /// Denoms the service accepts as security. Empty accepts all.
    #[serde(default)]
    pub allowed_denoms: Vec<String>,
    /// Pools the service borrows security from. Empty means all pools.
    #[serde(default)]
    pub whitelisted_pools_ids: Vec<u32>,
    /// Operators allowed to validate the service. Empty means all operators.
    #[serde(default)]
    pub whitelisted_operators_ids: Vec<u32>,
}

pub trait ServicesKeeper: Send + Sync {
    fn get_service(&self, service_id: u32) -> Result<Option<Service>>;

    fn get_services(&self) -> Result<Vec<Service>>;

    fn get_service_params(&self, service_id: u32) -> Result<ServiceParams>;
}

/// Delegation bookkeeping and user trust preferences.
pub trait RestakingKeeper: Send + Sync {
    /// Globally restakable denoms. Empty allows every denom.
    fn get_restakable_denoms(&self) -> Result<Vec<String>>;

    fn get_delegation(
        &self,
        delegation_type: DelegationType,
        target_id: u32,
        user: &Address,
    ) -> Result<Option<Delegation>>;

    fn get_user_preferences(&self, user: &Address) -> Result<UserPreferences>;

    fn get_user_pool_delegations(&self, user: &Address) -> Result<Vec<Delegation>>;

    fn get_all_delegations(&self, delegation_type: DelegationType) -> Result<Vec<Delegation>>;

    fn has_operator_joined_service(&self, operator_id: u32, service_id: u32) -> Result<bool>;
}
