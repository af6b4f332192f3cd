//! Simulation configuration.
//!
//! Loaded from an optional TOML file and overridden by `RESTAKE_SIM_*`
//! environment variables, the same layering the node uses.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use config::{Config, Environment, File};
use restake_types::{Decimal, DelegationType};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,

    pub start_time: DateTime<Utc>,
    pub blocks: u64,
    #[serde(default = "default_block_time_secs")]
    pub block_time_secs: i64,

    #[serde(default)]
    pub restakable_denoms: Vec<String>,
    #[serde(default)]
    pub pools_allowed_services: Vec<u32>,
    #[serde(default)]
    pub rewards_plan_creation_fee: Vec<FeeConfig>,

    #[serde(default)]
    pub prices: Vec<PriceConfig>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub operators: Vec<OperatorConfig>,
    #[serde(default)]
    pub plans: Vec<PlanConfig>,
    #[serde(default)]
    pub trust: Vec<TrustConfig>,
    #[serde(default)]
    pub delegations: Vec<DelegationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    pub denom: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceConfig {
    pub denom: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub id: u32,
    /// Seed of the admin address.
    pub admin: String,
    #[serde(default)]
    pub allowed_denoms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub id: u32,
    pub denom: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    pub id: u32,
    pub admin: String,
    #[serde(default)]
    pub commission_rate: Decimal,
    #[serde(default)]
    pub joined_services: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanConfig {
    pub service_id: u32,
    pub denom: String,
    pub amount_per_day: u64,
    pub funding: u64,
    pub duration_days: i64,
    #[serde(default)]
    pub pools_weight: u32,
    #[serde(default)]
    pub operators_weight: u32,
    #[serde(default)]
    pub users_weight: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrustConfig {
    pub user: String,
    pub services: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelegationConfig {
    pub delegation_type: DelegationType,
    pub target_id: u32,
    pub user: String,
    pub denom: String,
    pub amount: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_block_time_secs() -> i64 {
    6
}

impl SimConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("RESTAKE_SIM"));

        let config: SimConfig = builder
            .build()?
            .try_deserialize()
            .context("invalid simulation configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_time_secs <= 0 {
            bail!("block_time_secs must be positive, got {}", self.block_time_secs);
        }
        for plan in &self.plans {
            if plan.duration_days <= 0 {
                bail!("plan of service {} must last at least one day", plan.service_id);
            }
            if !self.services.iter().any(|service| service.id == plan.service_id) {
                bail!("plan references unknown service {}", plan.service_id);
            }
        }
        Ok(())
    }
}
