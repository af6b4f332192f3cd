use restake_types::{Address, CoinsError, DelegationType};
use thiserror::Error;

/// Recoverable failures of the rewards engine.
///
/// Broken internal invariants (reference counts, negative ratios, stake
/// mismatches beyond the rounding tolerance) are not represented here; they
/// abort with a panic.
#[derive(Debug, Error)]
pub enum RewardsError {
    #[error("{0} {1} not found")]
    TargetNotFound(DelegationType, u32),

    #[error("{0} {1} has no rewards ledger")]
    LedgerNotInitialized(DelegationType, u32),

    #[error("rewards plan {0} not found")]
    PlanNotFound(u64),

    #[error("{delegation_type} delegation of {user} to target {target_id} not found")]
    DelegationNotFound {
        delegation_type: DelegationType,
        target_id: u32,
        user: Address,
    },

    #[error("invalid rewards plan: {0}")]
    InvalidPlan(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("no operator commission to withdraw")]
    NoOperatorCommission,

    #[error("no delegation distribution info")]
    EmptyDelegationDistInfo,

    #[error("withdraw address {0} is blocked")]
    BlockedAddress(Address),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{route} invariant broken: {message}")]
    InvariantBroken { route: &'static str, message: String },

    #[error(transparent)]
    Coins(#[from] CoinsError),

    #[error(transparent)]
    External(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RewardsError>;
