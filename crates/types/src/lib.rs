//! Shared primitives for the restaking rewards engine.
//!
//! Addresses, integer and decimal coin sets, the per-denom reward
//! accumulators, and read-only views of the delegation targets that receive
//! stake.

pub mod address;
pub mod coins;
pub mod dec;
pub mod dec_pools;
pub mod delegation;
pub mod targets;

pub use address::*;
pub use coins::*;
pub use dec::*;
pub use dec_pools::*;
pub use delegation::*;
pub use targets::*;

pub use rust_decimal::Decimal;
