//! Types library for the tokenized-asset exchange
//!
//! Core type definitions shared by the matching engine, the settlement
//! engine and the HTTP gateway.
//!
//! # Modules
//! - `ids`: Unique identifiers (OrderId, TradeId, InvestmentId, UserId, AssetId, ledger refs)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `order`: Order lifecycle types
//! - `trade`: Trade proposals and settlement records
//! - `investment`: Primary issuance records
//! - `asset`: Tokenized asset metadata and funding aggregates
//! - `treasury`: Custodial treasury accounts
//! - `fee`: Platform fee schedule
//! - `errors`: Error taxonomy

pub mod ids;
pub mod numeric;
pub mod order;
pub mod trade;
pub mod investment;
pub mod asset;
pub mod treasury;
pub mod fee;
pub mod errors;

pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::asset::*;
    pub use crate::errors::*;
    pub use crate::fee::*;
    pub use crate::ids::*;
    pub use crate::investment::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::trade::*;
    pub use crate::treasury::*;
}
