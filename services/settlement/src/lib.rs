//! Settlement Service
//!
//! Executes matched trades and primary investments against an external
//! ledger, and exposes the exchange's public operations through
//! [`Exchange`].
//!
//! **Key Invariants:**
//! - A trade or investment record exists before its first ledger call
//! - Every ledger mutation carries an idempotency key derived from the record id and leg
//! - Only calls the ledger verified as not executed are retried
//! - A failure after the first leg executed is recorded as partial and never retried
//! - Order books and treasuries are serialized per asset, never globally

pub mod audit;
pub mod config;
pub mod exchange;
pub mod issuance;
pub mod ledger;
pub mod locks;
pub mod oracle;
pub mod settlement;
pub mod store;
pub mod treasury;

pub use config::EngineConfig;
pub use exchange::{Exchange, Placement, ReconciliationCases};
