//! Matching Engine
//!
//! Price-time priority matching for tokenized-asset order books.
//!
//! **Key Invariants:**
//! - Price-time priority strictly enforced
//! - Execution at the resting (maker) order's price
//! - Fill quantity = min(incoming remaining, resting remaining)
//! - Matching only proposes; settlement is authoritative for fills
//!
//! The engine is synchronous and holds no state between calls. Callers
//! rebuild the [`OrderBook`] from the store before every proposal.

pub mod book;
pub mod matching;
pub mod engine;

pub use book::{BookSnapshot, DepthChart, DepthLevel, OrderBook};
pub use engine::MatchingEngine;
