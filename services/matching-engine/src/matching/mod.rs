//! Matching logic module
//!
//! Implements price-time priority crossing and proposal construction

pub mod crossing;
pub mod proposal;

pub use crossing::can_match;
pub use proposal::propose;
