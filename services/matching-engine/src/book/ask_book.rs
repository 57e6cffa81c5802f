//! Ask (sell-side) order book
//!
//! Maintains sell orders sorted by price ascending (best ask first).
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use types::numeric::Price;
use types::order::Order;

use super::depth::{cumulative_levels, DepthLevel};
use super::price_level::PriceLevel;

#[derive(Debug, Clone, Default)]
pub struct AskBook {
    /// Price levels sorted ascending (lowest price first)
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: Order) {
        self.levels
            .entry(order.price_per_token)
            .or_insert_with(|| PriceLevel::new(order.price_per_token))
            .insert(order);
    }

    /// All resting asks in matching priority: price ascending, then time
    pub fn iter_priority(&self) -> impl Iterator<Item = &Order> {
        self.levels.values().flat_map(|level| level.orders())
    }

    /// Public depth, best price first
    pub fn depth(&self) -> Vec<DepthLevel> {
        cumulative_levels(self.levels.values())
    }
}
