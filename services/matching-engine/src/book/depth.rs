//! Depth-chart aggregation

use serde::{Deserialize, Serialize};
use types::numeric::{Price, Quantity};

use super::price_level::PriceLevel;

/// One price level of the public depth chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    /// Visible remaining quantity at this price
    pub quantity: Quantity,
    /// Running total from the best price up to and including this level
    pub cumulative_quantity: Quantity,
    pub order_count: usize,
}

/// Both sides of the depth chart, best price first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepthChart {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// Fold levels given best-first into cumulative depth, hidden volume excluded
pub(crate) fn cumulative_levels<'a>(levels: impl Iterator<Item = &'a PriceLevel>) -> Vec<DepthLevel> {
    let mut cumulative = Quantity::zero();
    levels
        .filter(|level| level.visible_count() > 0)
        .map(|level| {
            cumulative = cumulative + level.visible_quantity();
            DepthLevel {
                price: level.price(),
                quantity: level.visible_quantity(),
                cumulative_quantity: cumulative,
                order_count: level.visible_count(),
            }
        })
        .collect()
}
