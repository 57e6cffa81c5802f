//! Order book views
//!
//! An [`OrderBook`] is built from a fresh read of the store's active orders
//! for one asset. It is a snapshot: the matcher never carries one across a
//! trade boundary.

pub mod price_level;
pub mod bid_book;
pub mod ask_book;
pub mod depth;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use depth::{DepthChart, DepthLevel};
pub use price_level::PriceLevel;

use types::ids::AssetId;
use types::order::{Order, Side};

#[derive(Debug, Clone)]
pub struct OrderBook {
    asset_id: AssetId,
    bids: BidBook,
    asks: AskBook,
}

impl OrderBook {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            bids: BidBook::new(),
            asks: AskBook::new(),
        }
    }

    /// Build from store rows. Orders for other assets, terminal orders and
    /// orders with nothing remaining are ignored.
    pub fn from_orders(asset_id: AssetId, orders: impl IntoIterator<Item = Order>) -> Self {
        let mut book = Self::new(asset_id);
        for order in orders {
            book.insert(order);
        }
        book
    }

    pub fn insert(&mut self, order: Order) {
        if order.asset_id != self.asset_id
            || !order.status.is_active()
            || order.remaining_amount.is_zero()
        {
            return;
        }
        match order.side {
            Side::Buy => self.bids.insert(order),
            Side::Sell => self.asks.insert(order),
        }
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    pub fn bids(&self) -> &BidBook {
        &self.bids
    }

    pub fn asks(&self) -> &AskBook {
        &self.asks
    }

    /// Resting orders on `side` in matching priority
    pub fn side_in_priority(&self, side: Side) -> Box<dyn Iterator<Item = &Order> + '_> {
        match side {
            Side::Buy => Box::new(self.bids.iter_priority()),
            Side::Sell => Box::new(self.asks.iter_priority()),
        }
    }

    /// Bids then asks as flat lists in priority order
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            asset_id: self.asset_id.clone(),
            bids: self.bids.iter_priority().cloned().collect(),
            asks: self.asks.iter_priority().cloned().collect(),
        }
    }

    pub fn depth(&self) -> DepthChart {
        DepthChart {
            bids: self.bids.depth(),
            asks: self.asks.depth(),
        }
    }
}

/// Sorted book as returned to callers
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BookSnapshot {
    pub asset_id: AssetId,
    pub bids: Vec<Order>,
    pub asks: Vec<Order>,
}
