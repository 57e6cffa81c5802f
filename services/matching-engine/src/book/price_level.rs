//! Price level implementation with FIFO queue
//!
//! A price level contains all resting orders at a specific price point,
//! kept in time priority (earlier `created_at` first, store sequence as the
//! final tie-break).

use std::collections::VecDeque;
use types::numeric::{Price, Quantity};
use types::order::Order;

#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    /// Orders at this price level (FIFO order)
    orders: VecDeque<Order>,
    /// Total remaining quantity at this level
    total_quantity: Quantity,
    /// Remaining quantity of public orders only
    visible_quantity: Quantity,
    visible_count: usize,
}

impl PriceLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_quantity: Quantity::zero(),
            visible_quantity: Quantity::zero(),
            visible_count: 0,
        }
    }

    /// Insert an order, keeping time priority
    pub fn insert(&mut self, order: Order) {
        self.total_quantity = self.total_quantity + order.remaining_amount;
        if order.is_public {
            self.visible_quantity = self.visible_quantity + order.remaining_amount;
            self.visible_count += 1;
        }

        let key = priority_key(&order);
        // Orders mostly arrive already sorted, so scan from the back
        let position = self
            .orders
            .iter()
            .rposition(|resting| priority_key(resting) <= key)
            .map_or(0, |idx| idx + 1);
        self.orders.insert(position, order);
    }

    pub fn price(&self) -> Price {
        self.price
    }

    /// Orders in time priority
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn visible_quantity(&self) -> Quantity {
        self.visible_quantity
    }

    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

fn priority_key(order: &Order) -> (chrono::DateTime<chrono::Utc>, u64) {
    (order.created_at, order.sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::str::FromStr;
    use types::ids::{AssetId, UserId};
    use types::order::Side;

    fn order(qty: u64, sequence: u64, offset_ms: i64, public: bool) -> Order {
        let base = Utc::now();
        let mut order = Order::open(
            AssetId::new("PROP-001"),
            Side::Sell,
            UserId::new(),
            Quantity::from_u64(qty),
            Price::from_str("10").unwrap(),
            "HBAR",
            None,
            public,
            base + Duration::milliseconds(offset_ms),
        );
        order.sequence = sequence;
        order
    }

    #[test]
    fn test_price_level_insert() {
        let mut level = PriceLevel::new(Price::from_u64(10));
        level.insert(order(15, 1, 0, true));

        assert_eq!(level.order_count(), 1);
        assert_eq!(level.total_quantity(), Quantity::from_u64(15));
    }

    #[test]
    fn test_price_level_fifo_order() {
        let mut level = PriceLevel::new(Price::from_u64(10));
        let late = order(1, 3, 20, true);
        let early = order(2, 1, 0, true);
        let middle = order(3, 2, 10, true);
        let early_id = early.id;

        level.insert(late);
        level.insert(early);
        level.insert(middle);

        assert_eq!(level.orders().next().unwrap().id, early_id);
        let quantities: Vec<_> = level.orders().map(|o| o.remaining_amount).collect();
        assert_eq!(
            quantities,
            vec![Quantity::from_u64(2), Quantity::from_u64(3), Quantity::from_u64(1)]
        );
    }

    #[test]
    fn test_sequence_breaks_timestamp_ties() {
        let mut level = PriceLevel::new(Price::from_u64(10));
        let second = order(1, 8, 0, true);
        let mut first = order(1, 7, 0, true);
        first.created_at = second.created_at;
        let first_id = first.id;

        level.insert(second);
        level.insert(first);

        assert_eq!(level.orders().next().unwrap().id, first_id);
    }

    #[test]
    fn test_hidden_orders_excluded_from_visible_totals() {
        let mut level = PriceLevel::new(Price::from_u64(10));
        level.insert(order(5, 1, 0, true));
        level.insert(order(7, 2, 1, false));

        assert_eq!(level.total_quantity(), Quantity::from_u64(12));
        assert_eq!(level.visible_quantity(), Quantity::from_u64(5));
        assert_eq!(level.visible_count(), 1);
    }
}
