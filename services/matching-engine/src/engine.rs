//! Matching engine core
//!
//! Scans the opposite side of a freshly read book in price-time priority and
//! proposes the next trade for an incoming order. It never mutates orders:
//! the caller settles the proposal, re-reads the store, and asks again.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use types::ids::OrderId;
use types::order::Order;
use types::trade::TradeProposal;

use crate::book::OrderBook;
use crate::matching::{crossing, proposal};

/// Stateless matcher. An owner's own resting orders are never matched
/// against their incoming order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingEngine;

impl MatchingEngine {
    /// Next proposal for `incoming` against `book`, or `None` when the
    /// incoming order is exhausted or nothing compatible rests.
    ///
    /// `excluded` holds resting orders whose settlement already failed in
    /// this pass; resting orders expired at `now` are passed over as well.
    pub fn next_proposal(
        &self,
        incoming: &Order,
        book: &OrderBook,
        excluded: &HashSet<OrderId>,
        now: DateTime<Utc>,
    ) -> Option<TradeProposal> {
        if !incoming.status.is_active() || incoming.remaining_amount.is_zero() || incoming.is_expired_at(now) {
            return None;
        }
        if &incoming.asset_id != book.asset_id() {
            return None;
        }

        for resting in book.side_in_priority(incoming.side.opposite()) {
            // Sorted by price, so the first non-crossing order ends the scan
            if !crossing::incoming_can_match(incoming.side, incoming.price_per_token, resting.price_per_token) {
                break;
            }
            if resting.id == incoming.id
                || excluded.contains(&resting.id)
                || resting.is_expired_at(now)
                || resting.owner_id == incoming.owner_id
            {
                continue;
            }
            if let Some(proposal) = proposal::propose(incoming, resting) {
                return Some(proposal);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;
    use types::ids::{AssetId, UserId};
    use types::numeric::{Price, Quantity};
    use types::order::Side;

    fn create_order(owner: UserId, side: Side, price: &str, qty: u64, sequence: u64) -> Order {
        let mut order = Order::open(
            AssetId::new("PROP-001"),
            side,
            owner,
            Quantity::from_u64(qty),
            Price::from_str(price).unwrap(),
            "HBAR",
            None,
            true,
            Utc::now(),
        );
        order.sequence = sequence;
        order
    }

    fn book(orders: Vec<Order>) -> OrderBook {
        OrderBook::from_orders(AssetId::new("PROP-001"), orders)
    }

    #[test]
    fn test_no_match_on_empty_book() {
        let engine = MatchingEngine::default();
        let incoming = create_order(UserId::new(), Side::Buy, "10", 1, 1);
        assert!(engine.next_proposal(&incoming, &book(vec![]), &HashSet::new(), Utc::now()).is_none());
    }

    #[test]
    fn test_best_price_first() {
        let engine = MatchingEngine::default();
        let cheap = create_order(UserId::new(), Side::Sell, "9", 1, 2);
        let dear = create_order(UserId::new(), Side::Sell, "10", 1, 1);
        let cheap_id = cheap.id;
        let incoming = create_order(UserId::new(), Side::Buy, "12", 5, 3);

        let proposal = engine
            .next_proposal(&incoming, &book(vec![dear, cheap]), &HashSet::new(), Utc::now())
            .unwrap();
        assert_eq!(proposal.sell_order_id, cheap_id);
        assert_eq!(proposal.price_per_token, Price::from_u64(9));
    }

    #[test]
    fn test_earlier_order_wins_at_same_price() {
        let engine = MatchingEngine::default();
        let first = create_order(UserId::new(), Side::Sell, "10", 1, 1);
        let mut second = create_order(UserId::new(), Side::Sell, "10", 1, 2);
        second.created_at = first.created_at + Duration::milliseconds(5);
        let first_id = first.id;
        let incoming = create_order(UserId::new(), Side::Buy, "10", 1, 3);

        let proposal = engine
            .next_proposal(&incoming, &book(vec![second, first]), &HashSet::new(), Utc::now())
            .unwrap();
        assert_eq!(proposal.sell_order_id, first_id);
    }

    #[test]
    fn test_self_trade_skipped() {
        let engine = MatchingEngine::default();
        let owner = UserId::new();
        let own = create_order(owner, Side::Sell, "10", 1, 1);
        let other = create_order(UserId::new(), Side::Sell, "10", 1, 2);
        let other_id = other.id;
        let incoming = create_order(owner, Side::Buy, "10", 1, 3);

        let proposal = engine
            .next_proposal(&incoming, &book(vec![own, other]), &HashSet::new(), Utc::now())
            .unwrap();
        assert_eq!(proposal.sell_order_id, other_id);
    }

    #[test]
    fn test_excluded_and_expired_orders_skipped() {
        let engine = MatchingEngine::default();
        let failed = create_order(UserId::new(), Side::Sell, "9", 1, 1);
        let mut stale = create_order(UserId::new(), Side::Sell, "9.5", 1, 2);
        stale.expires_at = Some(Utc::now() - Duration::seconds(1));
        let live = create_order(UserId::new(), Side::Sell, "10", 1, 3);
        let live_id = live.id;
        let excluded: HashSet<_> = [failed.id].into_iter().collect();
        let incoming = create_order(UserId::new(), Side::Buy, "10", 1, 4);

        let proposal = engine
            .next_proposal(&incoming, &book(vec![failed, stale, live]), &excluded, Utc::now())
            .unwrap();
        assert_eq!(proposal.sell_order_id, live_id);
    }

    #[test]
    fn test_stops_at_first_non_crossing_level() {
        let engine = MatchingEngine::default();
        let resting = create_order(UserId::new(), Side::Buy, "8", 10, 1);
        let incoming = create_order(UserId::new(), Side::Sell, "9", 1, 2);
        assert!(engine
            .next_proposal(&incoming, &book(vec![resting]), &HashSet::new(), Utc::now())
            .is_none());
    }

    #[test]
    fn test_filled_incoming_proposes_nothing() {
        let engine = MatchingEngine::default();
        let resting = create_order(UserId::new(), Side::Sell, "10", 10, 1);
        let mut incoming = create_order(UserId::new(), Side::Buy, "10", 1, 2);
        incoming.apply_fill(Quantity::from_u64(1), Utc::now()).unwrap();
        assert!(engine
            .next_proposal(&incoming, &book(vec![resting]), &HashSet::new(), Utc::now())
            .is_none());
    }
}
