//! Trade proposal construction
//!
//! Pairs one incoming (taker) order with one resting (maker) order. The
//! proposal is priced at the maker's price and sized at the smaller of the
//! two remaining amounts.

use types::order::{Order, Side};
use types::trade::TradeProposal;

use super::crossing;

/// Build a proposal, or `None` if the pair is incompatible
pub fn propose(incoming: &Order, resting: &Order) -> Option<TradeProposal> {
    if incoming.asset_id != resting.asset_id
        || incoming.side == resting.side
        || !crossing::incoming_can_match(incoming.side, incoming.price_per_token, resting.price_per_token)
    {
        return None;
    }

    let token_amount = incoming.remaining_amount.min(resting.remaining_amount);
    if token_amount.is_zero() {
        return None;
    }

    let (buy, sell) = match incoming.side {
        Side::Buy => (incoming, resting),
        Side::Sell => (resting, incoming),
    };

    Some(TradeProposal {
        asset_id: incoming.asset_id.clone(),
        buy_order_id: buy.id,
        sell_order_id: sell.id,
        buyer_id: buy.owner_id,
        seller_id: sell.owner_id,
        taker_side: incoming.side,
        token_amount,
        // Maker's price
        price_per_token: resting.price_per_token,
    })
}
