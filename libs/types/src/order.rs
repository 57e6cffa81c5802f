//! Order lifecycle types
//!
//! An order is a resting intent to buy or sell a fixed quantity of one
//! asset's tokens at a limit price. Orders are never deleted; they end in
//! one of the terminal states.

use crate::ids::{AssetId, OrderId, UserId};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order status
///
/// Legal transitions: `Open → PartiallyFilled → Filled`, and
/// `Open | PartiallyFilled → Cancelled | Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired)
    }

    /// Open or partially filled: eligible for matching and cancellation
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Open, PartiallyFilled)
                | (Open, Filled)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (Open | PartiallyFilled, Cancelled | Expired)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderTransitionError {
    #[error("fill of {requested} exceeds remaining {remaining}")]
    Overfill { requested: Quantity, remaining: Quantity },

    #[error("fill quantity must be positive")]
    EmptyFill,

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: &'static str, to: &'static str },
}

/// Client request to place an order, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub asset_id: AssetId,
    pub side: Side,
    pub owner_id: UserId,
    pub token_amount: rust_decimal::Decimal,
    pub price_per_token: rust_decimal::Decimal,
    pub currency: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

/// Complete order record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub asset_id: AssetId,
    pub side: Side,
    pub owner_id: UserId,
    pub token_amount: Quantity,
    pub price_per_token: Price,
    pub currency: String,
    pub status: OrderStatus,
    pub filled_amount: Quantity,
    pub remaining_amount: Quantity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_public: bool,
    /// Store-assigned insertion counter, final time-priority tie-break
    pub sequence: u64,
    /// Optimistic locking
    pub version: u64,
}

impl Order {
    /// Create a new open order
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        asset_id: AssetId,
        side: Side,
        owner_id: UserId,
        token_amount: Quantity,
        price_per_token: Price,
        currency: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        is_public: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            asset_id,
            side,
            owner_id,
            token_amount,
            price_per_token,
            currency: currency.into(),
            status: OrderStatus::Open,
            filled_amount: Quantity::zero(),
            remaining_amount: token_amount,
            created_at: now,
            updated_at: now,
            expires_at,
            is_public,
            sequence: 0,
            version: 0,
        }
    }

    /// Check quantity invariant: filled + remaining = total
    pub fn check_invariant(&self) -> bool {
        self.filled_amount + self.remaining_amount == self.token_amount
    }

    pub fn is_filled(&self) -> bool {
        self.remaining_amount.is_zero()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Apply a settled fill and advance the status
    pub fn apply_fill(&mut self, quantity: Quantity, now: DateTime<Utc>) -> Result<(), OrderTransitionError> {
        if quantity.is_zero() {
            return Err(OrderTransitionError::EmptyFill);
        }
        let remaining = self.remaining_amount.checked_sub(quantity).ok_or(
            OrderTransitionError::Overfill {
                requested: quantity,
                remaining: self.remaining_amount,
            },
        )?;
        let next = if remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.transition(next)?;

        self.filled_amount = self.filled_amount + quantity;
        self.remaining_amount = remaining;
        self.updated_at = now;
        self.version += 1;
        debug_assert!(self.check_invariant(), "invariant violated after fill");
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), OrderTransitionError> {
        self.transition(OrderStatus::Cancelled)?;
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), OrderTransitionError> {
        self.transition(OrderStatus::Expired)?;
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    fn transition(&mut self, next: OrderStatus) -> Result<(), OrderTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderTransitionError::IllegalTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn create_order(side: Side, qty: u64) -> Order {
        Order::open(
            AssetId::new("PROP-001"),
            side,
            UserId::new(),
            Quantity::from_u64(qty),
            Price::from_str("10.00").unwrap(),
            "HBAR",
            None,
            true,
            Utc::now(),
        )
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_order_creation() {
        let order = create_order(Side::Buy, 100);
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.remaining_amount, Quantity::from_u64(100));
        assert!(order.check_invariant());
    }

    #[test]
    fn test_order_fill() {
        let mut order = create_order(Side::Buy, 100);

        order.apply_fill(Quantity::from_u64(60), Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining_amount, Quantity::from_u64(40));
        assert!(order.check_invariant());

        order.apply_fill(Quantity::from_u64(40), Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_filled());
        assert_eq!(order.version, 2);
    }

    #[test]
    fn test_order_overfill_rejected() {
        let mut order = create_order(Side::Sell, 10);
        let err = order.apply_fill(Quantity::from_u64(11), Utc::now()).unwrap_err();
        assert!(matches!(err, OrderTransitionError::Overfill { .. }));
        assert_eq!(order.filled_amount, Quantity::zero());
    }

    #[test]
    fn test_cancel_terminal_rejected() {
        let mut order = create_order(Side::Buy, 1);
        order.apply_fill(Quantity::from_u64(1), Utc::now()).unwrap();
        assert!(order.cancel(Utc::now()).is_err());
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_cancelled_order_cannot_fill() {
        let mut order = create_order(Side::Buy, 5);
        order.cancel(Utc::now()).unwrap();
        assert!(order.apply_fill(Quantity::from_u64(1), Utc::now()).is_err());
    }

    #[test]
    fn test_status_never_moves_backward() {
        assert!(!OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Open));
        assert!(!OrderStatus::Filled.can_transition_to(OrderStatus::PartiallyFilled));
        assert!(!OrderStatus::Expired.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_order_serialization() {
        let order = create_order(Side::Sell, 25);
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("\"side\":\"sell\""));
        let deserialized: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, deserialized);
    }

    proptest! {
        #[test]
        fn prop_fills_preserve_invariant(total in 1u64..10_000, fills in proptest::collection::vec(1u64..500, 0..40)) {
            let mut order = create_order(Side::Buy, total);
            for fill in fills {
                let before = order.filled_amount;
                let _ = order.apply_fill(Quantity::from_u64(fill), Utc::now());
                prop_assert!(order.check_invariant());
                prop_assert!(order.filled_amount >= before);
            }
        }
    }
}
