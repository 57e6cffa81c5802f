//! Trade proposals and settlement records
//!
//! The matching engine produces a [`TradeProposal`]; the settlement engine
//! turns it into a [`Trade`] record in `Pending` status before touching the
//! ledger, then moves it exactly once to `Completed` or `Failed`.

use crate::fee::FeeSchedule;
use crate::ids::{AssetId, OrderId, TradeId, TxRef, UserId};
use crate::numeric::{NumericError, Price, Quantity};
use crate::order::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A matched pair awaiting settlement. Always priced at the maker's price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub asset_id: AssetId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// Side of the incoming order that triggered the match
    pub taker_side: Side,
    pub token_amount: Quantity,
    pub price_per_token: Price,
}

impl TradeProposal {
    /// The resting order's id
    pub fn maker_order_id(&self) -> OrderId {
        match self.taker_side {
            Side::Buy => self.sell_order_id,
            Side::Sell => self.buy_order_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Completed,
    Failed,
}

/// Ledger leg of a two-leg settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementLeg {
    /// Token transfer (including the receiver's opt-in)
    Token,
    /// Settlement-currency transfer
    Payment,
}

/// How far a failed settlement got before failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Nothing executed on the ledger
    Clean,
    /// The first leg executed, the second did not
    PartialSettlement,
    /// The ledger did not acknowledge; the leg may or may not have executed
    Ambiguous,
}

impl FailureKind {
    pub fn needs_reconciliation(&self) -> bool {
        !matches!(self, FailureKind::Clean)
    }
}

/// Which leg failed and how. `code` is a sanitized reason, never raw ledger text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFailure {
    pub leg: SettlementLeg,
    pub kind: FailureKind,
    pub code: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradeTransitionError {
    #[error("trade {0} is already final")]
    AlreadyFinal(TradeId),

    #[error("trade {0} cannot complete without a token leg reference")]
    MissingTokenLeg(TradeId),
}

/// Settlement record for one matched exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub asset_id: AssetId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub taker_side: Side,
    pub token_amount: Quantity,
    pub price_per_token: Price,
    pub total_price: Decimal,
    pub platform_fee: Decimal,
    pub status: TradeStatus,
    pub token_tx: Option<TxRef>,
    pub payment_tx: Option<TxRef>,
    pub failure: Option<LegFailure>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Trade {
    /// Create the pending record for a proposal. Fails if the total or fee
    /// does not fit in a `Decimal`.
    pub fn pending(proposal: &TradeProposal, fees: &FeeSchedule, now: DateTime<Utc>) -> Result<Self, NumericError> {
        let total_price = proposal.token_amount.notional(proposal.price_per_token)?;
        let platform_fee = fees.platform_fee(total_price)?;
        Ok(Self {
            id: TradeId::new(),
            asset_id: proposal.asset_id.clone(),
            buy_order_id: proposal.buy_order_id,
            sell_order_id: proposal.sell_order_id,
            buyer_id: proposal.buyer_id,
            seller_id: proposal.seller_id,
            taker_side: proposal.taker_side,
            token_amount: proposal.token_amount,
            price_per_token: proposal.price_per_token,
            total_price,
            platform_fee,
            status: TradeStatus::Pending,
            token_tx: None,
            payment_tx: None,
            failure: None,
            created_at: now,
            settled_at: None,
        })
    }

    /// Net amount the seller receives on the payment leg
    pub fn seller_proceeds(&self) -> Decimal {
        self.total_price - self.platform_fee
    }

    pub fn record_token_leg(&mut self, tx: TxRef) -> Result<(), TradeTransitionError> {
        self.ensure_pending()?;
        self.token_tx = Some(tx);
        Ok(())
    }

    pub fn complete(&mut self, payment_tx: TxRef, now: DateTime<Utc>) -> Result<(), TradeTransitionError> {
        self.ensure_pending()?;
        if self.token_tx.is_none() {
            return Err(TradeTransitionError::MissingTokenLeg(self.id));
        }
        self.payment_tx = Some(payment_tx);
        self.status = TradeStatus::Completed;
        self.settled_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, failure: LegFailure, now: DateTime<Utc>) -> Result<(), TradeTransitionError> {
        self.ensure_pending()?;
        self.failure = Some(failure);
        self.status = TradeStatus::Failed;
        self.settled_at = Some(now);
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.status == TradeStatus::Completed
    }

    pub fn needs_reconciliation(&self) -> bool {
        self.failure.as_ref().is_some_and(|f| f.kind.needs_reconciliation())
    }

    /// The resting order's id
    pub fn maker_order_id(&self) -> OrderId {
        match self.taker_side {
            Side::Buy => self.sell_order_id,
            Side::Sell => self.buy_order_id,
        }
    }

    fn ensure_pending(&self) -> Result<(), TradeTransitionError> {
        if self.status != TradeStatus::Pending {
            return Err(TradeTransitionError::AlreadyFinal(self.id));
        }
        Ok(())
    }
}
