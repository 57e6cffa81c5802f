//! Primary issuance records

use crate::ids::{AssetId, InvestmentId, TxRef, UserId};
use crate::numeric::Quantity;
use crate::trade::LegFailure;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvestmentTransitionError {
    #[error("investment {0} is already final")]
    AlreadyFinal(InvestmentId),

    #[error("investment {0} cannot complete without both ledger references")]
    MissingLeg(InvestmentId),
}

/// One investor's purchase of newly issued tokens from a treasury
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub asset_id: AssetId,
    pub investor_id: UserId,
    pub amount_fiat: Decimal,
    /// Fixed at creation; never recomputed once settlement begins
    pub tokens_purchased: Quantity,
    /// amount_fiat converted to the settlement currency
    pub amount_native: Decimal,
    /// Settlement-currency units per fiat unit used for the conversion
    pub exchange_rate: Decimal,
    pub status: InvestmentStatus,
    pub payment_tx: Option<TxRef>,
    pub token_tx: Option<TxRef>,
    pub failure: Option<LegFailure>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Investment {
    pub fn pending(
        asset_id: AssetId,
        investor_id: UserId,
        amount_fiat: Decimal,
        tokens_purchased: Quantity,
        amount_native: Decimal,
        exchange_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InvestmentId::new(),
            asset_id,
            investor_id,
            amount_fiat,
            tokens_purchased,
            amount_native,
            exchange_rate,
            status: InvestmentStatus::Pending,
            payment_tx: None,
            token_tx: None,
            failure: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn record_payment(&mut self, tx: TxRef) -> Result<(), InvestmentTransitionError> {
        self.ensure_pending()?;
        self.payment_tx = Some(tx);
        Ok(())
    }

    pub fn complete(&mut self, token_tx: TxRef, now: DateTime<Utc>) -> Result<(), InvestmentTransitionError> {
        self.ensure_pending()?;
        if self.payment_tx.is_none() {
            return Err(InvestmentTransitionError::MissingLeg(self.id));
        }
        self.token_tx = Some(token_tx);
        self.status = InvestmentStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, failure: LegFailure, now: DateTime<Utc>) -> Result<(), InvestmentTransitionError> {
        self.ensure_pending()?;
        self.failure = Some(failure);
        self.status = InvestmentStatus::Failed;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn needs_reconciliation(&self) -> bool {
        self.failure.as_ref().is_some_and(|f| f.kind.needs_reconciliation())
    }

    fn ensure_pending(&self) -> Result<(), InvestmentTransitionError> {
        if self.status != InvestmentStatus::Pending {
            return Err(InvestmentTransitionError::AlreadyFinal(self.id));
        }
        Ok(())
    }
}
