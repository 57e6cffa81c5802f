//! Custodial treasury accounts
//!
//! A treasury holds an asset's unissued token supply. The cached
//! `available_balance` is an optimistic fast path; the ledger balance is the
//! source of truth and overwrites it on reconciliation.

use crate::ids::{AssetId, InvestmentId, LedgerAccountId};
use crate::numeric::Quantity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreasuryStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasuryAccount {
    pub asset_id: AssetId,
    pub ledger_account_id: LedgerAccountId,
    /// Reference to the signing credential in the key store. Never exposed.
    #[serde(skip_serializing, default)]
    pub credential_ref: String,
    pub available_balance: Quantity,
    pub status: TreasuryStatus,
    #[serde(default)]
    pub last_reconciled_at: Option<DateTime<Utc>>,
    /// Investments whose decrement has been applied
    #[serde(default)]
    pub applied_investments: BTreeSet<InvestmentId>,
}

/// Outcome of a keyed treasury decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    Applied { available_balance: Quantity },
    AlreadyApplied,
    Insufficient { available_balance: Quantity },
}

impl TreasuryAccount {
    pub fn new(asset_id: AssetId, ledger_account_id: LedgerAccountId, available_balance: Quantity) -> Self {
        Self {
            asset_id,
            ledger_account_id,
            credential_ref: String::new(),
            available_balance,
            status: TreasuryStatus::Active,
            last_reconciled_at: None,
            applied_investments: BTreeSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TreasuryStatus::Active
    }

    pub fn covers(&self, amount: Quantity) -> bool {
        self.available_balance >= amount
    }

    /// Decrement once per investment id; never below zero
    pub fn decrement(&mut self, amount: Quantity, investment_id: InvestmentId) -> DecrementOutcome {
        if self.applied_investments.contains(&investment_id) {
            return DecrementOutcome::AlreadyApplied;
        }
        match self.available_balance.checked_sub(amount) {
            Some(next) => {
                self.available_balance = next;
                self.applied_investments.insert(investment_id);
                DecrementOutcome::Applied { available_balance: next }
            }
            None => DecrementOutcome::Insufficient {
                available_balance: self.available_balance,
            },
        }
    }
}
