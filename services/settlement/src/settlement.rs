//! Two-leg trade settlement
//!
//! A settlement is a saga over an irreversible ledger:
//!
//! 1. Persist the trade as `pending` before any ledger call
//! 2. Check the buyer can cover the payment leg
//! 3. Opt the buyer in to the token, then move tokens seller → buyer
//! 4. Move the seller's proceeds buyer → seller
//! 5. Mark the trade `completed` and apply the fill to both orders
//!
//! A failure before step 3 executes is clean. A failure after the token leg
//! executed is a partial settlement and is raised on the `reconciliation`
//! log target. Ledger text never reaches the trade record; only sanitized
//! codes do.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use types::errors::{ExchangeError, SettlementRecordRef, StoreError};
use types::fee::FeeSchedule;
use types::ids::{IdempotencyKey, LedgerAccountId, OrderId, TokenId, TxRef};
use types::numeric::Quantity;
use types::order::Side;
use types::trade::{FailureKind, LegFailure, SettlementLeg, Trade, TradeProposal};

use crate::audit::{AuditAction, AuditEmitter, AuditEvent};
use crate::ledger::{ensure_associated, LedgerAsset, LedgerGateway, RetryPolicy};
use crate::store::Store;

/// Buyer's native balance does not cover the payment leg
pub const BUYER_INSUFFICIENT_FUNDS: &str = "BUYER_INSUFFICIENT_FUNDS";
/// Buyer's account could not be associated with the token
pub const BUYER_OPT_IN_FAILED: &str = "BUYER_OPT_IN_FAILED";
/// Buyer's balance could not be read before settlement
pub const BUYER_BALANCE_UNAVAILABLE: &str = "BUYER_BALANCE_UNAVAILABLE";

const FILL_ATTEMPTS: usize = 5;

/// A settled (or failed) trade, plus whether both order fills were recorded
#[derive(Debug, Clone)]
pub struct SettlementResult {
    pub trade: Trade,
    pub fills_recorded: bool,
}

/// Which order's owner caused a clean failure, when that can be told
pub fn failing_side(trade: &Trade) -> Option<Side> {
    let failure = trade.failure.as_ref()?;
    if failure.kind != FailureKind::Clean {
        return None;
    }
    match (failure.leg, failure.code.as_str()) {
        (_, BUYER_INSUFFICIENT_FUNDS | BUYER_OPT_IN_FAILED | BUYER_BALANCE_UNAVAILABLE) => Some(Side::Buy),
        (SettlementLeg::Token, "LEDGER_INSUFFICIENT_BALANCE") => Some(Side::Sell),
        _ => None,
    }
}

struct Parties {
    token_id: TokenId,
    buyer: LedgerAccountId,
    seller: LedgerAccountId,
}

pub struct SettlementEngine {
    store: Arc<dyn Store>,
    ledger: Arc<dyn LedgerGateway>,
    audit: AuditEmitter,
    fees: FeeSchedule,
    retry: RetryPolicy,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<dyn LedgerGateway>,
        audit: AuditEmitter,
        fees: FeeSchedule,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            audit,
            fees,
            retry,
        }
    }

    /// Settle one proposal. Ledger outcomes, including failures, are on the
    /// returned trade; `Err` is reserved for store and lookup failures.
    pub async fn settle(&self, proposal: &TradeProposal) -> Result<SettlementResult, ExchangeError> {
        let parties = self.resolve_parties(proposal).await?;
        let mut trade = Trade::pending(proposal, &self.fees, Utc::now())?;
        self.store.insert_trade(&trade).await?;

        info!(
            trade_id = %trade.id,
            asset_id = %trade.asset_id,
            quantity = %trade.token_amount,
            price = %trade.price_per_token,
            total = %trade.total_price,
            fee = %trade.platform_fee,
            "Settling trade"
        );

        if let Some(failure) = self.preflight(&trade, &parties).await {
            return self.fail(trade, failure).await;
        }

        // Token leg
        let token_tx = match self.token_leg(&trade, &parties).await {
            Ok(tx) => tx,
            Err(failure) => return self.fail(trade, failure).await,
        };
        trade.record_token_leg(token_tx).map_err(invalid_state)?;
        if let Err(err) = self.store.update_trade(&trade).await {
            error!(target: "reconciliation", trade_id = %trade.id, error = %err, "Could not persist token leg reference");
        }

        // Payment leg. The token leg is irreversible from here on.
        let key = IdempotencyKey::for_trade_leg(&trade.id, "payment");
        let memo = format!("trade {}", trade.id);
        let proceeds = trade.seller_proceeds();
        let payment = self
            .retry
            .run("transfer_native", || {
                self.ledger
                    .transfer_native(&parties.buyer, &parties.seller, proceeds, &memo, &key)
            })
            .await;
        let payment_tx = match payment {
            Ok(tx) => tx,
            Err(err) => {
                error!(
                    target: "reconciliation",
                    trade_id = %trade.id,
                    token_tx = ?trade.token_tx,
                    code = %err.code(),
                    "Payment leg failed after token leg executed"
                );
                let failure = LegFailure {
                    leg: SettlementLeg::Payment,
                    kind: FailureKind::PartialSettlement,
                    code: err.code(),
                };
                return self.fail(trade, failure).await;
            }
        };

        trade.complete(payment_tx.clone(), Utc::now()).map_err(invalid_state)?;
        if let Err(err) = self.store.update_trade(&trade).await {
            error!(target: "reconciliation", trade_id = %trade.id, error = %err, "Could not persist completed trade");
        }

        let buy_filled = self.record_fill(trade.buy_order_id, trade.token_amount).await;
        let sell_filled = self.record_fill(trade.sell_order_id, trade.token_amount).await;

        info!(trade_id = %trade.id, payment_tx = %payment_tx, "Trade completed");
        self.audit
            .emit(AuditEvent::new(
                AuditAction::TradeSettled,
                SettlementRecordRef::Trade(trade.id),
                trade.asset_id.clone(),
                trade.buyer_id,
                trade.total_price,
                Some(payment_tx),
            ))
            .await;

        Ok(SettlementResult {
            trade,
            fills_recorded: buy_filled && sell_filled,
        })
    }

    async fn resolve_parties(&self, proposal: &TradeProposal) -> Result<Parties, ExchangeError> {
        let asset = self.store.get_asset(&proposal.asset_id).await?;
        let buyer = self.store.ledger_account(proposal.buyer_id).await?;
        let seller = self.store.ledger_account(proposal.seller_id).await?;
        Ok(Parties {
            token_id: asset.token_id,
            buyer,
            seller,
        })
    }

    /// Fail cleanly now rather than partially after the token leg
    async fn preflight(&self, trade: &Trade, parties: &Parties) -> Option<LegFailure> {
        let code = match self.ledger.balance_of(&parties.buyer, &LedgerAsset::Native).await {
            Ok(balance) if balance >= trade.seller_proceeds() => return None,
            Ok(balance) => {
                debug!(trade_id = %trade.id, %balance, required = %trade.seller_proceeds(), "Buyer cannot cover payment");
                BUYER_INSUFFICIENT_FUNDS
            }
            Err(err) => {
                warn!(trade_id = %trade.id, code = %err.code(), "Buyer balance query failed");
                BUYER_BALANCE_UNAVAILABLE
            }
        };
        Some(LegFailure {
            leg: SettlementLeg::Payment,
            kind: FailureKind::Clean,
            code: code.to_string(),
        })
    }

    async fn token_leg(&self, trade: &Trade, parties: &Parties) -> Result<TxRef, LegFailure> {
        if let Err(err) = ensure_associated(self.ledger.as_ref(), self.retry, &parties.buyer, &parties.token_id).await {
            warn!(trade_id = %trade.id, code = %err.code(), "Buyer opt-in failed");
            return Err(LegFailure {
                leg: SettlementLeg::Token,
                kind: FailureKind::Clean,
                code: BUYER_OPT_IN_FAILED.to_string(),
            });
        }

        let key = IdempotencyKey::for_trade_leg(&trade.id, "token");
        self.retry
            .run("transfer_token", || {
                self.ledger
                    .transfer_token(&parties.token_id, &parties.seller, &parties.buyer, trade.token_amount, &key)
            })
            .await
            .map_err(|err| {
                let kind = err.first_leg_kind();
                if kind == FailureKind::Ambiguous {
                    error!(target: "reconciliation", trade_id = %trade.id, "Token leg outcome unknown");
                } else {
                    warn!(trade_id = %trade.id, code = %err.code(), "Token leg failed");
                }
                LegFailure {
                    leg: SettlementLeg::Token,
                    kind,
                    code: err.code(),
                }
            })
    }

    async fn fail(&self, mut trade: Trade, failure: LegFailure) -> Result<SettlementResult, ExchangeError> {
        let code = failure.code.clone();
        trade.fail(failure, Utc::now()).map_err(invalid_state)?;
        self.store.update_trade(&trade).await?;

        self.audit
            .emit(AuditEvent::new(
                AuditAction::TradeFailed,
                SettlementRecordRef::Trade(trade.id),
                trade.asset_id.clone(),
                trade.buyer_id,
                trade.total_price,
                trade.token_tx.clone(),
            ))
            .await;
        info!(trade_id = %trade.id, code = %code, "Trade failed");

        Ok(SettlementResult {
            trade,
            fills_recorded: false,
        })
    }

    /// Apply a settled fill with compare-and-set, re-reading on conflict
    async fn record_fill(&self, order_id: OrderId, quantity: Quantity) -> bool {
        for _ in 0..FILL_ATTEMPTS {
            let mut order = match self.store.get_order(order_id).await {
                Ok(order) => order,
                Err(err) => {
                    error!(target: "reconciliation", order_id = %order_id, error = %err, "Settled fill on unreadable order");
                    return false;
                }
            };
            let expected_version = order.version;
            if let Err(err) = order.apply_fill(quantity, Utc::now()) {
                error!(target: "reconciliation", order_id = %order_id, error = %err, "Settled fill rejected by order");
                return false;
            }
            match self.store.update_order(&order, expected_version).await {
                Ok(()) => return true,
                Err(StoreError::VersionConflict { .. }) => {
                    debug!(order_id = %order_id, "Order changed during fill, retrying");
                }
                Err(err) => {
                    error!(target: "reconciliation", order_id = %order_id, error = %err, "Could not persist fill");
                    return false;
                }
            }
        }
        error!(target: "reconciliation", order_id = %order_id, "Fill kept conflicting, giving up");
        false
    }
}

fn invalid_state(err: impl std::fmt::Display) -> ExchangeError {
    ExchangeError::InvalidState(err.to_string())
}
