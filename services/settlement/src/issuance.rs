//! Primary issuance
//!
//! Sells newly issued tokens out of an asset's treasury. There is no
//! matching: the investor pays the treasury, then the treasury delivers
//! tokens. All issuance for one asset is serialized on its treasury lock.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};
use types::asset::Asset;
use types::errors::{ExchangeError, SettlementRecordRef, ValidationError};
use types::ids::{AssetId, IdempotencyKey, LedgerAccountId, TxRef, UserId};
use types::investment::Investment;
use types::numeric::{NumericError, Quantity};
use types::trade::{FailureKind, LegFailure, SettlementLeg};
use types::treasury::TreasuryAccount;

use crate::audit::{AuditAction, AuditEmitter, AuditEvent};
use crate::config::EngineConfig;
use crate::ledger::{ensure_associated, LedgerAsset, LedgerError, LedgerGateway, RetryPolicy};
use crate::locks::{AssetLocks, LockScope};
use crate::oracle::{AssetPair, PriceOracle};
use crate::store::Store;
use crate::treasury::TreasuryTracker;

pub struct IssuanceFlow {
    store: Arc<dyn Store>,
    ledger: Arc<dyn LedgerGateway>,
    oracle: Arc<dyn PriceOracle>,
    audit: AuditEmitter,
    treasury: Arc<TreasuryTracker>,
    locks: Arc<AssetLocks>,
    config: EngineConfig,
    retry: RetryPolicy,
}

impl IssuanceFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<dyn LedgerGateway>,
        oracle: Arc<dyn PriceOracle>,
        audit: AuditEmitter,
        treasury: Arc<TreasuryTracker>,
        locks: Arc<AssetLocks>,
        config: EngineConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            oracle,
            audit,
            treasury,
            locks,
            config,
            retry,
        }
    }

    pub async fn execute(
        &self,
        asset_id: &AssetId,
        investor_id: UserId,
        amount_fiat: Decimal,
    ) -> Result<Investment, ExchangeError> {
        if amount_fiat <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveInvestment.into());
        }

        let _guard = self.locks.acquire(asset_id, LockScope::Treasury).await;

        let asset = self.store.get_asset(asset_id).await?;
        if !asset.status.is_investable() {
            return Err(ExchangeError::AssetNotInvestable {
                asset_id: asset_id.clone(),
                status: asset.status.as_str(),
            });
        }

        let treasury = self.store.get_treasury(asset_id).await?;
        if !treasury.is_active() {
            return Err(ExchangeError::TreasuryInactive {
                asset_id: asset_id.clone(),
            });
        }

        self.check_bounds(&asset, amount_fiat)?;

        let tokens = amount_fiat
            .checked_mul(self.config.tokens_per_fiat_unit)
            .ok_or(NumericError::Overflow("token amount"))?;
        let tokens = Quantity::try_new(tokens)?;
        if !self.treasury.reserve_and_check(asset_id, tokens).await? {
            return Err(ExchangeError::InsufficientTreasurySupply {
                requested: tokens.as_decimal(),
                available: treasury.available_balance.as_decimal(),
            });
        }

        let exchange_rate = self.exchange_rate().await?;
        let amount_native = amount_fiat
            .checked_mul(exchange_rate)
            .ok_or(NumericError::Overflow("native amount"))?;

        let investor_account = self.store.ledger_account(investor_id).await?;
        let available = self
            .ledger
            .balance_of(&investor_account, &LedgerAsset::Native)
            .await
            .map_err(|_| ExchangeError::LedgerUnavailable)?;
        if available < amount_native {
            return Err(ExchangeError::InsufficientFunds {
                required: amount_native,
                available,
            });
        }

        let mut investment = Investment::pending(
            asset_id.clone(),
            investor_id,
            amount_fiat,
            tokens,
            amount_native,
            exchange_rate,
            Utc::now(),
        );
        self.store.insert_investment(&investment).await?;
        info!(
            investment_id = %investment.id,
            asset_id = %asset_id,
            %amount_fiat,
            %amount_native,
            %tokens,
            "Primary investment started"
        );

        // Payment leg: investor → treasury
        let payment_tx = match self.payment_leg(&investment, &investor_account, &treasury).await {
            Ok(tx) => tx,
            Err(err) => {
                let kind = err.first_leg_kind();
                if kind == FailureKind::Ambiguous {
                    error!(target: "reconciliation", investment_id = %investment.id, "Investment payment outcome unknown");
                }
                return Err(self.fail(investment, SettlementLeg::Payment, kind, &err).await);
            }
        };
        investment.record_payment(payment_tx.clone()).map_err(invalid_state)?;
        if let Err(err) = self.store.update_investment(&investment).await {
            error!(target: "reconciliation", investment_id = %investment.id, error = %err, "Could not persist payment reference");
        }
        self.emit(&investment, AuditAction::InvestmentPaymentReceived, amount_native, Some(payment_tx))
            .await;

        // Token leg: treasury → investor. Payment is irreversible from here on.
        let token_tx = match self.token_leg(&investment, &asset, &treasury, &investor_account).await {
            Ok(tx) => tx,
            Err(err) => {
                error!(
                    target: "reconciliation",
                    investment_id = %investment.id,
                    payment_tx = ?investment.payment_tx,
                    code = %err.code(),
                    "Token delivery failed after payment executed"
                );
                return Err(self
                    .fail(investment, SettlementLeg::Token, FailureKind::PartialSettlement, &err)
                    .await);
            }
        };

        investment.complete(token_tx.clone(), Utc::now()).map_err(invalid_state)?;
        if let Err(err) = self.store.update_investment(&investment).await {
            error!(target: "reconciliation", investment_id = %investment.id, error = %err, "Could not persist completed investment");
        }

        if let Err(err) = self.treasury.decrement(asset_id, tokens, investment.id).await {
            error!(target: "reconciliation", investment_id = %investment.id, error = %err, "Treasury decrement failed");
        }
        if let Err(err) = self.store.record_funding(asset_id, amount_fiat, tokens).await {
            warn!(asset_id = %asset_id, error = %err, "Could not update funding totals");
        }

        self.emit(&investment, AuditAction::InvestmentTokensDelivered, tokens.as_decimal(), Some(token_tx))
            .await;
        info!(investment_id = %investment.id, "Primary investment completed");
        Ok(investment)
    }

    fn check_bounds(&self, asset: &Asset, amount_fiat: Decimal) -> Result<(), ExchangeError> {
        let min = asset
            .min_investment
            .map_or(self.config.min_investment_floor, |m| m.max(self.config.min_investment_floor));
        let below = amount_fiat < min;
        let above = asset.max_investment.is_some_and(|max| amount_fiat > max);
        if below || above {
            return Err(ValidationError::InvestmentOutOfBounds {
                amount: amount_fiat,
                min,
                max: asset
                    .max_investment
                    .map_or_else(|| "unbounded".to_string(), |m| m.to_string()),
            }
            .into());
        }
        Ok(())
    }

    /// Settlement-currency units per fiat unit
    async fn exchange_rate(&self) -> Result<Decimal, ExchangeError> {
        let pair = AssetPair::new(&self.config.fiat_currency, &self.config.settlement_currency);
        match self.oracle.price(&pair).await {
            Ok(rate) if rate > Decimal::ZERO => Ok(rate),
            Ok(rate) => {
                warn!(%pair, %rate, "Oracle returned a non-positive rate");
                Err(ExchangeError::PriceUnavailable { pair: pair.to_string() })
            }
            Err(err) => {
                warn!(%pair, error = %err, "Price lookup failed");
                Err(ExchangeError::PriceUnavailable { pair: pair.to_string() })
            }
        }
    }

    async fn payment_leg(
        &self,
        investment: &Investment,
        investor_account: &LedgerAccountId,
        treasury: &TreasuryAccount,
    ) -> Result<TxRef, LedgerError> {
        let key = IdempotencyKey::for_investment_leg(&investment.id, "payment");
        let memo = format!("investment {}", investment.id);
        self.retry
            .run("transfer_native", || {
                self.ledger.transfer_native(
                    investor_account,
                    &treasury.ledger_account_id,
                    investment.amount_native,
                    &memo,
                    &key,
                )
            })
            .await
    }

    async fn token_leg(
        &self,
        investment: &Investment,
        asset: &Asset,
        treasury: &TreasuryAccount,
        investor_account: &LedgerAccountId,
    ) -> Result<TxRef, LedgerError> {
        ensure_associated(self.ledger.as_ref(), self.retry, investor_account, &asset.token_id).await?;
        let key = IdempotencyKey::for_investment_leg(&investment.id, "token");
        self.retry
            .run("transfer_token", || {
                self.ledger.transfer_token(
                    &asset.token_id,
                    &treasury.ledger_account_id,
                    investor_account,
                    investment.tokens_purchased,
                    &key,
                )
            })
            .await
    }

    /// Persist the failure and build the error returned to the caller
    async fn fail(&self, mut investment: Investment, leg: SettlementLeg, kind: FailureKind, err: &LedgerError) -> ExchangeError {
        let record = SettlementRecordRef::Investment(investment.id);
        let failure = LegFailure {
            leg,
            kind,
            code: err.code(),
        };
        match investment.fail(failure, Utc::now()) {
            Ok(()) => {
                if let Err(store_err) = self.store.update_investment(&investment).await {
                    error!(target: "reconciliation", investment_id = %investment.id, error = %store_err, "Could not persist failed investment");
                }
            }
            Err(transition) => warn!(investment_id = %investment.id, error = %transition, "Investment already final"),
        }

        let amount = match leg {
            SettlementLeg::Payment => investment.amount_native,
            SettlementLeg::Token => investment.tokens_purchased.as_decimal(),
        };
        self.emit(&investment, AuditAction::InvestmentFailed, amount, None).await;
        warn!(investment_id = %investment.id, ?leg, ?kind, code = %err.code(), "Primary investment failed");

        ExchangeError::LedgerLegFailure { leg, kind, record }
    }

    async fn emit(&self, investment: &Investment, action: AuditAction, amount: Decimal, tx_ref: Option<TxRef>) {
        self.audit
            .emit(AuditEvent::new(
                action,
                SettlementRecordRef::Investment(investment.id),
                investment.asset_id.clone(),
                investment.investor_id,
                amount,
                tx_ref,
            ))
            .await;
    }
}

fn invalid_state(err: impl std::fmt::Display) -> ExchangeError {
    ExchangeError::InvalidState(err.to_string())
}
