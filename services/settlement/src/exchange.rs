//! Exchange facade
//!
//! The public operations of the market: order placement with immediate
//! matching, cancellation, book and trade queries, primary investment,
//! order expiry and reconciliation.

use chrono::{DateTime, Utc};
use matching_engine::{BookSnapshot, DepthChart, MatchingEngine, OrderBook};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::errors::{ExchangeError, ValidationError};
use types::ids::{AssetId, OrderId, UserId};
use types::investment::Investment;
use types::numeric::{Price, Quantity};
use types::order::{NewOrder, Order, Side};
use types::trade::Trade;
use types::treasury::TreasuryAccount;

use crate::audit::{AuditEmitter, AuditLog};
use crate::config::EngineConfig;
use crate::issuance::IssuanceFlow;
use crate::ledger::{LedgerAsset, LedgerGateway, RetryPolicy};
use crate::locks::{AssetLocks, LockScope};
use crate::oracle::PriceOracle;
use crate::settlement::{failing_side, SettlementEngine};
use crate::store::Store;
use crate::treasury::TreasuryTracker;

/// Outcome of placing an order
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    /// The order as stored after matching
    pub order: Order,
    /// Every trade attempted for it, completed or failed
    pub trades: Vec<Trade>,
}

/// Settlements waiting on an operator
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationCases {
    pub trades: Vec<Trade>,
    pub investments: Vec<Investment>,
}

impl ReconciliationCases {
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty() && self.investments.is_empty()
    }
}

pub struct Exchange {
    config: EngineConfig,
    store: Arc<dyn Store>,
    ledger: Arc<dyn LedgerGateway>,
    locks: Arc<AssetLocks>,
    matcher: MatchingEngine,
    settlement: SettlementEngine,
    treasury: Arc<TreasuryTracker>,
    issuance: IssuanceFlow,
}

impl Exchange {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Store>,
        ledger: Arc<dyn LedgerGateway>,
        oracle: Arc<dyn PriceOracle>,
        audit_log: Arc<dyn AuditLog>,
    ) -> Self {
        let locks = Arc::new(AssetLocks::new());
        let audit = AuditEmitter::new(audit_log, config.audit_timeout());
        let retry = RetryPolicy::new(config.ledger_max_attempts, config.ledger_retry_backoff());
        let treasury = Arc::new(TreasuryTracker::new(store.clone(), ledger.clone(), locks.clone()));
        let settlement = SettlementEngine::new(
            store.clone(),
            ledger.clone(),
            audit.clone(),
            config.fee_schedule(),
            retry,
        );
        let issuance = IssuanceFlow::new(
            store.clone(),
            ledger.clone(),
            oracle,
            audit,
            treasury.clone(),
            locks.clone(),
            config.clone(),
            retry,
        );

        info!(
            fee_rate = %config.platform_fee_rate,
            currency = %config.settlement_currency,
            "Exchange initialized"
        );

        Self {
            config,
            store,
            ledger,
            locks,
            matcher: MatchingEngine::default(),
            settlement,
            treasury,
            issuance,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn treasury(&self) -> &Arc<TreasuryTracker> {
        &self.treasury
    }

    /// Validate, persist and match a new order
    pub async fn place_order(&self, request: NewOrder) -> Result<Placement, ExchangeError> {
        let now = Utc::now();
        let token_amount = Quantity::try_new(request.token_amount)
            .ok()
            .filter(|q| !q.is_zero())
            .ok_or(ValidationError::NonPositiveAmount)?;
        let price = Price::try_new(request.price_per_token).map_err(|_| ValidationError::NonPositivePrice)?;
        if request.currency != self.config.settlement_currency {
            return Err(ValidationError::UnsupportedCurrency(request.currency).into());
        }
        if request.expires_at.is_some_and(|at| at <= now) {
            return Err(ValidationError::ExpiryInPast.into());
        }
        // Any fill trades at most this amount at this price
        let total = token_amount.notional(price)?;
        self.config.fee_schedule().platform_fee(total)?;

        let asset = self.store.get_asset(&request.asset_id).await?;
        let owner_account = self.store.ledger_account(request.owner_id).await?;

        let _guard = self.locks.acquire(&request.asset_id, LockScope::Book).await;

        if request.side == Side::Sell {
            let held = self
                .ledger
                .balance_of(&owner_account, &LedgerAsset::Token(asset.token_id.clone()))
                .await
                .map_err(|err| {
                    warn!(owner_id = %request.owner_id, code = %err.code(), "Token balance query failed");
                    ExchangeError::LedgerUnavailable
                })?;
            let reserved = self
                .store
                .reserved_sell_amount(request.owner_id, &request.asset_id)
                .await?;
            let unencumbered = held - reserved.as_decimal();
            if unencumbered < token_amount.as_decimal() {
                return Err(ExchangeError::InsufficientBalance {
                    required: token_amount.as_decimal(),
                    available: unencumbered.max(Decimal::ZERO),
                });
            }
        }

        let order = Order::open(
            request.asset_id.clone(),
            request.side,
            request.owner_id,
            token_amount,
            price,
            request.currency,
            request.expires_at,
            request.is_public,
            now,
        );
        let order = self.store.insert_order(order).await?;
        info!(
            order_id = %order.id,
            asset_id = %order.asset_id,
            side = ?order.side,
            quantity = %order.token_amount,
            price = %order.price_per_token,
            "Order placed"
        );

        let trades = self.match_order(order.id, &order.asset_id).await?;
        let order = self.store.get_order(order.id).await?;
        Ok(Placement { order, trades })
    }

    /// Match until the order is exhausted or nothing compatible rests.
    /// Caller holds the asset's book lock.
    async fn match_order(&self, order_id: OrderId, asset_id: &AssetId) -> Result<Vec<Trade>, ExchangeError> {
        let mut excluded = HashSet::new();
        let mut trades = Vec::new();

        loop {
            // Fresh reads on every pass; nothing carries across a trade
            let incoming = self.store.get_order(order_id).await?;
            let book = OrderBook::from_orders(asset_id.clone(), self.store.active_orders(asset_id).await?);
            let Some(proposal) = self.matcher.next_proposal(&incoming, &book, &excluded, Utc::now()) else {
                break;
            };
            let maker = proposal.maker_order_id();
            // Either side is exhausted after a fill, so a maker is never proposed twice
            excluded.insert(maker);

            let result = match self.settlement.settle(&proposal).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(order_id = %order_id, maker_order_id = %maker, error = %err, "Could not settle against resting order");
                    continue;
                }
            };

            let trade = result.trade;
            if trade.is_completed() {
                let fills_recorded = result.fills_recorded;
                trades.push(trade);
                if !fills_recorded {
                    error!(target: "reconciliation", order_id = %order_id, "Fills not recorded, halting matching");
                    break;
                }
                continue;
            }

            let halt = trade.needs_reconciliation() || failing_side(&trade) == Some(incoming.side);
            debug!(order_id = %order_id, trade_id = %trade.id, halt, "Settlement failed");
            trades.push(trade);
            if halt {
                break;
            }
        }
        Ok(trades)
    }

    pub async fn cancel_order(&self, order_id: OrderId, requester_id: UserId) -> Result<Order, ExchangeError> {
        let order = self.store.get_order(order_id).await?;
        if order.owner_id != requester_id {
            return Err(ExchangeError::Unauthorized);
        }

        let _guard = self.locks.acquire(&order.asset_id, LockScope::Book).await;
        let mut order = self.store.get_order(order_id).await?;
        let expected_version = order.version;
        order.cancel(Utc::now())?;
        self.store.update_order(&order, expected_version).await?;

        info!(order_id = %order.id, remaining = %order.remaining_amount, "Order cancelled");
        Ok(order)
    }

    /// Visible resting orders in matching priority
    pub async fn get_order_book(&self, asset_id: &AssetId) -> Result<BookSnapshot, ExchangeError> {
        Ok(self.visible_book(asset_id).await?.snapshot())
    }

    /// Cumulative depth by price level; hidden orders are left out
    pub async fn get_depth(&self, asset_id: &AssetId) -> Result<DepthChart, ExchangeError> {
        Ok(self.visible_book(asset_id).await?.depth())
    }

    async fn visible_book(&self, asset_id: &AssetId) -> Result<OrderBook, ExchangeError> {
        self.store.get_asset(asset_id).await?;
        let orders = self.store.active_orders(asset_id).await?;
        Ok(OrderBook::from_orders(
            asset_id.clone(),
            orders.into_iter().filter(|o| o.is_public),
        ))
    }

    pub async fn get_user_orders(&self, user_id: UserId) -> Result<Vec<Order>, ExchangeError> {
        Ok(self.store.orders_by_owner(user_id).await?)
    }

    /// Completed trades, newest first, capped at `max_recent_trades`
    pub async fn get_recent_trades(&self, asset_id: &AssetId, limit: Option<usize>) -> Result<Vec<Trade>, ExchangeError> {
        let limit = limit
            .unwrap_or(self.config.max_recent_trades)
            .min(self.config.max_recent_trades);
        Ok(self.store.recent_trades(asset_id, limit).await?)
    }

    pub async fn execute_primary_investment(
        &self,
        asset_id: &AssetId,
        investor_id: UserId,
        amount_fiat: Decimal,
    ) -> Result<Investment, ExchangeError> {
        self.issuance.execute(asset_id, investor_id, amount_fiat).await
    }

    /// Move every active order past its expiry to `expired`
    pub async fn expire_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, ExchangeError> {
        let mut by_asset: BTreeMap<AssetId, Vec<OrderId>> = BTreeMap::new();
        for order in self.store.expired_orders(now).await? {
            by_asset.entry(order.asset_id).or_default().push(order.id);
        }

        let mut expired = Vec::new();
        for (asset_id, order_ids) in by_asset {
            let _guard = self.locks.acquire(&asset_id, LockScope::Book).await;
            for order_id in order_ids {
                let mut order = self.store.get_order(order_id).await?;
                if !order.status.is_active() || !order.is_expired_at(now) {
                    continue;
                }
                let expected_version = order.version;
                order.expire(now)?;
                self.store.update_order(&order, expected_version).await?;
                debug!(order_id = %order.id, "Order expired");
                expired.push(order);
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired orders");
        }
        Ok(expired)
    }

    pub async fn reconciliation_cases(&self) -> Result<ReconciliationCases, ExchangeError> {
        Ok(ReconciliationCases {
            trades: self.store.trades_needing_reconciliation().await?,
            investments: self.store.investments_needing_reconciliation().await?,
        })
    }

    pub async fn reconcile_treasury(&self, asset_id: &AssetId) -> Result<TreasuryAccount, ExchangeError> {
        self.treasury.reconcile(asset_id).await
    }

    /// Periodic treasury reconciliation and order expiry
    pub fn spawn_maintenance(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.reconciliation_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let reconciled = self.treasury.reconcile_all().await;
                debug!(count = reconciled.len(), "Treasury reconciliation pass finished");
                if let Err(err) = self.expire_orders(Utc::now()).await {
                    warn!(error = %err, "Order expiry pass failed");
                }
            }
        })
    }
}
