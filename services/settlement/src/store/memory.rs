//! In-memory store
//!
//! A single mutex guards all tables so every trait method is atomic. Used
//! by the sandbox gateway and by tests, and as the working set of
//! [`DurableStore`](super::DurableStore).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use types::asset::Asset;
use types::errors::StoreError;
use types::ids::{AssetId, InvestmentId, LedgerAccountId, OrderId, TradeId, UserId};
use types::investment::{Investment, InvestmentStatus};
use types::numeric::Quantity;
use types::order::{Order, Side};
use types::trade::{Trade, TradeStatus};
use types::treasury::{DecrementOutcome, TreasuryAccount};

use super::snapshot::StoreState;
use super::{AccountDirectory, AssetStore, InvestmentStore, OrderStore, TradeStore, TreasuryStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBinding {
    pub user_id: UserId,
    pub ledger_account_id: LedgerAccountId,
}

/// Initial reference data, typically loaded from a JSON file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreSeed {
    pub assets: Vec<Asset>,
    pub treasuries: Vec<TreasuryAccount>,
    pub accounts: Vec<AccountBinding>,
}

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    next_sequence: u64,
    trades: HashMap<TradeId, Trade>,
    investments: HashMap<InvestmentId, Investment>,
    treasuries: HashMap<AssetId, TreasuryAccount>,
    assets: HashMap<AssetId, Asset>,
    accounts: HashMap<UserId, LedgerAccountId>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: StoreSeed) -> Self {
        Self::from_state(StoreState::from(seed))
    }

    pub fn from_state(state: StoreState) -> Self {
        let tables = Tables {
            orders: state.orders.into_iter().collect(),
            next_sequence: state.next_sequence,
            trades: state.trades.into_iter().collect(),
            investments: state.investments.into_iter().collect(),
            treasuries: state.treasuries.into_iter().collect(),
            assets: state.assets.into_iter().collect(),
            accounts: state.accounts.into_iter().collect(),
        };
        Self {
            tables: Mutex::new(tables),
        }
    }

    /// Copy of every table
    pub fn state(&self) -> Result<StoreState, StoreError> {
        let tables = self.tables()?;
        Ok(StoreState {
            orders: tables.orders.iter().map(|(k, v)| (*k, v.clone())).collect(),
            next_sequence: tables.next_sequence,
            trades: tables.trades.iter().map(|(k, v)| (*k, v.clone())).collect(),
            investments: tables.investments.iter().map(|(k, v)| (*k, v.clone())).collect(),
            treasuries: tables.treasuries.clone().into_iter().collect(),
            assets: tables.assets.clone().into_iter().collect(),
            accounts: tables.accounts.clone().into_iter().collect(),
        })
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, mut order: Order) -> Result<Order, StoreError> {
        let mut tables = self.tables()?;
        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        tables.next_sequence += 1;
        order.sequence = tables.next_sequence;
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Order, StoreError> {
        self.tables()?.orders.get(&id).cloned().ok_or_else(|| not_found("order", id))
    }

    async fn update_order(&self, order: &Order, expected_version: u64) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let stored = tables.orders.get_mut(&order.id).ok_or_else(|| not_found("order", order.id))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        if stored.status.is_terminal() {
            return Err(StoreError::Immutable {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        *stored = order.clone();
        Ok(())
    }

    async fn active_orders(&self, asset_id: &AssetId) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .tables()?
            .orders
            .values()
            .filter(|o| &o.asset_id == asset_id && o.status.is_active())
            .cloned()
            .collect())
    }

    async fn orders_by_owner(&self, owner_id: UserId) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .tables()?
            .orders
            .values()
            .filter(|o| o.owner_id == owner_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.sequence.cmp(&a.sequence)));
        Ok(orders)
    }

    async fn reserved_sell_amount(&self, owner_id: UserId, asset_id: &AssetId) -> Result<Quantity, StoreError> {
        Ok(self
            .tables()?
            .orders
            .values()
            .filter(|o| {
                o.owner_id == owner_id && &o.asset_id == asset_id && o.side == Side::Sell && o.status.is_active()
            })
            .map(|o| o.remaining_amount)
            .sum())
    }

    async fn expired_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .tables()?
            .orders
            .values()
            .filter(|o| o.status.is_active() && o.is_expired_at(now))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TradeStore for InMemoryStore {
    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if tables.trades.contains_key(&trade.id) {
            return Err(StoreError::Duplicate {
                entity: "trade",
                id: trade.id.to_string(),
            });
        }
        tables.trades.insert(trade.id, trade.clone());
        Ok(())
    }

    async fn update_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let stored = tables.trades.get_mut(&trade.id).ok_or_else(|| not_found("trade", trade.id))?;
        if stored.status != TradeStatus::Pending {
            return Err(StoreError::Immutable {
                entity: "trade",
                id: trade.id.to_string(),
            });
        }
        *stored = trade.clone();
        Ok(())
    }

    async fn get_trade(&self, id: TradeId) -> Result<Trade, StoreError> {
        self.tables()?.trades.get(&id).cloned().ok_or_else(|| not_found("trade", id))
    }

    async fn recent_trades(&self, asset_id: &AssetId, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let mut trades: Vec<Trade> = self
            .tables()?
            .trades
            .values()
            .filter(|t| &t.asset_id == asset_id && t.is_completed())
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.settled_at.cmp(&a.settled_at).then(b.id.cmp(&a.id)));
        trades.truncate(limit);
        Ok(trades)
    }

    async fn trades_needing_reconciliation(&self) -> Result<Vec<Trade>, StoreError> {
        let mut trades: Vec<Trade> = self
            .tables()?
            .trades
            .values()
            .filter(|t| t.needs_reconciliation())
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.created_at);
        Ok(trades)
    }
}

#[async_trait]
impl InvestmentStore for InMemoryStore {
    async fn insert_investment(&self, investment: &Investment) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if tables.investments.contains_key(&investment.id) {
            return Err(StoreError::Duplicate {
                entity: "investment",
                id: investment.id.to_string(),
            });
        }
        tables.investments.insert(investment.id, investment.clone());
        Ok(())
    }

    async fn update_investment(&self, investment: &Investment) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let stored = tables
            .investments
            .get_mut(&investment.id)
            .ok_or_else(|| not_found("investment", investment.id))?;
        if stored.status != InvestmentStatus::Pending {
            return Err(StoreError::Immutable {
                entity: "investment",
                id: investment.id.to_string(),
            });
        }
        *stored = investment.clone();
        Ok(())
    }

    async fn get_investment(&self, id: InvestmentId) -> Result<Investment, StoreError> {
        self.tables()?
            .investments
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("investment", id))
    }

    async fn investments_needing_reconciliation(&self) -> Result<Vec<Investment>, StoreError> {
        let mut investments: Vec<Investment> = self
            .tables()?
            .investments
            .values()
            .filter(|i| i.needs_reconciliation())
            .cloned()
            .collect();
        investments.sort_by_key(|i| i.created_at);
        Ok(investments)
    }
}

#[async_trait]
impl TreasuryStore for InMemoryStore {
    async fn get_treasury(&self, asset_id: &AssetId) -> Result<TreasuryAccount, StoreError> {
        self.tables()?
            .treasuries
            .get(asset_id)
            .cloned()
            .ok_or_else(|| not_found("treasury", asset_id))
    }

    async fn upsert_treasury(&self, treasury: &TreasuryAccount) -> Result<(), StoreError> {
        self.tables()?.treasuries.insert(treasury.asset_id.clone(), treasury.clone());
        Ok(())
    }

    async fn list_treasuries(&self) -> Result<Vec<TreasuryAccount>, StoreError> {
        let mut treasuries: Vec<TreasuryAccount> = self.tables()?.treasuries.values().cloned().collect();
        treasuries.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        Ok(treasuries)
    }

    async fn apply_treasury_decrement(
        &self,
        asset_id: &AssetId,
        amount: Quantity,
        investment_id: InvestmentId,
    ) -> Result<DecrementOutcome, StoreError> {
        let mut tables = self.tables()?;
        let treasury = tables
            .treasuries
            .get_mut(asset_id)
            .ok_or_else(|| not_found("treasury", asset_id))?;
        Ok(treasury.decrement(amount, investment_id))
    }

    async fn record_reconciled_balance(
        &self,
        asset_id: &AssetId,
        balance: Quantity,
        at: DateTime<Utc>,
    ) -> Result<TreasuryAccount, StoreError> {
        let mut tables = self.tables()?;
        let treasury = tables
            .treasuries
            .get_mut(asset_id)
            .ok_or_else(|| not_found("treasury", asset_id))?;
        treasury.available_balance = balance;
        treasury.last_reconciled_at = Some(at);
        Ok(treasury.clone())
    }
}

#[async_trait]
impl AssetStore for InMemoryStore {
    async fn get_asset(&self, asset_id: &AssetId) -> Result<Asset, StoreError> {
        self.tables()?
            .assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| not_found("asset", asset_id))
    }

    async fn upsert_asset(&self, asset: &Asset) -> Result<(), StoreError> {
        self.tables()?.assets.insert(asset.asset_id.clone(), asset.clone());
        Ok(())
    }

    async fn record_funding(&self, asset_id: &AssetId, amount_fiat: Decimal, tokens: Quantity) -> Result<Asset, StoreError> {
        let mut tables = self.tables()?;
        let asset = tables.assets.get_mut(asset_id).ok_or_else(|| not_found("asset", asset_id))?;
        asset.record_funding(amount_fiat, tokens);
        Ok(asset.clone())
    }
}

#[async_trait]
impl AccountDirectory for InMemoryStore {
    async fn ledger_account(&self, user_id: UserId) -> Result<LedgerAccountId, StoreError> {
        self.tables()?
            .accounts
            .get(&user_id)
            .cloned()
            .ok_or_else(|| not_found("ledger account", user_id))
    }

    async fn bind_account(&self, user_id: UserId, account: LedgerAccountId) -> Result<(), StoreError> {
        self.tables()?.accounts.insert(user_id, account);
        Ok(())
    }
}
