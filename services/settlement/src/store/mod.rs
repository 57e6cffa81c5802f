//! Persistent store interfaces
//!
//! The store is the source of truth for orders, trades, investments,
//! treasuries and assets. Order updates are compare-and-set on `version`;
//! trades and investments can be rewritten only while pending.

pub mod durable;
pub mod journal;
pub mod memory;
pub mod snapshot;

pub use durable::{DurableStore, DurableStoreConfig, RecoveryError};
pub use memory::{AccountBinding, InMemoryStore, StoreSeed};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use types::asset::Asset;
use types::errors::StoreError;
use types::ids::{AssetId, InvestmentId, LedgerAccountId, OrderId, TradeId, UserId};
use types::investment::Investment;
use types::numeric::Quantity;
use types::order::Order;
use types::trade::Trade;
use types::treasury::{DecrementOutcome, TreasuryAccount};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order and return it with its sequence number assigned
    async fn insert_order(&self, order: Order) -> Result<Order, StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Order, StoreError>;

    /// Replace the stored order if its version still equals `expected_version`
    async fn update_order(&self, order: &Order, expected_version: u64) -> Result<(), StoreError>;

    /// Open and partially filled orders for an asset, both sides
    async fn active_orders(&self, asset_id: &AssetId) -> Result<Vec<Order>, StoreError>;

    /// All of a user's orders, newest first
    async fn orders_by_owner(&self, owner_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// Remaining amount across the owner's active sell orders for an asset
    async fn reserved_sell_amount(&self, owner_id: UserId, asset_id: &AssetId) -> Result<Quantity, StoreError>;

    /// Active orders whose expiry is at or before `now`
    async fn expired_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    /// Rewrite a trade that is still pending in the store
    async fn update_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    async fn get_trade(&self, id: TradeId) -> Result<Trade, StoreError>;

    /// Completed trades for an asset, most recently settled first
    async fn recent_trades(&self, asset_id: &AssetId, limit: usize) -> Result<Vec<Trade>, StoreError>;

    /// Failed trades flagged partial or ambiguous
    async fn trades_needing_reconciliation(&self) -> Result<Vec<Trade>, StoreError>;
}

#[async_trait]
pub trait InvestmentStore: Send + Sync {
    async fn insert_investment(&self, investment: &Investment) -> Result<(), StoreError>;

    /// Rewrite an investment that is still pending in the store
    async fn update_investment(&self, investment: &Investment) -> Result<(), StoreError>;

    async fn get_investment(&self, id: InvestmentId) -> Result<Investment, StoreError>;

    async fn investments_needing_reconciliation(&self) -> Result<Vec<Investment>, StoreError>;
}

#[async_trait]
pub trait TreasuryStore: Send + Sync {
    async fn get_treasury(&self, asset_id: &AssetId) -> Result<TreasuryAccount, StoreError>;

    async fn upsert_treasury(&self, treasury: &TreasuryAccount) -> Result<(), StoreError>;

    async fn list_treasuries(&self) -> Result<Vec<TreasuryAccount>, StoreError>;

    /// Atomic keyed decrement; a second call for the same investment is a no-op
    async fn apply_treasury_decrement(
        &self,
        asset_id: &AssetId,
        amount: Quantity,
        investment_id: InvestmentId,
    ) -> Result<DecrementOutcome, StoreError>;

    /// Overwrite the cached balance with the ledger's
    async fn record_reconciled_balance(
        &self,
        asset_id: &AssetId,
        balance: Quantity,
        at: DateTime<Utc>,
    ) -> Result<TreasuryAccount, StoreError>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get_asset(&self, asset_id: &AssetId) -> Result<Asset, StoreError>;

    async fn upsert_asset(&self, asset: &Asset) -> Result<(), StoreError>;

    /// Add a completed investment to the asset's funding totals
    async fn record_funding(&self, asset_id: &AssetId, amount_fiat: Decimal, tokens: Quantity) -> Result<Asset, StoreError>;
}

/// Maps platform users to their ledger accounts
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn ledger_account(&self, user_id: UserId) -> Result<LedgerAccountId, StoreError>;

    async fn bind_account(&self, user_id: UserId, account: LedgerAccountId) -> Result<(), StoreError>;
}

pub trait Store: OrderStore + TradeStore + InvestmentStore + TreasuryStore + AssetStore + AccountDirectory {}

impl<T> Store for T where T: OrderStore + TradeStore + InvestmentStore + TreasuryStore + AssetStore + AccountDirectory {}
