//! Durable store
//!
//! An [`InMemoryStore`] working set backed by a snapshot and a journal in
//! one directory. Every mutation appends the row's new state to the
//! journal, under one lock, before returning, so pending trades, partial
//! settlements and applied treasury decrements survive a restart. After
//! `snapshot_interval` appends the whole state is snapshotted and the
//! journal emptied.
//!
//! Opening recovers: load the snapshot, replay newer journal entries. A
//! directory with neither is initialized from the seed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use types::asset::Asset;
use types::errors::StoreError;
use types::ids::{AssetId, InvestmentId, LedgerAccountId, OrderId, TradeId, UserId};
use types::investment::Investment;
use types::numeric::Quantity;
use types::order::Order;
use types::trade::Trade;
use types::treasury::{DecrementOutcome, TreasuryAccount};

use super::journal::{self, JournalError, JournalRecord, JournalWriter};
use super::memory::{AccountBinding, InMemoryStore, StoreSeed};
use super::snapshot::{Snapshot, SnapshotError, StoreState};
use super::{AccountDirectory, AssetStore, InvestmentStore, OrderStore, TradeStore, TreasuryStore};

const JOURNAL_FILE: &str = "journal.jsonl";

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DurableStoreConfig {
    pub dir: PathBuf,
    /// Journal appends between snapshots
    pub snapshot_interval: u64,
}

impl DurableStoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

impl Default for DurableStoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            snapshot_interval: 1_000,
        }
    }
}

pub struct DurableStore {
    inner: InMemoryStore,
    journal: Mutex<JournalWriter>,
    config: DurableStoreConfig,
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl DurableStore {
    /// Recover the store in `config.dir`, or create it from `seed`
    pub fn open(config: DurableStoreConfig, seed: StoreSeed) -> Result<Self, RecoveryError> {
        fs::create_dir_all(&config.dir)?;
        let journal_path = config.dir.join(JOURNAL_FILE);

        let snapshot = Snapshot::load(&config.dir)?;
        let (entries, valid_len) = journal::read_entries(&journal_path)?;

        let (mut state, snapshot_sequence) = match snapshot {
            Some(snapshot) => (snapshot.state, snapshot.sequence),
            None => {
                let state = StoreState::from(seed);
                if entries.is_empty() {
                    Snapshot::new(0, state.clone())?.write(&config.dir)?;
                    info!(dir = %config.dir.display(), "Store initialized from seed");
                }
                (state, 0)
            }
        };

        let mut last_sequence = snapshot_sequence;
        let mut replayed = 0usize;
        for entry in entries.iter().filter(|e| e.sequence > snapshot_sequence) {
            state.apply(entry.record()?);
            last_sequence = entry.sequence;
            replayed += 1;
        }

        info!(
            dir = %config.dir.display(),
            snapshot_sequence,
            replayed,
            last_sequence,
            "Store recovered"
        );

        let writer = JournalWriter::open(journal_path, valid_len, last_sequence + 1)?;
        Ok(Self {
            inner: InMemoryStore::from_state(state),
            journal: Mutex::new(writer),
            config,
        })
    }

    async fn journal(&self) -> MutexGuard<'_, JournalWriter> {
        self.journal.lock().await
    }

    /// Append `record`; snapshot once the interval is reached
    fn persist(&self, journal: &mut JournalWriter, record: JournalRecord) -> Result<(), StoreError> {
        let event_type = record.event_type();
        journal.append(&record).map_err(|err| {
            error!(event_type, error = %err, path = %journal.path().display(), "Journal append failed");
            backend(err)
        })?;

        if journal.entries() >= self.config.snapshot_interval {
            // A failed snapshot leaves the journal authoritative
            if let Err(err) = self.snapshot(journal) {
                warn!(error = %err, "Store snapshot failed");
            }
        }
        Ok(())
    }

    fn snapshot(&self, journal: &mut JournalWriter) -> Result<(), StoreError> {
        let sequence = journal.last_sequence();
        let state = self.inner.state()?;
        Snapshot::new(sequence, state)
            .and_then(|snapshot| snapshot.write(&self.config.dir))
            .map_err(backend)?;
        journal.reset().map_err(backend)?;
        debug!(sequence, "Store snapshot written");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for DurableStore {
    async fn insert_order(&self, order: Order) -> Result<Order, StoreError> {
        let mut journal = self.journal().await;
        let order = self.inner.insert_order(order).await?;
        self.persist(&mut journal, JournalRecord::Order(order.clone()))?;
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Order, StoreError> {
        self.inner.get_order(id).await
    }

    async fn update_order(&self, order: &Order, expected_version: u64) -> Result<(), StoreError> {
        let mut journal = self.journal().await;
        self.inner.update_order(order, expected_version).await?;
        self.persist(&mut journal, JournalRecord::Order(order.clone()))
    }

    async fn active_orders(&self, asset_id: &AssetId) -> Result<Vec<Order>, StoreError> {
        self.inner.active_orders(asset_id).await
    }

    async fn orders_by_owner(&self, owner_id: UserId) -> Result<Vec<Order>, StoreError> {
        self.inner.orders_by_owner(owner_id).await
    }

    async fn reserved_sell_amount(&self, owner_id: UserId, asset_id: &AssetId) -> Result<Quantity, StoreError> {
        self.inner.reserved_sell_amount(owner_id, asset_id).await
    }

    async fn expired_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        self.inner.expired_orders(now).await
    }
}

#[async_trait]
impl TradeStore for DurableStore {
    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut journal = self.journal().await;
        self.inner.insert_trade(trade).await?;
        self.persist(&mut journal, JournalRecord::Trade(trade.clone()))
    }

    async fn update_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut journal = self.journal().await;
        self.inner.update_trade(trade).await?;
        self.persist(&mut journal, JournalRecord::Trade(trade.clone()))
    }

    async fn get_trade(&self, id: TradeId) -> Result<Trade, StoreError> {
        self.inner.get_trade(id).await
    }

    async fn recent_trades(&self, asset_id: &AssetId, limit: usize) -> Result<Vec<Trade>, StoreError> {
        self.inner.recent_trades(asset_id, limit).await
    }

    async fn trades_needing_reconciliation(&self) -> Result<Vec<Trade>, StoreError> {
        self.inner.trades_needing_reconciliation().await
    }
}

#[async_trait]
impl InvestmentStore for DurableStore {
    async fn insert_investment(&self, investment: &Investment) -> Result<(), StoreError> {
        let mut journal = self.journal().await;
        self.inner.insert_investment(investment).await?;
        self.persist(&mut journal, JournalRecord::Investment(investment.clone()))
    }

    async fn update_investment(&self, investment: &Investment) -> Result<(), StoreError> {
        let mut journal = self.journal().await;
        self.inner.update_investment(investment).await?;
        self.persist(&mut journal, JournalRecord::Investment(investment.clone()))
    }

    async fn get_investment(&self, id: InvestmentId) -> Result<Investment, StoreError> {
        self.inner.get_investment(id).await
    }

    async fn investments_needing_reconciliation(&self) -> Result<Vec<Investment>, StoreError> {
        self.inner.investments_needing_reconciliation().await
    }
}

#[async_trait]
impl TreasuryStore for DurableStore {
    async fn get_treasury(&self, asset_id: &AssetId) -> Result<TreasuryAccount, StoreError> {
        self.inner.get_treasury(asset_id).await
    }

    async fn upsert_treasury(&self, treasury: &TreasuryAccount) -> Result<(), StoreError> {
        let mut journal = self.journal().await;
        self.inner.upsert_treasury(treasury).await?;
        self.persist(&mut journal, JournalRecord::Treasury(treasury.clone()))
    }

    async fn list_treasuries(&self) -> Result<Vec<TreasuryAccount>, StoreError> {
        self.inner.list_treasuries().await
    }

    async fn apply_treasury_decrement(
        &self,
        asset_id: &AssetId,
        amount: Quantity,
        investment_id: InvestmentId,
    ) -> Result<DecrementOutcome, StoreError> {
        let mut journal = self.journal().await;
        let outcome = self.inner.apply_treasury_decrement(asset_id, amount, investment_id).await?;
        if matches!(outcome, DecrementOutcome::Applied { .. }) {
            let treasury = self.inner.get_treasury(asset_id).await?;
            self.persist(&mut journal, JournalRecord::Treasury(treasury))?;
        }
        Ok(outcome)
    }

    async fn record_reconciled_balance(
        &self,
        asset_id: &AssetId,
        balance: Quantity,
        at: DateTime<Utc>,
    ) -> Result<TreasuryAccount, StoreError> {
        let mut journal = self.journal().await;
        let treasury = self.inner.record_reconciled_balance(asset_id, balance, at).await?;
        self.persist(&mut journal, JournalRecord::Treasury(treasury.clone()))?;
        Ok(treasury)
    }
}

#[async_trait]
impl AssetStore for DurableStore {
    async fn get_asset(&self, asset_id: &AssetId) -> Result<Asset, StoreError> {
        self.inner.get_asset(asset_id).await
    }

    async fn upsert_asset(&self, asset: &Asset) -> Result<(), StoreError> {
        let mut journal = self.journal().await;
        self.inner.upsert_asset(asset).await?;
        self.persist(&mut journal, JournalRecord::Asset(asset.clone()))
    }

    async fn record_funding(&self, asset_id: &AssetId, amount_fiat: Decimal, tokens: Quantity) -> Result<Asset, StoreError> {
        let mut journal = self.journal().await;
        let asset = self.inner.record_funding(asset_id, amount_fiat, tokens).await?;
        self.persist(&mut journal, JournalRecord::Asset(asset.clone()))?;
        Ok(asset)
    }
}

#[async_trait]
impl AccountDirectory for DurableStore {
    async fn ledger_account(&self, user_id: UserId) -> Result<LedgerAccountId, StoreError> {
        self.inner.ledger_account(user_id).await
    }

    async fn bind_account(&self, user_id: UserId, account: LedgerAccountId) -> Result<(), StoreError> {
        let mut journal = self.journal().await;
        self.inner.bind_account(user_id, account.clone()).await?;
        self.persist(
            &mut journal,
            JournalRecord::Account(AccountBinding {
                user_id,
                ledger_account_id: account,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;
    use types::asset::AssetStatus;
    use types::fee::FeeSchedule;
    use types::ids::{TokenId, TxRef};
    use types::numeric::Price;
    use types::order::Side;
    use types::trade::{FailureKind, LegFailure, SettlementLeg, TradeProposal, TradeStatus};

    fn asset_id() -> AssetId {
        AssetId::new("PROP-001")
    }

    fn seed() -> StoreSeed {
        StoreSeed {
            assets: vec![Asset {
                asset_id: asset_id(),
                name: "Harbour Lofts".into(),
                token_id: TokenId::new("0.0.500"),
                status: AssetStatus::Active,
                min_investment: None,
                max_investment: None,
                total_raised: Decimal::ZERO,
                tokens_sold: Quantity::zero(),
            }],
            treasuries: vec![TreasuryAccount::new(
                asset_id(),
                LedgerAccountId::new("0.0.9001"),
                Quantity::from_u64(1_000),
            )],
            accounts: Vec::new(),
        }
    }

    fn sell(owner: UserId) -> Order {
        Order::open(
            asset_id(),
            Side::Sell,
            owner,
            Quantity::from_u64(10),
            Price::from_str("10").unwrap(),
            "HBAR",
            None,
            true,
            Utc::now(),
        )
    }

    fn pending_trade(sell: &Order) -> Trade {
        let proposal = TradeProposal {
            asset_id: asset_id(),
            buy_order_id: OrderId::new(),
            sell_order_id: sell.id,
            buyer_id: UserId::new(),
            seller_id: sell.owner_id,
            taker_side: Side::Buy,
            token_amount: Quantity::from_u64(4),
            price_per_token: sell.price_per_token,
        };
        Trade::pending(&proposal, &FeeSchedule::default(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_restart_keeps_unfinished_settlements() {
        let tmp = TempDir::new().unwrap();
        let config = DurableStoreConfig::new(tmp.path());
        let investment_id = InvestmentId::new();

        let (order, pending, partial) = {
            let store = DurableStore::open(config.clone(), seed()).unwrap();
            let order = store.insert_order(sell(UserId::new())).await.unwrap();

            let pending = pending_trade(&order);
            store.insert_trade(&pending).await.unwrap();

            let mut partial = pending_trade(&order);
            store.insert_trade(&partial).await.unwrap();
            partial.record_token_leg(TxRef::new("0.0.1@1")).unwrap();
            partial
                .fail(
                    LegFailure {
                        leg: SettlementLeg::Payment,
                        kind: FailureKind::PartialSettlement,
                        code: "INSUFFICIENT_PAYER_BALANCE".into(),
                    },
                    Utc::now(),
                )
                .unwrap();
            store.update_trade(&partial).await.unwrap();

            store
                .apply_treasury_decrement(&asset_id(), Quantity::from_u64(100), investment_id)
                .await
                .unwrap();
            (order, pending, partial)
        };

        let store = DurableStore::open(config, StoreSeed::default()).unwrap();
        assert_eq!(store.get_order(order.id).await.unwrap(), order);
        assert_eq!(store.get_trade(pending.id).await.unwrap().status, TradeStatus::Pending);

        let cases = store.trades_needing_reconciliation().await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, partial.id);

        let treasury = store.get_treasury(&asset_id()).await.unwrap();
        assert_eq!(treasury.available_balance, Quantity::from_u64(900));
        let again = store
            .apply_treasury_decrement(&asset_id(), Quantity::from_u64(100), investment_id)
            .await
            .unwrap();
        assert_eq!(again, DecrementOutcome::AlreadyApplied);

        let next = store.insert_order(sell(UserId::new())).await.unwrap();
        assert!(next.sequence > order.sequence);
    }

    #[tokio::test]
    async fn test_recovery_across_snapshots() {
        let tmp = TempDir::new().unwrap();
        let config = DurableStoreConfig {
            dir: tmp.path().to_path_buf(),
            snapshot_interval: 3,
        };
        let owner = UserId::new();

        {
            let store = DurableStore::open(config.clone(), seed()).unwrap();
            for _ in 0..7 {
                store.insert_order(sell(owner)).await.unwrap();
            }
        }

        let store = DurableStore::open(config, StoreSeed::default()).unwrap();
        let orders = store.orders_by_owner(owner).await.unwrap();
        assert_eq!(orders.len(), 7);
        assert_eq!(store.get_asset(&asset_id()).await.unwrap().name, "Harbour Lofts");
    }

    #[tokio::test]
    async fn test_seed_applies_only_to_a_new_directory() {
        let tmp = TempDir::new().unwrap();
        let config = DurableStoreConfig::new(tmp.path());
        {
            let store = DurableStore::open(config.clone(), seed()).unwrap();
            store
                .record_reconciled_balance(&asset_id(), Quantity::from_u64(640), Utc::now())
                .await
                .unwrap();
        }

        let store = DurableStore::open(config, seed()).unwrap();
        let treasury = store.get_treasury(&asset_id()).await.unwrap();
        assert_eq!(treasury.available_balance, Quantity::from_u64(640));
        assert!(treasury.last_reconciled_at.is_some());
    }
}
