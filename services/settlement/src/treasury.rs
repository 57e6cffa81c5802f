//! Treasury account tracker
//!
//! The cached `available_balance` is a fast-path check only. Reconciliation
//! replaces it with the ledger's balance and runs under the asset's treasury
//! lock so it cannot interleave with an in-flight issuance.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use types::errors::ExchangeError;
use types::ids::{AssetId, InvestmentId};
use types::numeric::Quantity;
use types::treasury::{DecrementOutcome, TreasuryAccount};

use crate::ledger::{LedgerAsset, LedgerGateway};
use crate::locks::{AssetLocks, LockScope};
use crate::store::Store;

pub struct TreasuryTracker {
    store: Arc<dyn Store>,
    ledger: Arc<dyn LedgerGateway>,
    locks: Arc<AssetLocks>,
}

impl TreasuryTracker {
    pub fn new(store: Arc<dyn Store>, ledger: Arc<dyn LedgerGateway>, locks: Arc<AssetLocks>) -> Self {
        Self { store, ledger, locks }
    }

    /// Whether the cached balance covers `amount`. Does not reserve anything.
    pub async fn reserve_and_check(&self, asset_id: &AssetId, amount: Quantity) -> Result<bool, ExchangeError> {
        let treasury = self.store.get_treasury(asset_id).await?;
        Ok(treasury.is_active() && treasury.covers(amount))
    }

    /// Decrement the cached balance once for `investment_id`
    pub async fn decrement(
        &self,
        asset_id: &AssetId,
        amount: Quantity,
        investment_id: InvestmentId,
    ) -> Result<DecrementOutcome, ExchangeError> {
        let outcome = self
            .store
            .apply_treasury_decrement(asset_id, amount, investment_id)
            .await?;
        match outcome {
            DecrementOutcome::Applied { available_balance } => {
                info!(asset_id = %asset_id, investment_id = %investment_id, %amount, %available_balance, "Treasury decremented");
            }
            DecrementOutcome::AlreadyApplied => {
                warn!(asset_id = %asset_id, investment_id = %investment_id, "Treasury decrement already applied");
            }
            DecrementOutcome::Insufficient { available_balance } => {
                error!(
                    target: "reconciliation",
                    asset_id = %asset_id,
                    investment_id = %investment_id,
                    %amount,
                    %available_balance,
                    "Treasury cache below delivered amount"
                );
            }
        }
        Ok(outcome)
    }

    /// Overwrite the cached balance with the ledger balance
    pub async fn reconcile(&self, asset_id: &AssetId) -> Result<TreasuryAccount, ExchangeError> {
        let _guard = self.locks.acquire(asset_id, LockScope::Treasury).await;

        let treasury = self.store.get_treasury(asset_id).await?;
        let asset = self.store.get_asset(asset_id).await?;
        let balance = self
            .ledger
            .balance_of(&treasury.ledger_account_id, &LedgerAsset::Token(asset.token_id))
            .await
            .map_err(|_| ExchangeError::LedgerUnavailable)?;
        let balance = Quantity::try_new(balance).map_err(|_| ExchangeError::LedgerUnavailable)?;

        if balance != treasury.available_balance {
            warn!(
                target: "reconciliation",
                asset_id = %asset_id,
                cached = %treasury.available_balance,
                ledger = %balance,
                "Treasury cache drifted from ledger"
            );
        }
        Ok(self
            .store
            .record_reconciled_balance(asset_id, balance, Utc::now())
            .await?)
    }

    /// Reconcile every treasury; one failure does not stop the rest
    pub async fn reconcile_all(&self) -> Vec<(AssetId, Result<TreasuryAccount, ExchangeError>)> {
        let treasuries = match self.store.list_treasuries().await {
            Ok(treasuries) => treasuries,
            Err(err) => {
                error!(error = %err, "Could not list treasuries for reconciliation");
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(treasuries.len());
        for treasury in treasuries {
            let result = self.reconcile(&treasury.asset_id).await;
            if let Err(err) = &result {
                warn!(asset_id = %treasury.asset_id, error = %err, "Treasury reconciliation failed");
            }
            results.push((treasury.asset_id, result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::store::{InMemoryStore, TreasuryStore, AssetStore};
    use rust_decimal::Decimal;
    use types::asset::{Asset, AssetStatus};
    use types::ids::{LedgerAccountId, TokenId};

    async fn setup(cached: u64, on_ledger: u64) -> (TreasuryTracker, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let asset_id = AssetId::new("PROP-001");
        let token = TokenId::new("0.0.500");
        let account = LedgerAccountId::new("0.0.9001");

        store
            .upsert_asset(&Asset {
                asset_id: asset_id.clone(),
                name: "Harbour Lofts".into(),
                token_id: token.clone(),
                status: AssetStatus::Active,
                min_investment: None,
                max_investment: None,
                total_raised: Decimal::ZERO,
                tokens_sold: Quantity::zero(),
            })
            .await
            .unwrap();
        store
            .upsert_treasury(&TreasuryAccount::new(asset_id, account.clone(), Quantity::from_u64(cached)))
            .await
            .unwrap();
        ledger.credit_token(&account, &token, Decimal::from(on_ledger));

        let tracker = TreasuryTracker::new(store.clone(), ledger, Arc::new(AssetLocks::new()));
        (tracker, store)
    }

    #[tokio::test]
    async fn test_reserve_and_check_does_not_mutate() {
        let (tracker, store) = setup(100, 100).await;
        let asset = AssetId::new("PROP-001");
        assert!(tracker.reserve_and_check(&asset, Quantity::from_u64(100)).await.unwrap());
        assert!(!tracker.reserve_and_check(&asset, Quantity::from_u64(101)).await.unwrap());
        assert_eq!(store.get_treasury(&asset).await.unwrap().available_balance, Quantity::from_u64(100));
    }

    #[tokio::test]
    async fn test_decrement_applies_once_per_investment() {
        let (tracker, store) = setup(100, 100).await;
        let asset = AssetId::new("PROP-001");
        let investment = InvestmentId::new();

        tracker.decrement(&asset, Quantity::from_u64(30), investment).await.unwrap();
        let again = tracker.decrement(&asset, Quantity::from_u64(30), investment).await.unwrap();

        assert_eq!(again, DecrementOutcome::AlreadyApplied);
        assert_eq!(store.get_treasury(&asset).await.unwrap().available_balance, Quantity::from_u64(70));
    }

    #[tokio::test]
    async fn test_reconcile_overwrites_cache_with_ledger() {
        let (tracker, _store) = setup(100, 80).await;
        let treasury = tracker.reconcile(&AssetId::new("PROP-001")).await.unwrap();
        assert_eq!(treasury.available_balance, Quantity::from_u64(80));
        assert!(treasury.last_reconciled_at.is_some());
    }

    #[tokio::test]
    async fn test_reconcile_all_reports_each_asset() {
        let (tracker, _store) = setup(5, 7).await;
        let results = tracker.reconcile_all().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
    }
}
