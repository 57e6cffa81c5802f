//! Primary issuance out of the asset treasury

mod common;

use common::{dec, Harness, TREASURY_SUPPLY};
use settlement::audit::AuditAction;
use settlement::ledger::{LedgerError, LedgerFault, LedgerOp};
use settlement::store::{AssetStore, InvestmentStore, TreasuryStore};
use types::asset::AssetStatus;
use types::errors::{ExchangeError, SettlementRecordRef, ValidationError};
use types::ids::InvestmentId;
use types::investment::InvestmentStatus;
use types::numeric::Quantity;
use types::trade::{FailureKind, SettlementLeg};
use types::treasury::{DecrementOutcome, TreasuryStatus};

#[tokio::test]
async fn test_investment_delivers_tokens() {
    let h = Harness::new().await;
    let investor = h.user("5000", "0").await;

    let investment = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("1000"))
        .await
        .unwrap();

    assert_eq!(investment.status, InvestmentStatus::Completed);
    assert_eq!(investment.exchange_rate, dec("2"));
    assert_eq!(investment.amount_native, dec("2000"));
    assert_eq!(investment.tokens_purchased, Quantity::from_u64(1000));
    assert!(investment.payment_tx.is_some() && investment.token_tx.is_some());

    assert_eq!(h.native_of(investor).await, dec("3000"));
    assert_eq!(h.tokens_of(investor).await, dec("1000"));
    assert_eq!(h.ledger.native_balance(&h.treasury_account), dec("2000"));

    let treasury = h.store.get_treasury(&h.asset_id).await.unwrap();
    assert_eq!(treasury.available_balance, Quantity::from_u64(TREASURY_SUPPLY - 1000));

    let asset = h.store.get_asset(&h.asset_id).await.unwrap();
    assert_eq!(asset.total_raised, dec("1000"));
    assert_eq!(asset.tokens_sold, Quantity::from_u64(1000));

    let actions: Vec<_> = h.audit.events().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::InvestmentPaymentReceived, AuditAction::InvestmentTokensDelivered]
    );
}

#[tokio::test]
async fn test_investment_bounds() {
    let h = Harness::new().await;
    let investor = h.user("1000000", "0").await;

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("5"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVESTMENT_OUT_OF_BOUNDS");

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("50001"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::Validation(ValidationError::InvestmentOutOfBounds { ref max, .. }) if max == "50000"
    ));

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("0"))
        .await
        .unwrap_err();
    assert_eq!(err, ExchangeError::Validation(ValidationError::NonPositiveInvestment));

    // Nothing was recorded or moved
    assert_eq!(h.ledger.call_count(LedgerOp::TransferNative), 0);
    assert!(h.audit.events().is_empty());
}

#[tokio::test]
async fn test_asset_min_raises_floor() {
    let h = Harness::new().await;
    let investor = h.user("100000", "0").await;
    let mut asset = h.store.get_asset(&h.asset_id).await.unwrap();
    asset.min_investment = Some(dec("250"));
    h.store.upsert_asset(&asset).await.unwrap();

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("100"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVESTMENT_OUT_OF_BOUNDS");

    h.exchange
        .execute_primary_investment(&h.asset_id, investor, dec("250"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_draft_asset_not_investable() {
    let h = Harness::new().await;
    let investor = h.user("5000", "0").await;
    let mut asset = h.store.get_asset(&h.asset_id).await.unwrap();
    asset.status = AssetStatus::Draft;
    h.store.upsert_asset(&asset).await.unwrap();

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("100"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ASSET_NOT_INVESTABLE");
}

#[tokio::test]
async fn test_suspended_treasury_rejected() {
    let h = Harness::new().await;
    let investor = h.user("5000", "0").await;
    let mut treasury = h.store.get_treasury(&h.asset_id).await.unwrap();
    treasury.status = TreasuryStatus::Suspended;
    h.store.upsert_treasury(&treasury).await.unwrap();

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("100"))
        .await
        .unwrap_err();
    assert_eq!(err, ExchangeError::TreasuryInactive { asset_id: h.asset_id.clone() });
}

#[tokio::test]
async fn test_supply_exhausted() {
    let h = Harness::new().await;
    let investor = h.user("5000", "0").await;
    let mut treasury = h.store.get_treasury(&h.asset_id).await.unwrap();
    treasury.available_balance = Quantity::from_u64(500);
    h.store.upsert_treasury(&treasury).await.unwrap();

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("1000"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ExchangeError::InsufficientTreasurySupply {
            requested: dec("1000"),
            available: dec("500"),
        }
    );
}

#[tokio::test]
async fn test_missing_price() {
    let h = Harness::new().await;
    let investor = h.user("5000", "0").await;
    h.oracle.remove_price(&settlement::oracle::AssetPair::new("USD", "HBAR"));

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("100"))
        .await
        .unwrap_err();
    assert_eq!(err, ExchangeError::PriceUnavailable { pair: "USD/HBAR".into() });
}

#[tokio::test]
async fn test_investor_without_funds() {
    let h = Harness::new().await;
    let investor = h.user("150", "0").await;

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("100"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ExchangeError::InsufficientFunds {
            required: dec("200"),
            available: dec("150"),
        }
    );
    assert_eq!(h.ledger.call_count(LedgerOp::TransferNative), 0);
}

#[tokio::test]
async fn test_payment_failure_is_clean() {
    let h = Harness::new().await;
    let investor = h.user("5000", "0").await;
    h.ledger.inject_fault(
        LedgerOp::TransferNative,
        LedgerFault::Reject(LedgerError::Rejected { code: "ACCOUNT_FROZEN".into() }),
    );

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("100"))
        .await
        .unwrap_err();
    let ExchangeError::LedgerLegFailure { leg, kind, record } = err else {
        panic!("expected a leg failure, got {err:?}");
    };
    assert_eq!(leg, SettlementLeg::Payment);
    assert_eq!(kind, FailureKind::Clean);

    let SettlementRecordRef::Investment(id) = record else {
        panic!("expected an investment record");
    };
    let investment = h.store.get_investment(id).await.unwrap();
    assert_eq!(investment.status, InvestmentStatus::Failed);

    assert_eq!(h.ledger.call_count(LedgerOp::TransferToken), 0);
    assert_eq!(h.native_of(investor).await, dec("5000"));
    let treasury = h.store.get_treasury(&h.asset_id).await.unwrap();
    assert_eq!(treasury.available_balance, Quantity::from_u64(TREASURY_SUPPLY));
    assert!(h.exchange.reconciliation_cases().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_token_failure_after_payment_is_partial() {
    let h = Harness::new().await;
    let investor = h.user("5000", "0").await;
    h.ledger.inject_fault(
        LedgerOp::TransferToken,
        LedgerFault::Reject(LedgerError::Rejected { code: "TREASURY_FROZEN".into() }),
    );

    let err = h
        .exchange
        .execute_primary_investment(&h.asset_id, investor, dec("100"))
        .await
        .unwrap_err();
    assert!(err.needs_reconciliation());
    assert_eq!(err.code(), "PARTIAL_SETTLEMENT");

    // Paid, but no tokens and no treasury decrement
    assert_eq!(h.native_of(investor).await, dec("4800"));
    assert_eq!(h.tokens_of(investor).await, dec("0"));
    let treasury = h.store.get_treasury(&h.asset_id).await.unwrap();
    assert_eq!(treasury.available_balance, Quantity::from_u64(TREASURY_SUPPLY));

    let cases = h.exchange.reconciliation_cases().await.unwrap();
    assert_eq!(cases.investments.len(), 1);
    let failure = cases.investments[0].failure.as_ref().unwrap();
    assert_eq!(failure.leg, SettlementLeg::Token);
    assert_eq!(failure.kind, FailureKind::PartialSettlement);
    assert!(cases.investments[0].payment_tx.is_some());

    let actions: Vec<_> = h.audit.events().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::InvestmentPaymentReceived, AuditAction::InvestmentFailed]
    );
}

#[tokio::test]
async fn test_treasury_decrement_is_keyed_by_investment() {
    let h = Harness::new().await;
    let investment_id = InvestmentId::new();
    let tracker = h.exchange.treasury();

    let first = tracker
        .decrement(&h.asset_id, Quantity::from_u64(10), investment_id)
        .await
        .unwrap();
    assert_eq!(
        first,
        DecrementOutcome::Applied {
            available_balance: Quantity::from_u64(TREASURY_SUPPLY - 10)
        }
    );

    let second = tracker
        .decrement(&h.asset_id, Quantity::from_u64(10), investment_id)
        .await
        .unwrap();
    assert_eq!(second, DecrementOutcome::AlreadyApplied);

    let treasury = h.store.get_treasury(&h.asset_id).await.unwrap();
    assert_eq!(treasury.available_balance, Quantity::from_u64(TREASURY_SUPPLY - 10));
}

#[tokio::test]
async fn test_reconcile_overwrites_cache_with_ledger() {
    let h = Harness::new().await;
    let mut treasury = h.store.get_treasury(&h.asset_id).await.unwrap();
    treasury.available_balance = Quantity::from_u64(7);
    h.store.upsert_treasury(&treasury).await.unwrap();

    let reconciled = h.exchange.reconcile_treasury(&h.asset_id).await.unwrap();
    assert_eq!(reconciled.available_balance, Quantity::from_u64(TREASURY_SUPPLY));
    assert!(reconciled.last_reconciled_at.is_some());
}
