//! Shared fixture: one asset with a funded treasury, sandbox collaborators,
//! and helpers to create funded users.

#![allow(dead_code)]

use rust_decimal::Decimal;
use settlement::audit::InMemoryAuditLog;
use settlement::ledger::{InMemoryLedger, LedgerGateway};
use settlement::oracle::{AssetPair, FixedPriceOracle};
use settlement::store::{AccountDirectory, AssetStore, InMemoryStore, TreasuryStore};
use settlement::{EngineConfig, Exchange, Placement};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use types::asset::{Asset, AssetStatus};
use types::errors::ExchangeError;
use types::ids::{AssetId, LedgerAccountId, TokenId, UserId};
use types::numeric::Quantity;
use types::order::{NewOrder, Side};
use types::treasury::TreasuryAccount;

pub const TREASURY_SUPPLY: u64 = 100_000;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub struct Harness {
    pub exchange: Arc<Exchange>,
    pub store: Arc<InMemoryStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub oracle: Arc<FixedPriceOracle>,
    pub audit: Arc<InMemoryAuditLog>,
    pub asset_id: AssetId,
    pub token_id: TokenId,
    pub treasury_account: LedgerAccountId,
    next_account: AtomicU64,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_ledger(InMemoryLedger::new()).await
    }

    pub async fn with_ledger(ledger: InMemoryLedger) -> Self {
        Self::with_gateway(ledger, |ledger, _| ledger as Arc<dyn LedgerGateway>).await
    }

    /// Route the exchange's ledger calls through `wrap`; balances and
    /// funding still go to the in-memory ledger
    pub async fn with_gateway<F>(ledger: InMemoryLedger, wrap: F) -> Self
    where
        F: FnOnce(Arc<InMemoryLedger>, Arc<InMemoryStore>) -> Arc<dyn LedgerGateway>,
    {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let store = Arc::new(InMemoryStore::new());
        let ledger = Arc::new(ledger);
        let oracle = Arc::new(FixedPriceOracle::new().with_price(AssetPair::new("USD", "HBAR"), dec("2")));
        let audit = Arc::new(InMemoryAuditLog::new());

        let asset_id = AssetId::new("PROP-001");
        let token_id = TokenId::new("0.0.500");
        let treasury_account = LedgerAccountId::new("0.0.9001");

        store
            .upsert_asset(&Asset {
                asset_id: asset_id.clone(),
                name: "Harbour Lofts".to_string(),
                token_id: token_id.clone(),
                status: AssetStatus::Active,
                min_investment: None,
                max_investment: Some(dec("50000")),
                total_raised: Decimal::ZERO,
                tokens_sold: Quantity::zero(),
            })
            .await
            .unwrap();
        store
            .upsert_treasury(&TreasuryAccount::new(
                asset_id.clone(),
                treasury_account.clone(),
                Quantity::from_u64(TREASURY_SUPPLY),
            ))
            .await
            .unwrap();
        ledger.credit_token(&treasury_account, &token_id, Decimal::from(TREASURY_SUPPLY));

        let config = EngineConfig {
            ledger_retry_backoff_ms: 1,
            audit_timeout_ms: 200,
            ..EngineConfig::default()
        };
        let gateway = wrap(ledger.clone(), store.clone());
        let exchange = Arc::new(Exchange::new(
            config,
            store.clone(),
            gateway,
            oracle.clone(),
            audit.clone(),
        ));

        Self {
            exchange,
            store,
            ledger,
            oracle,
            audit,
            asset_id,
            token_id,
            treasury_account,
            next_account: AtomicU64::new(1000),
        }
    }

    /// A user with a bound ledger account holding the given balances
    pub async fn user(&self, native: &str, tokens: &str) -> UserId {
        let user = UserId::new();
        let account = LedgerAccountId::new(format!("0.0.{}", self.next_account.fetch_add(1, Ordering::SeqCst)));
        self.store.bind_account(user, account.clone()).await.unwrap();
        self.ledger.credit_native(&account, dec(native));
        if dec(tokens) > Decimal::ZERO {
            self.ledger.credit_token(&account, &self.token_id, dec(tokens));
        }
        user
    }

    pub async fn account(&self, user: UserId) -> LedgerAccountId {
        self.store.ledger_account(user).await.unwrap()
    }

    pub async fn native_of(&self, user: UserId) -> Decimal {
        self.ledger.native_balance(&self.account(user).await)
    }

    pub async fn tokens_of(&self, user: UserId) -> Decimal {
        self.ledger.token_balance(&self.account(user).await, &self.token_id)
    }

    pub fn new_order(&self, owner: UserId, side: Side, qty: &str, price: &str) -> NewOrder {
        NewOrder {
            asset_id: self.asset_id.clone(),
            side,
            owner_id: owner,
            token_amount: dec(qty),
            price_per_token: dec(price),
            currency: "HBAR".to_string(),
            expires_at: None,
            is_public: true,
        }
    }

    pub async fn place(&self, owner: UserId, side: Side, qty: &str, price: &str) -> Result<Placement, ExchangeError> {
        self.exchange.place_order(self.new_order(owner, side, qty, price)).await
    }
}
