//! In-process collaborators for local runs
//!
//! The seed file is the store seed plus opening ledger balances:
//!
//! ```json
//! {
//!   "assets": [...], "treasuries": [...], "accounts": [...],
//!   "native_balances": [{ "account": "0.0.1001", "amount": "5000" }],
//!   "token_balances": [{ "account": "0.0.9001", "token_id": "0.0.500", "amount": "100000" }]
//! }
//! ```

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use settlement::ledger::InMemoryLedger;
use settlement::store::StoreSeed;
use std::path::Path;
use types::ids::{LedgerAccountId, TokenId};

#[derive(Debug, Clone, Deserialize)]
pub struct NativeBalance {
    pub account: LedgerAccountId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenBalance {
    pub account: LedgerAccountId,
    pub token_id: TokenId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SandboxSeed {
    #[serde(flatten)]
    pub store: StoreSeed,
    pub native_balances: Vec<NativeBalance>,
    pub token_balances: Vec<TokenBalance>,
}

impl SandboxSeed {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading seed {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing seed {}", path.display()))
    }

    /// Store reference data, and a ledger holding the opening balances
    pub fn into_parts(self) -> (StoreSeed, InMemoryLedger) {
        let ledger = InMemoryLedger::new();
        for balance in &self.native_balances {
            ledger.credit_native(&balance.account, balance.amount);
        }
        for balance in &self.token_balances {
            ledger.credit_token(&balance.account, &balance.token_id, balance.amount);
        }
        tracing::info!(
            assets = self.store.assets.len(),
            accounts = self.store.accounts.len(),
            funded = self.native_balances.len() + self.token_balances.len(),
            "Sandbox seed loaded"
        );
        (self.store, ledger)
    }
}
