//! Engine configuration
//!
//! Every field has a default so a partial config file (or none at all)
//! deserializes into a working sandbox setup.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use types::fee::FeeSchedule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fraction of each trade's total deducted from the seller's proceeds
    pub platform_fee_rate: Decimal,
    /// The only currency orders may be priced in
    pub settlement_currency: String,
    /// Currency primary investments are denominated in
    pub fiat_currency: String,
    /// Smallest primary investment accepted regardless of asset bounds
    pub min_investment_floor: Decimal,
    /// Tokens issued per fiat unit invested
    pub tokens_per_fiat_unit: Decimal,
    /// Attempts per ledger call when the ledger reports it did not execute
    pub ledger_max_attempts: u32,
    pub ledger_retry_backoff_ms: u64,
    pub audit_timeout_ms: u64,
    pub reconciliation_interval_secs: u64,
    pub max_recent_trades: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::new(5, 3),
            settlement_currency: "HBAR".to_string(),
            fiat_currency: "USD".to_string(),
            min_investment_floor: Decimal::from(10),
            tokens_per_fiat_unit: Decimal::ONE,
            ledger_max_attempts: 3,
            ledger_retry_backoff_ms: 200,
            audit_timeout_ms: 2_000,
            reconciliation_interval_secs: 300,
            max_recent_trades: 500,
        }
    }
}

impl EngineConfig {
    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.platform_fee_rate)
    }

    pub fn ledger_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.ledger_retry_backoff_ms)
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_secs(self.reconciliation_interval_secs)
    }
}
