//! Error taxonomy for the exchange
//!
//! Every public operation returns either a success payload or an
//! [`ExchangeError`]. Messages are safe to show to callers: ledger failures
//! carry the failed leg and a sanitized code, never raw ledger text.

use crate::ids::{AssetId, InvestmentId, TradeId};
use crate::numeric::NumericError;
use crate::order::OrderTransitionError;
use crate::trade::{FailureKind, SettlementLeg};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Top-level error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("insufficient token balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("insufficient treasury supply: requested {requested}, available {available}")]
    InsufficientTreasurySupply { requested: Decimal, available: Decimal },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("requester is not authorized for this order")]
    Unauthorized,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("asset {asset_id} is not open for investment (status {status})")]
    AssetNotInvestable { asset_id: AssetId, status: &'static str },

    #[error("treasury for asset {asset_id} is not active")]
    TreasuryInactive { asset_id: AssetId },

    #[error("no price available for {pair}")]
    PriceUnavailable { pair: String },

    #[error("{leg:?} leg failed ({kind:?}) for {record}")]
    LedgerLegFailure {
        leg: SettlementLeg,
        kind: FailureKind,
        record: SettlementRecordRef,
    },

    #[error("ledger unavailable")]
    LedgerUnavailable,

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl ExchangeError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::Validation(ValidationError::InvestmentOutOfBounds { .. }) => "INVESTMENT_OUT_OF_BOUNDS",
            ExchangeError::Validation(_) => "VALIDATION_ERROR",
            ExchangeError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ExchangeError::InsufficientTreasurySupply { .. } => "INSUFFICIENT_TREASURY_SUPPLY",
            ExchangeError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            ExchangeError::Unauthorized => "UNAUTHORIZED",
            ExchangeError::InvalidState(_) => "INVALID_STATE",
            ExchangeError::NotFound { .. } => "NOT_FOUND",
            ExchangeError::AssetNotInvestable { .. } => "ASSET_NOT_INVESTABLE",
            ExchangeError::TreasuryInactive { .. } => "TREASURY_INACTIVE",
            ExchangeError::PriceUnavailable { .. } => "PRICE_UNAVAILABLE",
            ExchangeError::LedgerLegFailure { kind: FailureKind::Clean, .. } => "LEDGER_LEG_FAILURE",
            ExchangeError::LedgerLegFailure { .. } => "PARTIAL_SETTLEMENT",
            ExchangeError::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            ExchangeError::Store(StoreError::NotFound { .. }) => "NOT_FOUND",
            ExchangeError::Store(_) => "STORAGE_ERROR",
        }
    }

    /// Partial or ambiguous settlement that needs an operator
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, ExchangeError::LedgerLegFailure { kind, .. } if kind.needs_reconciliation())
    }
}

impl From<NumericError> for ExchangeError {
    fn from(err: NumericError) -> Self {
        ExchangeError::Validation(ValidationError::from(err))
    }
}

impl From<OrderTransitionError> for ExchangeError {
    fn from(err: OrderTransitionError) -> Self {
        ExchangeError::InvalidState(err.to_string())
    }
}

/// Bad input, rejected before any state mutation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("token amount must be positive")]
    NonPositiveAmount,

    #[error("price per token must be positive")]
    NonPositivePrice,

    #[error("investment amount must be positive")]
    NonPositiveInvestment,

    #[error("investment of {amount} outside bounds [{min}, {max}]")]
    InvestmentOutOfBounds {
        amount: Decimal,
        min: Decimal,
        max: String,
    },

    #[error("unsupported currency {0}")]
    UnsupportedCurrency(String),

    #[error("expiry is in the past")]
    ExpiryInPast,

    #[error("{0}")]
    Numeric(#[from] NumericError),
}

/// Persistent store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} was modified concurrently")]
    VersionConflict { entity: &'static str, id: String },

    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: String },

    #[error("{entity} {id} is final and cannot be rewritten")]
    Immutable { entity: &'static str, id: String },

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Pointer to the Trade or Investment record left by a failed settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum SettlementRecordRef {
    Trade(TradeId),
    Investment(InvestmentId),
}

impl std::fmt::Display for SettlementRecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementRecordRef::Trade(id) => write!(f, "trade {id}"),
            SettlementRecordRef::Investment(id) => write!(f, "investment {id}"),
        }
    }
}
