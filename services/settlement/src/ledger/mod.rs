//! Ledger gateway
//!
//! The ledger is external, asynchronous and irreversible. Every mutating call
//! carries an [`IdempotencyKey`] so a resend cannot execute twice, and every
//! failure says whether the call is known not to have executed.

pub mod http;
pub mod memory;

pub use http::HttpLedgerGateway;
pub use memory::{InMemoryLedger, LedgerFault, LedgerOp};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use types::ids::{IdempotencyKey, LedgerAccountId, TokenId, TxRef};
use types::numeric::Quantity;
use types::trade::FailureKind;

/// What a balance query asks about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "token_id", rename_all = "snake_case")]
pub enum LedgerAsset {
    /// The network's native settlement currency
    Native,
    Token(TokenId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Opt-in for an account that already holds the association
    #[error("token already associated")]
    AlreadyAssociated,

    /// Verified not executed; safe to resend with the same key
    #[error("not executed: {code}")]
    NotExecuted { code: String },

    /// No acknowledgement; the call may or may not have executed
    #[error("ledger did not acknowledge in time")]
    Timeout,

    #[error("insufficient balance on the ledger account")]
    InsufficientBalance,

    #[error("rejected: {code}")]
    Rejected { code: String },

    #[error("ledger unavailable")]
    Unavailable,
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::NotExecuted { .. })
    }

    /// Classification of this error on the first leg of a settlement
    pub fn first_leg_kind(&self) -> FailureKind {
        match self {
            LedgerError::Timeout => FailureKind::Ambiguous,
            _ => FailureKind::Clean,
        }
    }

    /// Sanitized code stored on failed records and returned to callers
    pub fn code(&self) -> String {
        match self {
            LedgerError::AlreadyAssociated => "ALREADY_ASSOCIATED".to_string(),
            LedgerError::NotExecuted { .. } => "LEDGER_NOT_EXECUTED".to_string(),
            LedgerError::Timeout => "LEDGER_TIMEOUT".to_string(),
            LedgerError::InsufficientBalance => "LEDGER_INSUFFICIENT_BALANCE".to_string(),
            LedgerError::Rejected { code } => format!("LEDGER_REJECTED_{}", sanitize(code)),
            LedgerError::Unavailable => "LEDGER_UNAVAILABLE".to_string(),
        }
    }
}

fn sanitize(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(48)
        .collect::<String>()
        .to_ascii_uppercase()
}

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn transfer_token(
        &self,
        token_id: &TokenId,
        from: &LedgerAccountId,
        to: &LedgerAccountId,
        amount: Quantity,
        key: &IdempotencyKey,
    ) -> Result<TxRef, LedgerError>;

    async fn transfer_native(
        &self,
        from: &LedgerAccountId,
        to: &LedgerAccountId,
        amount: Decimal,
        memo: &str,
        key: &IdempotencyKey,
    ) -> Result<TxRef, LedgerError>;

    /// Associate `account` with `token_id` so it can receive the token
    async fn opt_in(&self, account: &LedgerAccountId, token_id: &TokenId, key: &IdempotencyKey) -> Result<(), LedgerError>;

    async fn balance_of(&self, account: &LedgerAccountId, asset: &LedgerAsset) -> Result<Decimal, LedgerError>;
}

/// Retry policy for calls the ledger verifies it did not execute
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `call` until it succeeds, fails non-retryably, or attempts run out.
    /// The closure must reuse the same idempotency key on every attempt.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!(operation, attempt, error = %err, "Ledger call not executed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Opt in, treating an existing association as success
pub async fn ensure_associated(
    ledger: &dyn LedgerGateway,
    retry: RetryPolicy,
    account: &LedgerAccountId,
    token_id: &TokenId,
) -> Result<(), LedgerError> {
    let key = IdempotencyKey::for_opt_in(account, token_id);
    match retry.run("opt_in", || ledger.opt_in(account, token_id, &key)).await {
        Ok(()) | Err(LedgerError::AlreadyAssociated) => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_only_not_executed_is_retryable() {
        assert!(LedgerError::NotExecuted { code: "BUSY".into() }.is_retryable());
        assert!(!LedgerError::Timeout.is_retryable());
        assert!(!LedgerError::InsufficientBalance.is_retryable());
    }

    #[test]
    fn test_timeout_is_ambiguous() {
        assert_eq!(LedgerError::Timeout.first_leg_kind(), FailureKind::Ambiguous);
        assert_eq!(LedgerError::InsufficientBalance.first_leg_kind(), FailureKind::Clean);
    }

    #[test]
    fn test_rejected_code_is_sanitized() {
        let err = LedgerError::Rejected { code: "account frozen: <script>".into() };
        assert_eq!(err.code(), "LEDGER_REJECTED_ACCOUNTFROZENSCRIPT");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let result: Result<(), _> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LedgerError::NotExecuted { code: "BUSY".into() }) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_never_resends_after_timeout() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let result: Result<(), _> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LedgerError::Timeout) }
            })
            .await;
        assert_eq!(result, Err(LedgerError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
