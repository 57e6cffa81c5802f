//! Sandbox ledger
//!
//! Keeps balances and token associations in memory, deduplicates mutating
//! calls by idempotency key, and lets tests inject failures per operation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use types::ids::{IdempotencyKey, LedgerAccountId, TokenId, TxRef};
use types::numeric::Quantity;

use super::{LedgerAsset, LedgerError, LedgerGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    TransferToken,
    TransferNative,
    OptIn,
    BalanceOf,
}

/// An injected failure, consumed by the next call of its operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerFault {
    /// Fail without executing
    Reject(LedgerError),
    /// Execute the call, then report a timeout
    ExecuteThenTimeout,
}

#[derive(Debug, Default)]
struct LedgerState {
    native: HashMap<LedgerAccountId, Decimal>,
    tokens: HashMap<(LedgerAccountId, TokenId), Decimal>,
    associations: HashSet<(LedgerAccountId, TokenId)>,
    executed: HashMap<IdempotencyKey, TxRef>,
    faults: VecDeque<(LedgerOp, LedgerFault)>,
    calls: Vec<LedgerOp>,
    next_tx: u64,
}

impl LedgerState {
    fn take_fault(&mut self, op: LedgerOp) -> Option<LedgerFault> {
        let position = self.faults.iter().position(|(o, _)| *o == op)?;
        self.faults.remove(position).map(|(_, fault)| fault)
    }

    fn next_tx_ref(&mut self) -> TxRef {
        self.next_tx += 1;
        TxRef::new(format!("0.0.{}@sandbox", self.next_tx))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    latency: Option<Duration>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, to widen race windows in tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // A poisoned lock only means a test thread panicked mid-call
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn credit_native(&self, account: &LedgerAccountId, amount: Decimal) {
        *self.state().native.entry(account.clone()).or_default() += amount;
    }

    /// Credit tokens, associating the account first
    pub fn credit_token(&self, account: &LedgerAccountId, token_id: &TokenId, amount: Decimal) {
        let mut state = self.state();
        state.associations.insert((account.clone(), token_id.clone()));
        *state.tokens.entry((account.clone(), token_id.clone())).or_default() += amount;
    }

    pub fn associate(&self, account: &LedgerAccountId, token_id: &TokenId) {
        self.state().associations.insert((account.clone(), token_id.clone()));
    }

    pub fn native_balance(&self, account: &LedgerAccountId) -> Decimal {
        self.state().native.get(account).copied().unwrap_or_default()
    }

    pub fn token_balance(&self, account: &LedgerAccountId, token_id: &TokenId) -> Decimal {
        self.state()
            .tokens
            .get(&(account.clone(), token_id.clone()))
            .copied()
            .unwrap_or_default()
    }

    pub fn is_associated(&self, account: &LedgerAccountId, token_id: &TokenId) -> bool {
        self.state().associations.contains(&(account.clone(), token_id.clone()))
    }

    pub fn inject_fault(&self, op: LedgerOp, fault: LedgerFault) {
        self.state().faults.push_back((op, fault));
    }

    /// Every call received, in order, including rejected ones
    pub fn calls(&self) -> Vec<LedgerOp> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: LedgerOp) -> usize {
        self.state().calls.iter().filter(|c| **c == op).count()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Shared path for both transfer kinds
    fn transfer(
        &self,
        op: LedgerOp,
        key: &IdempotencyKey,
        apply: impl FnOnce(&mut LedgerState) -> Result<(), LedgerError>,
    ) -> Result<TxRef, LedgerError> {
        let mut state = self.state();
        state.calls.push(op);

        if let Some(tx) = state.executed.get(key) {
            debug!(key = %key, "Duplicate ledger call, returning original receipt");
            return Ok(tx.clone());
        }

        let timeout_after = match state.take_fault(op) {
            Some(LedgerFault::Reject(err)) => return Err(err),
            Some(LedgerFault::ExecuteThenTimeout) => true,
            None => false,
        };

        apply(&mut *state)?;
        let tx = state.next_tx_ref();
        state.executed.insert(key.clone(), tx.clone());

        if timeout_after {
            return Err(LedgerError::Timeout);
        }
        Ok(tx)
    }
}

fn debit(balance: &mut Decimal, amount: Decimal) -> Result<(), LedgerError> {
    if *balance < amount {
        return Err(LedgerError::InsufficientBalance);
    }
    *balance -= amount;
    Ok(())
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn transfer_token(
        &self,
        token_id: &TokenId,
        from: &LedgerAccountId,
        to: &LedgerAccountId,
        amount: Quantity,
        key: &IdempotencyKey,
    ) -> Result<TxRef, LedgerError> {
        self.delay().await;
        self.transfer(LedgerOp::TransferToken, key, |state| {
            if !state.associations.contains(&(to.clone(), token_id.clone())) {
                return Err(LedgerError::Rejected {
                    code: "TOKEN_NOT_ASSOCIATED_TO_ACCOUNT".to_string(),
                });
            }
            let amount = amount.as_decimal();
            debit(state.tokens.entry((from.clone(), token_id.clone())).or_default(), amount)?;
            *state.tokens.entry((to.clone(), token_id.clone())).or_default() += amount;
            Ok(())
        })
    }

    async fn transfer_native(
        &self,
        from: &LedgerAccountId,
        to: &LedgerAccountId,
        amount: Decimal,
        memo: &str,
        key: &IdempotencyKey,
    ) -> Result<TxRef, LedgerError> {
        self.delay().await;
        debug!(from = %from, to = %to, %amount, memo, "Sandbox native transfer");
        self.transfer(LedgerOp::TransferNative, key, |state| {
            debit(state.native.entry(from.clone()).or_default(), amount)?;
            *state.native.entry(to.clone()).or_default() += amount;
            Ok(())
        })
    }

    async fn opt_in(&self, account: &LedgerAccountId, token_id: &TokenId, _key: &IdempotencyKey) -> Result<(), LedgerError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.push(LedgerOp::OptIn);
        let timeout_after = match state.take_fault(LedgerOp::OptIn) {
            Some(LedgerFault::Reject(err)) => return Err(err),
            Some(LedgerFault::ExecuteThenTimeout) => true,
            None => false,
        };
        if !state.associations.insert((account.clone(), token_id.clone())) {
            return Err(LedgerError::AlreadyAssociated);
        }
        if timeout_after {
            return Err(LedgerError::Timeout);
        }
        Ok(())
    }

    async fn balance_of(&self, account: &LedgerAccountId, asset: &LedgerAsset) -> Result<Decimal, LedgerError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.push(LedgerOp::BalanceOf);
        if let Some(LedgerFault::Reject(err)) = state.take_fault(LedgerOp::BalanceOf) {
            return Err(err);
        }
        let balance = match asset {
            LedgerAsset::Native => state.native.get(account).copied(),
            LedgerAsset::Token(token_id) => state.tokens.get(&(account.clone(), token_id.clone())).copied(),
        };
        Ok(balance.unwrap_or_default())
    }
}
