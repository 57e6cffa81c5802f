//! Audit log emission
//!
//! Audit events are best-effort: the emitter bounds each append with a
//! timeout and never lets a failure reach the caller's result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use types::errors::SettlementRecordRef;
use types::ids::{AssetId, TxRef, UserId};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    TradeSettled,
    TradeFailed,
    InvestmentPaymentReceived,
    InvestmentTokensDelivered,
    InvestmentFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub action: AuditAction,
    pub record: SettlementRecordRef,
    pub asset_id: AssetId,
    pub actor: UserId,
    /// Settlement-currency or fiat amount, depending on the action
    pub amount: Decimal,
    pub tx_ref: Option<TxRef>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        record: SettlementRecordRef,
        asset_id: AssetId,
        actor: UserId,
        amount: Decimal,
        tx_ref: Option<TxRef>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            action,
            record,
            asset_id,
            actor,
            amount,
            tx_ref,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit sink rejected the event: {0}")]
    Rejected(String),

    #[error("audit sink unavailable")]
    Unavailable,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
    failing: Mutex<bool>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Make every subsequent append fail
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|p| p.into_inner()) = failing;
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        if *self.failing.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(AuditError::Unavailable);
        }
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event.clone());
        Ok(())
    }
}

/// Posts events as JSON to `{base_url}/events`
#[derive(Debug, Clone)]
pub struct HttpAuditLog {
    client: Client,
    base_url: String,
}

impl HttpAuditLog {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AuditLog for HttpAuditLog {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let response = self
            .client
            .post(format!("{}/events", self.base_url))
            .json(event)
            .send()
            .await
            .map_err(|_| AuditError::Unavailable)?;
        if !response.status().is_success() {
            return Err(AuditError::Rejected(response.status().to_string()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditEmitter {
    log: Arc<dyn AuditLog>,
    timeout: Duration,
}

impl AuditEmitter {
    pub fn new(log: Arc<dyn AuditLog>, timeout: Duration) -> Self {
        Self { log, timeout }
    }

    pub async fn emit(&self, event: AuditEvent) {
        match tokio::time::timeout(self.timeout, self.log.append(&event)).await {
            Ok(Ok(())) => debug!(action = ?event.action, record = %event.record, "Audit event appended"),
            Ok(Err(err)) => warn!(action = ?event.action, record = %event.record, error = %err, "Audit append failed"),
            Err(_) => warn!(action = ?event.action, record = %event.record, "Audit append timed out"),
        }
    }
}
