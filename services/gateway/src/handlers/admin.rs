//! Operator endpoints. Expected to sit behind the internal network boundary.

use crate::error::AppError;
use crate::models::ExpiredOrdersResponse;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use settlement::ReconciliationCases;
use types::ids::AssetId;
use types::treasury::TreasuryAccount;

pub async fn reconciliation_cases(State(state): State<AppState>) -> Result<Json<ReconciliationCases>, AppError> {
    Ok(Json(state.exchange.reconciliation_cases().await?))
}

pub async fn reconcile_treasury(
    State(state): State<AppState>,
    Path(asset_id): Path<AssetId>,
) -> Result<Json<TreasuryAccount>, AppError> {
    Ok(Json(state.exchange.reconcile_treasury(&asset_id).await?))
}

pub async fn expire_orders(State(state): State<AppState>) -> Result<Json<ExpiredOrdersResponse>, AppError> {
    let expired = state.exchange.expire_orders(Utc::now()).await?;
    Ok(Json(ExpiredOrdersResponse { expired: expired.len() }))
}
