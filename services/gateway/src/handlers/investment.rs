use crate::auth::Caller;
use crate::error::AppError;
use crate::models::InvestmentRequest;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use types::investment::Investment;

pub async fn create_investment(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<InvestmentRequest>,
) -> Result<(StatusCode, Json<Investment>), AppError> {
    let investment = state
        .exchange
        .execute_primary_investment(&payload.asset_id, caller.user_id, payload.amount_fiat)
        .await?;
    Ok((StatusCode::CREATED, Json(investment)))
}
