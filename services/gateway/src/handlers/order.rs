use crate::auth::Caller;
use crate::error::AppError;
use crate::models::CreateOrderRequest;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use settlement::Placement;
use types::ids::OrderId;
use types::order::{NewOrder, Order};

pub async fn create_order(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Placement>), AppError> {
    let request = NewOrder {
        asset_id: payload.asset_id,
        side: payload.side,
        owner_id: caller.user_id,
        token_amount: payload.token_amount,
        price_per_token: payload.price_per_token,
        currency: payload.currency,
        expires_at: payload.expires_at,
        is_public: payload.is_public,
    };
    let placement = state.exchange.place_order(request).await?;
    Ok((StatusCode::CREATED, Json(placement)))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    let order = state.exchange.cancel_order(order_id, caller.user_id).await?;
    Ok(Json(order))
}

/// The caller's orders, newest first
pub async fn list_my_orders(State(state): State<AppState>, caller: Caller) -> Result<Json<Vec<Order>>, AppError> {
    let orders = state.exchange.get_user_orders(caller.user_id).await?;
    Ok(Json(orders))
}
