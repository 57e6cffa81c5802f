use crate::error::AppError;
use crate::models::RecentTradesQuery;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use matching_engine::{BookSnapshot, DepthChart};
use types::ids::AssetId;
use types::trade::Trade;

pub async fn get_order_book(
    State(state): State<AppState>,
    Path(asset_id): Path<AssetId>,
) -> Result<Json<BookSnapshot>, AppError> {
    Ok(Json(state.exchange.get_order_book(&asset_id).await?))
}

pub async fn get_depth(
    State(state): State<AppState>,
    Path(asset_id): Path<AssetId>,
) -> Result<Json<DepthChart>, AppError> {
    Ok(Json(state.exchange.get_depth(&asset_id).await?))
}

pub async fn get_recent_trades(
    State(state): State<AppState>,
    Path(asset_id): Path<AssetId>,
    Query(query): Query<RecentTradesQuery>,
) -> Result<Json<Vec<Trade>>, AppError> {
    Ok(Json(state.exchange.get_recent_trades(&asset_id, query.limit).await?))
}
