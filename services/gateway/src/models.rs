use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::AssetId;
use types::order::Side;

/// Order placement body; the owner comes from the caller
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub asset_id: AssetId,
    pub side: Side,
    pub token_amount: Decimal,
    pub price_per_token: Decimal,
    pub currency: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvestmentRequest {
    pub asset_id: AssetId,
    pub amount_fiat: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentTradesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiredOrdersResponse {
    pub expired: usize,
}
