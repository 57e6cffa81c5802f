//! Tokenized asset metadata and funding aggregates

use crate::ids::{AssetId, TokenId};
use crate::numeric::Quantity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Draft,
    Active,
    Tokenized,
    Closed,
}

impl AssetStatus {
    /// Open for primary investment
    pub fn is_investable(&self) -> bool {
        matches!(self, AssetStatus::Active | AssetStatus::Tokenized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Draft => "draft",
            AssetStatus::Active => "active",
            AssetStatus::Tokenized => "tokenized",
            AssetStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: AssetId,
    pub name: String,
    pub token_id: TokenId,
    pub status: AssetStatus,
    #[serde(default)]
    pub min_investment: Option<Decimal>,
    #[serde(default)]
    pub max_investment: Option<Decimal>,
    /// Fiat raised through primary issuance
    #[serde(default)]
    pub total_raised: Decimal,
    #[serde(default = "Quantity::zero")]
    pub tokens_sold: Quantity,
}

impl Asset {
    pub fn record_funding(&mut self, amount_fiat: Decimal, tokens: Quantity) {
        self.total_raised += amount_fiat;
        self.tokens_sold = self.tokens_sold + tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_investable_statuses() {
        assert!(AssetStatus::Active.is_investable());
        assert!(AssetStatus::Tokenized.is_investable());
        assert!(!AssetStatus::Draft.is_investable());
        assert!(!AssetStatus::Closed.is_investable());
    }

    #[test]
    fn test_asset_deserializes_with_defaults() {
        let json = r#"{"asset_id":"PROP-001","name":"Harbor Loft","token_id":"0.0.500","status":"tokenized"}"#;
        let asset: Asset = serde_json::from_str(json).unwrap();
        assert_eq!(asset.total_raised, Decimal::ZERO);
        assert!(asset.tokens_sold.is_zero());
        assert!(asset.min_investment.is_none());
    }
}
