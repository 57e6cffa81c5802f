//! External price lookup
//!
//! A missing or non-positive rate is a hard failure. There is no fallback
//! price.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

/// Units of `quote` per one unit of `base`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub base: String,
    pub quote: String,
}

impl AssetPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("no price for {0}")]
    UnknownPair(String),

    #[error("oracle unavailable")]
    Unavailable,
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price(&self, pair: &AssetPair) -> Result<Decimal, OracleError>;
}

/// Static rates, settable at runtime
#[derive(Debug, Default)]
pub struct FixedPriceOracle {
    prices: RwLock<HashMap<AssetPair, Decimal>>,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, pair: AssetPair, price: Decimal) -> Self {
        self.set_price(pair, price);
        self
    }

    pub fn set_price(&self, pair: AssetPair, price: Decimal) {
        self.prices
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(pair, price);
    }

    pub fn remove_price(&self, pair: &AssetPair) {
        self.prices
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(pair);
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn price(&self, pair: &AssetPair) -> Result<Decimal, OracleError> {
        self.prices
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(pair)
            .copied()
            .ok_or_else(|| OracleError::UnknownPair(pair.to_string()))
    }
}

#[derive(Deserialize)]
struct PriceResponse {
    price: Decimal,
}

/// `GET {base_url}/prices/{base}/{quote}` returning `{"price": "..."}`
#[derive(Debug, Clone)]
pub struct HttpPriceOracle {
    client: Client,
    base_url: String,
}

impl HttpPriceOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|_| OracleError::Unavailable)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn price(&self, pair: &AssetPair) -> Result<Decimal, OracleError> {
        let response = self
            .client
            .get(format!("{}/prices/{}/{}", self.base_url, pair.base, pair.quote))
            .send()
            .await
            .map_err(|_| OracleError::Unavailable)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(OracleError::UnknownPair(pair.to_string()));
        }
        if !response.status().is_success() {
            return Err(OracleError::Unavailable);
        }
        let body: PriceResponse = response.json().await.map_err(|_| OracleError::Unavailable)?;
        Ok(body.price)
    }
}
