//! Unique identifier types for exchange entities
//!
//! Record ids use UUID v7 so they sort by creation time. Ledger-side
//! identifiers (accounts, tokens, transaction references) are opaque strings
//! owned by the ledger network.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new id with the current timestamp
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an order
    OrderId
);

uuid_id!(
    /// Unique identifier for a trade. Also the idempotency root for both settlement legs.
    TradeId
);

uuid_id!(
    /// Unique identifier for a primary issuance purchase
    InvestmentId
);

uuid_id!(
    /// Platform user (owner of orders, investor)
    UserId
);

string_id!(
    /// Tokenized asset identifier (one real-world property per asset)
    AssetId
);

string_id!(
    /// Ledger token type identifier, e.g. `0.0.48213`
    TokenId
);

string_id!(
    /// Ledger account identifier
    LedgerAccountId
);

string_id!(
    /// Durable transaction reference returned once the ledger acknowledges a call
    TxRef
);

/// Key attached to every ledger-mutating call so a resend after an ambiguous
/// timeout cannot execute twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn for_trade_leg(trade_id: &TradeId, leg: &str) -> Self {
        Self(format!("trade:{trade_id}:{leg}"))
    }

    pub fn for_investment_leg(investment_id: &InvestmentId, leg: &str) -> Self {
        Self(format!("investment:{investment_id}:{leg}"))
    }

    pub fn for_opt_in(account: &LedgerAccountId, token: &TokenId) -> Self {
        Self(format!("opt-in:{account}:{token}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_creation() {
        let id1 = OrderId::new();
        let id2 = OrderId::new();
        assert_ne!(id1, id2, "OrderIds should be unique");
    }

    #[test]
    fn test_order_ids_sort_by_creation() {
        let first = OrderId::new();
        let second = OrderId::new();
        assert!(first < second);
    }

    #[test]
    fn test_uuid_id_serialization() {
        let id = TradeId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: TradeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_string_id_serialization() {
        let asset = AssetId::new("PROP-001");
        let json = serde_json::to_string(&asset).unwrap();
        assert_eq!(json, "\"PROP-001\"");
    }

    #[test]
    fn test_idempotency_keys_distinguish_legs() {
        let trade_id = TradeId::new();
        let token = IdempotencyKey::for_trade_leg(&trade_id, "token");
        let payment = IdempotencyKey::for_trade_leg(&trade_id, "payment");
        assert_ne!(token, payment);
        assert!(token.as_str().starts_with("trade:"));
    }
}
