//! JSON client for a ledger bridge service
//!
//! The bridge signs and submits transactions on the engine's behalf and
//! deduplicates by the `Idempotency-Key` header.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use types::ids::{IdempotencyKey, LedgerAccountId, TokenId, TxRef};
use types::numeric::Quantity;

use super::{LedgerAsset, LedgerError, LedgerGateway};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Serialize)]
struct TokenTransferRequest<'a> {
    token_id: &'a TokenId,
    from: &'a LedgerAccountId,
    to: &'a LedgerAccountId,
    amount: Quantity,
}

#[derive(Serialize)]
struct NativeTransferRequest<'a> {
    from: &'a LedgerAccountId,
    to: &'a LedgerAccountId,
    amount: Decimal,
    memo: &'a str,
}

#[derive(Serialize)]
struct AssociationRequest<'a> {
    account: &'a LedgerAccountId,
    token_id: &'a TokenId,
}

#[derive(Deserialize)]
struct ReceiptResponse {
    tx_ref: TxRef,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Clone)]
pub struct HttpLedgerGateway {
    client: Client,
    base_url: String,
}

impl HttpLedgerGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|_| LedgerError::Unavailable)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_mutation<B: Serialize>(&self, path: &str, body: &B, key: &IdempotencyKey) -> Result<Response, LedgerError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(IDEMPOTENCY_HEADER, key.as_str())
            .json(body)
            .send()
            .await
            .map_err(classify_send_error)?;
        check_status(response).await
    }
}

/// A request that never reached the bridge is known not to have executed;
/// anything after the connection is established is ambiguous.
fn classify_send_error(err: reqwest::Error) -> LedgerError {
    if err.is_connect() || err.is_builder() {
        LedgerError::NotExecuted {
            code: "CONNECT".to_string(),
        }
    } else {
        LedgerError::Timeout
    }
}

async fn check_status(response: Response) -> Result<Response, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: ErrorBody = response.json().await.unwrap_or_default();
    debug!(%status, code = %body.code, "Ledger bridge returned an error");
    Err(map_error(status, body.code))
}

fn map_error(status: StatusCode, code: String) -> LedgerError {
    match code.as_str() {
        "TOKEN_ALREADY_ASSOCIATED_TO_ACCOUNT" | "ALREADY_ASSOCIATED" => return LedgerError::AlreadyAssociated,
        "INSUFFICIENT_ACCOUNT_BALANCE" | "INSUFFICIENT_TOKEN_BALANCE" | "INSUFFICIENT_BALANCE" => {
            return LedgerError::InsufficientBalance
        }
        "BUSY" | "PLATFORM_NOT_ACTIVE" | "DUPLICATE_TRANSACTION_PENDING" => return LedgerError::NotExecuted { code },
        _ => {}
    }
    match status {
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => LedgerError::NotExecuted { code },
        StatusCode::GATEWAY_TIMEOUT | StatusCode::INTERNAL_SERVER_ERROR | StatusCode::BAD_GATEWAY => LedgerError::Timeout,
        _ => LedgerError::Rejected {
            code: if code.is_empty() { status.as_u16().to_string() } else { code },
        },
    }
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn transfer_token(
        &self,
        token_id: &TokenId,
        from: &LedgerAccountId,
        to: &LedgerAccountId,
        amount: Quantity,
        key: &IdempotencyKey,
    ) -> Result<TxRef, LedgerError> {
        let body = TokenTransferRequest { token_id, from, to, amount };
        let response = self.post_mutation("/token-transfers", &body, key).await?;
        let receipt: ReceiptResponse = response.json().await.map_err(|_| LedgerError::Timeout)?;
        Ok(receipt.tx_ref)
    }

    async fn transfer_native(
        &self,
        from: &LedgerAccountId,
        to: &LedgerAccountId,
        amount: Decimal,
        memo: &str,
        key: &IdempotencyKey,
    ) -> Result<TxRef, LedgerError> {
        let body = NativeTransferRequest { from, to, amount, memo };
        let response = self.post_mutation("/native-transfers", &body, key).await?;
        let receipt: ReceiptResponse = response.json().await.map_err(|_| LedgerError::Timeout)?;
        Ok(receipt.tx_ref)
    }

    async fn opt_in(&self, account: &LedgerAccountId, token_id: &TokenId, key: &IdempotencyKey) -> Result<(), LedgerError> {
        let body = AssociationRequest { account, token_id };
        self.post_mutation("/associations", &body, key).await?;
        Ok(())
    }

    async fn balance_of(&self, account: &LedgerAccountId, asset: &LedgerAsset) -> Result<Decimal, LedgerError> {
        let asset_param = match asset {
            LedgerAsset::Native => "native",
            LedgerAsset::Token(token_id) => token_id.as_str(),
        };
        let response = self
            .client
            .get(format!("{}/accounts/{}/balances?asset={}", self.base_url, account, asset_param))
            .send()
            .await
            .map_err(|_| LedgerError::Unavailable)?;
        let response = check_status(response).await?;
        let body: BalanceResponse = response.json().await.map_err(|_| LedgerError::Unavailable)?;
        Ok(body.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_win_over_status() {
        assert_eq!(
            map_error(StatusCode::CONFLICT, "TOKEN_ALREADY_ASSOCIATED_TO_ACCOUNT".into()),
            LedgerError::AlreadyAssociated
        );
        assert_eq!(
            map_error(StatusCode::BAD_REQUEST, "INSUFFICIENT_ACCOUNT_BALANCE".into()),
            LedgerError::InsufficientBalance
        );
    }

    #[test]
    fn test_status_fallbacks() {
        assert!(map_error(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_retryable());
        assert_eq!(map_error(StatusCode::GATEWAY_TIMEOUT, String::new()), LedgerError::Timeout);
        assert_eq!(
            map_error(StatusCode::FORBIDDEN, String::new()),
            LedgerError::Rejected { code: "403".into() }
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gateway = HttpLedgerGateway::new("http://bridge.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(gateway.base_url, "http://bridge.local");
    }
}
