use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use types::errors::{ExchangeError, StoreError};

/// Central error type for the Gateway application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Exchange(err) => exchange_status(err),
        }
    }
}

fn exchange_status(err: &ExchangeError) -> StatusCode {
    match err {
        ExchangeError::Validation(_) => StatusCode::BAD_REQUEST,
        ExchangeError::InsufficientBalance { .. }
        | ExchangeError::InsufficientTreasurySupply { .. }
        | ExchangeError::InsufficientFunds { .. }
        | ExchangeError::AssetNotInvestable { .. }
        | ExchangeError::TreasuryInactive { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ExchangeError::Unauthorized => StatusCode::FORBIDDEN,
        ExchangeError::InvalidState(_) | ExchangeError::Store(StoreError::VersionConflict { .. }) => {
            StatusCode::CONFLICT
        }
        ExchangeError::NotFound { .. } | ExchangeError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        ExchangeError::PriceUnavailable { .. } | ExchangeError::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ExchangeError::LedgerLegFailure { .. } => StatusCode::BAD_GATEWAY,
        ExchangeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            AppError::Unauthorized(msg) => ("UNAUTHORIZED", msg.clone()),
            AppError::BadRequest(msg) => ("BAD_REQUEST", msg.clone()),
            // Storage internals stay in the logs
            AppError::Exchange(err @ ExchangeError::Store(inner)) if status.is_server_error() => {
                tracing::error!(error = %inner, "Storage failure");
                (err.code(), "Internal server error".to_string())
            }
            AppError::Exchange(err) => (err.code(), err.to_string()),
        };

        let mut body = json!({
            "error": code,
            "message": message
        });
        if let AppError::Exchange(ExchangeError::LedgerLegFailure { record, .. }) = &self {
            body["record"] = json!(record);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::errors::{SettlementRecordRef, ValidationError};
    use types::ids::TradeId;
    use types::trade::{FailureKind, SettlementLeg};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ExchangeError::from(ValidationError::NonPositivePrice), StatusCode::BAD_REQUEST),
            (ExchangeError::Unauthorized, StatusCode::FORBIDDEN),
            (ExchangeError::InvalidState("filled".into()), StatusCode::CONFLICT),
            (
                ExchangeError::Store(StoreError::NotFound { entity: "order", id: "x".into() }),
                StatusCode::NOT_FOUND,
            ),
            (ExchangeError::PriceUnavailable { pair: "USD/HBAR".into() }, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_storage_detail_hidden() {
        let response = AppError::from(ExchangeError::Store(StoreError::Backend("disk full".into()))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_leg_failure_is_bad_gateway() {
        let err = ExchangeError::LedgerLegFailure {
            leg: SettlementLeg::Token,
            kind: FailureKind::PartialSettlement,
            record: SettlementRecordRef::Trade(TradeId::new()),
        };
        assert_eq!(AppError::from(err).status(), StatusCode::BAD_GATEWAY);
    }
}
