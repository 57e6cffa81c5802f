use crate::error::AppError;
use axum::{extract::FromRequestParts, http::request::Parts};
use types::ids::UserId;
use uuid::Uuid;

/// Header carrying the authenticated user, set by the upstream identity proxy
pub const USER_HEADER: &str = "X-User-Id";

/// The user on whose behalf a request is made
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: UserId,
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing authentication credentials".to_string()))?;
        let value = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid header string".into()))?;
        let uuid = Uuid::parse_str(value.trim()).map_err(|_| AppError::Unauthorized("Malformed user id".into()))?;

        Ok(Caller {
            user_id: UserId::from_uuid(uuid),
        })
    }
}
