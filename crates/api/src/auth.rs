//! Caller identity
//!
//! Authentication and authorization live upstream; the gateway verifies the
//! session and forwards the tenant owner's id in `x-owner-id`. This
//! extractor only validates that the header is present and a well-formed
//! UUID.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

pub const OWNER_ID_HEADER: &str = "x-owner-id";

/// The authenticated tenant owner, as resolved by the upstream gateway
#[derive(Debug, Clone, Copy)]
pub struct AuthOwner(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthOwner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner_id = parts
            .headers
            .get(OWNER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or(ApiError::Unauthorized)?;

        Ok(AuthOwner(owner_id))
    }
}
