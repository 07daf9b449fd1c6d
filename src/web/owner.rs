use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::LandwatchError;

pub const OWNER_HEADER: &str = "x-user-id";

/// Identity of the caller, set by the authenticating proxy in front of the
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = LandwatchError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Owner(value.to_string()))
            .ok_or(LandwatchError::Unauthorized)
    }
}
