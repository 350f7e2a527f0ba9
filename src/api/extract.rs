use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// JSON body whose parse failures answer 400 `{"error":"Invalid request"}`
/// instead of axum's plain-text 415/422.
pub struct Body<T>(pub T);

/// JSON body that must also pass its `Validate` rules.
pub struct Valid<T>(pub T);

/// Single numeric `:id` path segment.
#[derive(Debug, Clone, Copy)]
pub struct Id(pub i64);

pub const INVALID_ID: &str = "Invalid ID format";

/// Positive decimal identifier from a path segment.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request(INVALID_ID))
}

fn rejected(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::bad_request("Request body too large");
    }
    tracing::debug!("Rejected request body: {}", rejection.body_text());
    ApiError::bad_request("Invalid request")
}

#[async_trait]
impl<S, T> FromRequest<S> for Body<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(rejected)?;
        Ok(Body(value))
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Body(value) = Body::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Id
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::bad_request(INVALID_ID))?;
        parse_id(&raw).map(Id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("42").unwrap(), 42);
        for raw in ["0", "-3", "abc", "4.5", ""] {
            assert_eq!(parse_id(raw).unwrap_err().message(), INVALID_ID);
        }
    }
}
