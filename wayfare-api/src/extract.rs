use axum::{
    extract::{FromRequest, FromRequestParts},
    http::{request::Parts, HeaderMap},
};

use crate::error::ApiError;
use wayfare_shared::AppError;

pub const USER_ID_HEADER: &str = "X-User-ID";

/// `Json` whose rejection renders as an error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

fn header_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Caller identity taken from `X-User-ID`; required.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_user(&parts.headers)
            .map(UserId)
            .ok_or_else(|| ApiError(AppError::authentication("X-User-ID header is required")))
    }
}

/// Caller identity when present; anonymous otherwise.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(header_user(&parts.headers)))
    }
}
