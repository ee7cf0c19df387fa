use crate::errors::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderValue},
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ANONYMOUS_USER_KEY: &str = "anonymous_user";

/// Who a request acts for, taken from the `X-User-ID` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(String),
}

impl Caller {
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(id) if !id.is_empty() => Caller::User(id.to_string()),
            _ => Caller::Anonymous,
        }
    }

    /// Header bytes that are not UTF-8 are rejected rather than mapped to
    /// the anonymous records.
    pub fn from_header_value(value: Option<&HeaderValue>) -> Result<Self, AppError> {
        let id = value
            .map(|value| std::str::from_utf8(value.as_bytes()))
            .transpose()
            .map_err(|_| AppError::bad_request("X-User-ID must be valid UTF-8"))?;
        Ok(Self::from_header(id))
    }

    /// Key under which this caller's records live in the progress document.
    pub fn storage_key(&self) -> &str {
        match self {
            Caller::Anonymous => ANONYMOUS_USER_KEY,
            Caller::User(id) => id.as_str(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_header_value(parts.headers.get(USER_ID_HEADER))
    }
}
