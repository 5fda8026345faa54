//! Caller identity, as forwarded by the authenticating gateway.
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::error::ApiError;
use crate::error::RegoError;
use crate::types::{ConsumerId, ProviderId};

pub const PROVIDER_HEADER: &str = "x-provider-id";
pub const CONSUMER_HEADER: &str = "x-consumer-id";

/// The authenticated provider making the request.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCaller(pub ProviderId);

/// The authenticated consumer making the request.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerCaller(pub ConsumerId);

fn caller_id(parts: &Parts, header: &'static str) -> Result<u64, ApiError> {
    let value = parts
        .headers
        .get(header)
        .ok_or_else(|| RegoError::unauthorized(format!("missing {header} header")))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| RegoError::unauthorized(format!("malformed {header} header")).into())
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ProviderCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_id(parts, PROVIDER_HEADER).map(ProviderCaller)
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ConsumerCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_id(parts, CONSUMER_HEADER).map(ConsumerCaller)
    }
}
