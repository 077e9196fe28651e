//! Caller identity asserted by the upstream identity provider.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::ApiError;
use crate::constants::headers;
use crate::domain::CallerIdentity;

/// Extracts [`CallerIdentity`] from `X-User-Id` (required) and
/// `X-Company-Id` (optional).
#[derive(Debug, Clone)]
pub struct Caller(pub CallerIdentity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(headers::USER_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Missing caller identity"))?;

        let mut caller = CallerIdentity::new(user_id);

        if let Some(raw) = parts.headers.get(headers::COMPANY_ID) {
            let company_id = raw
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<i32>().ok())
                .ok_or_else(|| ApiError::validation("Invalid X-Company-Id header"))?;
            caller = caller.with_company(company_id);
        }

        let span = tracing::Span::current();
        span.record("user_id", caller.user_id.as_str());
        if let Some(company_id) = caller.company_id {
            span.record("company_id", company_id);
        }

        Ok(Self(caller))
    }
}
