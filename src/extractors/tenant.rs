//! Extract the tenant bound by the tenant middleware.

use crate::error::TenancyError;
use crate::middleware::TenantRequest;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};

/// Extractor for the [`TenantRequest`] attached by the tenant middleware.
/// Rejects with a server error when the middleware is not installed.
#[derive(Clone)]
pub struct CurrentTenant(pub TenantRequest);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = TenancyError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantRequest>()
            .cloned()
            .map(CurrentTenant)
            .ok_or(TenancyError::MissingContext)
    }
}
