use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::error::ApiError;
use crate::api::ApiState;
use crate::jobs::{BrandAccess, TenantScope};

pub const SERVICE_TOKEN_HEADER: &str = "x-service-token";

/// Caller identified by a Bearer session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("expected Authorization: Bearer <token>".into())
        })?;

        let claims = state
            .jwt
            .validate_token(token)
            .map_err(|_| ApiError::Unauthorized("invalid or expired token".into()))?;

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}

impl AuthUser {
    /// Resolve the caller's tenant scope for `brand_id`, checking membership
    /// first. This is the authorization boundary for every job read.
    pub async fn scope_for(&self, state: &ApiState, brand_id: &str) -> Result<TenantScope, ApiError> {
        let brand_id = brand_id.trim();
        if brand_id.is_empty() {
            return Err(ApiError::NotFound("brandId is required".into()));
        }

        match state
            .tracker
            .store()
            .brand_access(brand_id, &self.user_id)
            .await?
        {
            BrandAccess::Granted => Ok(TenantScope::new(brand_id, self.user_id.clone())),
            BrandAccess::Denied => {
                tracing::warn!(user_id = %self.user_id, %brand_id, "brand access denied");
                Err(ApiError::Forbidden(format!("no access to brand {brand_id}")))
            }
            BrandAccess::UnknownBrand => Err(ApiError::NotFound(format!("brand {brand_id}"))),
        }
    }
}

/// The external agent service, identified by the shared service token.
#[derive(Debug, Clone, Copy)]
pub struct ServiceCaller;

#[async_trait]
impl FromRequestParts<ApiState> for ServiceCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.service_token.as_deref() else {
            return Err(ApiError::Unauthorized("agent callbacks are disabled".into()));
        };

        let provided = parts
            .headers
            .get(SERVICE_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());

        match provided {
            Some(token) if token == expected => Ok(ServiceCaller),
            _ => Err(ApiError::Unauthorized("invalid service token".into())),
        }
    }
}
