//! Admin authentication

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use subtle::ConstantTimeEq;

use crate::AppState;

use super::ApiError;

/// Request authenticated with the admin bearer token
#[derive(Debug, Clone)]
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.security.admin_token.as_deref() else {
            tracing::debug!("Admin API called but no admin token is configured");
            return Err(ApiError::Forbidden);
        };

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        if !bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(ApiError::Unauthorized);
        }

        Ok(AdminAuth)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;
    use crate::config::AppConfig;
    use crate::terminal::testing::FakeProvider;

    const TOKEN: &str = "test-admin-token-0123";

    fn state() -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.security.admin_token = Some(TOKEN.to_string());
        AppState::new(config, Arc::new(FakeProvider::new()))
    }

    async fn authorize(header: Option<&str>) -> Result<AdminAuth, ApiError> {
        let mut request = Request::builder().uri("/api/v1/admin/sessions");
        if let Some(value) = header {
            request = request.header(AUTHORIZATION, value);
        }
        let (mut parts, _) = request.body(()).unwrap().into_parts();
        AdminAuth::from_request_parts(&mut parts, &state()).await
    }

    #[tokio::test]
    async fn test_bearer_token_comparison() {
        assert!(authorize(Some(format!("Bearer {}", TOKEN).as_str())).await.is_ok());

        // Same length, last byte differs
        assert!(matches!(
            authorize(Some("Bearer test-admin-token-0124")).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            authorize(Some("Bearer test")).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            authorize(Some(TOKEN)).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(authorize(None).await, Err(ApiError::Unauthorized)));
    }
}
