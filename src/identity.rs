//! Authenticated principal as forwarded by the upstream auth layer.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::utils::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub role: String,
}

impl Principal {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            role: "user".to_string(),
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            role: "admin".to_string(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Whether this principal may see an order owned by `owner`. Guest
    /// orders are visible to anyone holding their order number.
    pub fn can_view(&self, owner: Option<i64>) -> bool {
        self.is_admin() || owner.map_or(true, |id| id == self.user_id)
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let raw_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?;
        let user_id = raw_id
            .trim()
            .parse()
            .map_err(|_| AppError::AuthError("Invalid user identity".to_string()))?;
        let role = headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|r| r.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "user".to_string());
        Ok(Self { user_id, role })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

/// Extractor that only admits principals with the admin role.
#[derive(Debug, Clone)]
pub struct Admin(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Admin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_headers(&parts.headers)?;
        if !principal.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Admin(principal))
    }
}
