use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;
use tracing::warn;

use crate::error::{BookingError, Result};
use crate::AppState;

/// Пользователь, предъявивший валидный bearer-токен.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub role: String,
    pub level: i32,
}

impl AuthUser {
    /// Пропускает, если уровень роли пользователя не ниже уровня `role`.
    pub async fn require_role(&self, state: &AppState, role: &str) -> Result<()> {
        let required = state.users.role_level(role).await?;
        if self.level < required {
            warn!("User {} ({}) lacks role {}", self.user_id, self.role, role);
            return Err(BookingError::Forbidden);
        }
        Ok(())
    }
}

// Bearer auth extractor
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(BookingError::Unauthenticated)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(BookingError::Unauthenticated)?;

        let user_id = state.authenticator.validate(token)?;

        // Удалённый или деактивированный пользователь с живым токеном
        let identity = match state.users.identity(user_id).await {
            Ok(identity) => identity,
            Err(BookingError::NotFound(_)) => return Err(BookingError::Unauthenticated),
            Err(e) => return Err(e),
        };

        Ok(AuthUser {
            user_id: identity.user_id,
            email: identity.email,
            role: identity.role,
            level: identity.level,
        })
    }
}
