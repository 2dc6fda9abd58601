use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use super::{validate_payload, JsonBody};
use crate::{
    error::{BookingError, Result},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/authentication/token", post(create_token))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TokenRequest {
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 3, max = 72))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    success: bool,
    token: String,
}

/// POST /api/authentication/token
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<TokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    validate_payload(&req)?;

    // Неизвестный email и неверный пароль неотличимы для клиента
    let credentials = match state.users.credentials(&req.email).await {
        Ok(credentials) => credentials,
        Err(BookingError::NotFound(_)) => return Err(BookingError::Unauthenticated),
        Err(e) => return Err(e),
    };
    if !credentials.is_active {
        warn!("Token requested for inactive user {}", credentials.user_id);
        return Err(BookingError::Unauthenticated);
    }

    // bcrypt нагружает CPU, уводим с рантайма
    let hash = credentials.password_hash.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| BookingError::Internal(format!("password check panicked: {e}")))?
        .map_err(|e| BookingError::Internal(format!("stored password hash is invalid: {e}")))?;
    if !valid {
        return Err(BookingError::Unauthenticated);
    }

    let token = state.authenticator.issue(credentials.user_id)?;
    info!("Token issued for user {}", credentials.user_id);

    Ok((StatusCode::CREATED, Json(TokenResponse { success: true, token })))
}
