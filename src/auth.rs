use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::JwtConfig;
use crate::error::{BookingError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    iss: String,
    iat: i64,
    exp: i64,
}

/// Выпуск и проверка bearer-токенов (HS256).
#[derive(Clone)]
pub struct JwtAuthenticator {
    secret: String,
    issuer: String,
    ttl: Duration,
}

impl JwtAuthenticator {
    pub fn from_config(config: &JwtConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            issuer: config.issuer.clone(),
            ttl: Duration::hours(config.expires_in_hours),
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| BookingError::Internal(format!("token encoding failed: {e}")))
    }

    /// Возвращает id пользователя из валидного токена.
    pub fn validate(&self, token: &str) -> Result<i64> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            BookingError::Unauthenticated
        })?;
        Ok(data.claims.sub)
    }
}
