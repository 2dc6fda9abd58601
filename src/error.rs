//! Доменные ошибки бронирования и их отображение в HTTP-ответы.
//!
//! Ошибки хранилища (sqlx, redis) переводятся в `BookingError` на границе
//! store-слоя и дальше не пробрасываются.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("seat is already reserved for this session")]
    AlreadyReserved,

    #[error("seat {seat_id} does not belong to the room of session {session_id}")]
    InvalidRelation { session_id: i64, seat_id: i64 },

    #[error("authentication failed")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("bad payload: {0}")]
    BadPayload(String),

    /// Таймаут или обрыв соединения; вызывающий может повторить запрос.
    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BookingError>;

impl BookingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::AlreadyReserved => StatusCode::CONFLICT,
            BookingError::InvalidRelation { .. } | BookingError::BadPayload(_) => StatusCode::BAD_REQUEST,
            BookingError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BookingError::Forbidden => StatusCode::FORBIDDEN,
            BookingError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            BookingError::Gateway(_) => StatusCode::BAD_GATEWAY,
            BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Сообщение для клиента. Детали хранилища и шлюза наружу не отдаём.
    fn public_message(&self) -> String {
        match self {
            BookingError::AlreadyReserved => "seat unavailable".to_string(),
            BookingError::Transient(_) => "service temporarily unavailable, retry later".to_string(),
            BookingError::Gateway(_) => "payment gateway error, retry later".to_string(),
            BookingError::Internal(_) => "the server encountered an internal error".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ApiError {
    success: bool,
    message: String,
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            BookingError::Internal(_) | BookingError::Transient(_) | BookingError::Gateway(_) => {
                tracing::error!(error = %self, "request failed");
            }
            _ => tracing::warn!(error = %self, "request rejected"),
        }

        let body = ApiError {
            success: false,
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
