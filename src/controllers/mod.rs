pub mod auth;
pub mod payment;
pub mod seats;
pub mod tickets;

use axum::{
    extract::{FromRequest, Json, Request},
    Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use validator::Validate;

use crate::error::{BookingError, Result};

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(payment::routes())
        .merge(seats::routes())
        .merge(tickets::routes())
}

pub(crate) fn validate_payload<T: Validate>(payload: &T) -> Result<()> {
    payload
        .validate()
        .map_err(|e| BookingError::BadPayload(e.to_string()))
}

/// `Json` с ошибками разбора в общем формате `{success, message}`.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = BookingError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| BookingError::BadPayload(rejection.body_text()))?;
        Ok(Self(value))
    }
}
