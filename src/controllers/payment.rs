use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use validator::Validate;

use super::{validate_payload, JsonBody};
use crate::{
    error::{BookingError, Result},
    middleware::AuthUser,
    models::{Ticket, TicketStatus},
    services::{Checkout, Refresh},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments/create", post(create_payment))
        .route("/payments/tickets/{ticket_id}", post(pay_for_ticket))
        .route("/payments/callback", post(payment_callback))
        .route("/payments/callback/{order_id}", post(payment_callback_for_order))
        .route("/payments/{ticket_id}/status", get(payment_status))
}

// --- Request/Response структуры ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(range(min = 1))]
    pub session_id: i64,
    #[validate(range(min = 1))]
    pub seat_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentCreatedResponse {
    success: bool,
    order_id: i64,
    status: String,
    url: String,
    amount: f64,
    currency: String,
}

/// Уведомление провайдера в том виде, в каком оно пришло.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallbackEnvelope {
    pub data: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    status: TicketStatus,
}

/// Провайдер шлёт форму, но принимаем и JSON с теми же полями.
pub fn parse_envelope(content_type: Option<&str>, body: &[u8]) -> Result<CallbackEnvelope> {
    let is_json = content_type
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_slice(body)
            .map_err(|e| BookingError::BadPayload(format!("callback body: {e}")))
    } else {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| BookingError::BadPayload(format!("callback form: {e}")))
    }
}

fn created(state: &AppState, checkout: Checkout) -> (StatusCode, Json<PaymentCreatedResponse>) {
    (
        StatusCode::CREATED,
        Json(PaymentCreatedResponse {
            success: true,
            order_id: checkout.payment.order_id,
            status: checkout.payment.status,
            url: checkout.payment.url,
            amount: checkout.ticket.price,
            currency: state.config.payment.currency.clone(),
        }),
    )
}

// --- HTTP Handlers ---

/// POST /api/payments/create
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonBody(req): JsonBody<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentCreatedResponse>)> {
    validate_payload(&req)?;

    let checkout = state
        .coordinator
        .request_payment(req.session_id, req.seat_id, user.user_id)
        .await?;
    state.cache.invalidate_seats(checkout.ticket.session_id).await;

    Ok(created(&state, checkout))
}

/// POST /api/payments/tickets/{ticket_id}
pub async fn pay_for_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(ticket_id): Path<i64>,
) -> Result<(StatusCode, Json<PaymentCreatedResponse>)> {
    let checkout = state
        .coordinator
        .request_payment_for_ticket(ticket_id, user.user_id)
        .await?;
    state.cache.invalidate_seats(checkout.ticket.session_id).await;

    Ok(created(&state, checkout))
}

/// POST /api/payments/callback
pub async fn payment_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackAck>> {
    settle_callback(&state, &headers, &body, None).await
}

/// POST /api/payments/callback/{order_id}
pub async fn payment_callback_for_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackAck>> {
    settle_callback(&state, &headers, &body, Some(order_id)).await
}

async fn settle_callback(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    order_id: Option<i64>,
) -> Result<Json<CallbackAck>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let envelope = parse_envelope(content_type, body)?;

    let settlement = state
        .coordinator
        .handle_callback(&envelope.data, &envelope.signature, order_id)
        .await?;
    if settlement.transitioned {
        state.cache.invalidate_seats(settlement.ticket.session_id).await;
    }

    Ok(Json(CallbackAck {
        status: settlement.ticket.status,
    }))
}

/// GET /api/payments/{ticket_id}/status
///
/// Владелец (или админ) узнаёт статус; pending-билет сверяется с провайдером.
pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(ticket_id): Path<i64>,
) -> Result<Json<Ticket>> {
    let ticket = state.tickets.get_by_id(ticket_id).await?;
    if ticket.user_id != Some(user.user_id) {
        user.require_role(&state, "admin").await?;
    }
    if ticket.status.is_terminal() || !ticket.is_claimed() {
        return Ok(Json(ticket));
    }

    match state.coordinator.refresh(ticket_id).await {
        Ok(Refresh::Settled(settlement)) => {
            if settlement.transitioned {
                state.cache.invalidate_seats(settlement.ticket.session_id).await;
            }
            Ok(Json(settlement.ticket))
        }
        Ok(refresh) => Ok(Json(refresh.ticket().clone())),
        Err(e) => {
            // Провайдер недоступен: отдаём то, что знаем
            warn!("Status refresh for ticket {} failed: {}", ticket_id, e);
            Ok(Json(ticket))
        }
    }
}
