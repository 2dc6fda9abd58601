use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::{validate_payload, JsonBody};
use crate::{
    error::Result,
    middleware::AuthUser,
    models::{Ticket, TicketUpdate},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tickets", post(create_ticket))
        .route("/tickets/my", get(my_tickets))
        .route(
            "/tickets/session/{session_id}/seat/{seat_id}",
            get(ticket_by_session_and_seat),
        )
        .route(
            "/tickets/{ticket_id}",
            get(get_ticket).patch(update_ticket).delete(delete_ticket),
        )
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTicketRequest {
    #[validate(range(min = 1))]
    pub session_id: i64,
    #[validate(range(min = 1))]
    pub seat_id: i64,
    /// Без цены билет создаётся по текущей цене сеанса.
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTicketRequest {
    #[validate(range(min = 1))]
    pub user_id: Option<i64>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
}

/// POST /api/tickets (admin)
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonBody(req): JsonBody<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>)> {
    user.require_role(&state, "admin").await?;
    validate_payload(&req)?;

    let ticket = state
        .coordinator
        .ledger()
        .reserve(req.session_id, req.seat_id, req.price)
        .await?;
    state.cache.invalidate_seats(ticket.session_id).await;

    Ok((StatusCode::CREATED, Json(ticket)))
}

/// GET /api/tickets/my
pub async fn my_tickets(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<Json<Vec<Ticket>>> {
    let tickets = state.tickets.list_by_user(user.user_id).await?;
    Ok(Json(tickets))
}

/// GET /api/tickets/session/{session_id}/seat/{seat_id} (admin)
pub async fn ticket_by_session_and_seat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((session_id, seat_id)): Path<(i64, i64)>,
) -> Result<Json<Ticket>> {
    user.require_role(&state, "admin").await?;
    let ticket = state.tickets.get_by_session_and_seat(session_id, seat_id).await?;
    Ok(Json(ticket))
}

/// GET /api/tickets/{ticket_id} (admin)
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(ticket_id): Path<i64>,
) -> Result<Json<Ticket>> {
    user.require_role(&state, "admin").await?;
    Ok(Json(state.tickets.get_by_id(ticket_id).await?))
}

/// PATCH /api/tickets/{ticket_id} (admin): владелец и цена, статус так не меняется
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(ticket_id): Path<i64>,
    JsonBody(req): JsonBody<UpdateTicketRequest>,
) -> Result<Json<Ticket>> {
    user.require_role(&state, "admin").await?;
    validate_payload(&req)?;

    let ticket = state
        .tickets
        .update(
            ticket_id,
            TicketUpdate {
                user_id: req.user_id,
                price: req.price,
            },
        )
        .await?;
    state.cache.invalidate_seats(ticket.session_id).await;
    info!("Ticket {} updated by admin {}", ticket_id, user.user_id);

    Ok(Json(ticket))
}

/// DELETE /api/tickets/{ticket_id} (admin): место освобождается
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(ticket_id): Path<i64>,
) -> Result<StatusCode> {
    user.require_role(&state, "admin").await?;

    let ticket = state.tickets.get_by_id(ticket_id).await?;
    state.tickets.delete(ticket_id).await?;
    state.cache.invalidate_seats(ticket.session_id).await;
    info!("Ticket {} deleted by admin {}", ticket_id, user.user_id);

    Ok(StatusCode::NO_CONTENT)
}
