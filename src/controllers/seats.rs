use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::{error::Result, models::SeatAvailability, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/seats/session/{session_id}", get(seat_map))
}

/// GET /api/seats/session/{session_id}
pub async fn seat_map(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
) -> Result<Json<Vec<SeatAvailability>>> {
    let seats = state.cache.seat_map(session_id).await?;
    Ok(Json(seats))
}
