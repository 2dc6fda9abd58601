use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Сеанс фильма в зале. Набор мест сеанса совпадает с местами зала.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub movie_id: i64,
    pub room_id: i64,
    pub start_time: DateTime<Utc>,
    pub price: f64,
}
