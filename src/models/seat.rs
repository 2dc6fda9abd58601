use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::TicketStatus;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub room_id: i64,
    pub row: i32,
    #[sqlx(rename = "seat_number")]
    #[serde(rename = "seat_number")]
    pub number: i32,
}

// Состояние места в конкретном сеансе
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Reserved,
    Sold,
}

impl SeatStatus {
    /// Статус места по активному билету. Неоплаченный билет без владельца
    /// может забрать любой покупатель, поэтому место считается свободным.
    pub fn for_ticket(status: Option<TicketStatus>, claimed: bool) -> Self {
        match status {
            Some(TicketStatus::Confirmed) => SeatStatus::Sold,
            Some(TicketStatus::Pending) if claimed => SeatStatus::Reserved,
            _ => SeatStatus::Available,
        }
    }
}

/// Место на карте зала для сеанса.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatAvailability {
    pub id: i64,
    pub room_id: i64,
    pub row: i32,
    #[serde(rename = "seat_number")]
    pub number: i32,
    pub status: SeatStatus,
}
