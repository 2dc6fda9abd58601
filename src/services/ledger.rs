//! Реестр мест: не больше одного активного билета на (сеанс, место).
//!
//! Блокировок в процессе нет. Взаимное исключение обеспечивает уникальный
//! индекс хранилища, его нарушение приходит сюда как `AlreadyReserved`.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{BookingError, Result};
use crate::models::{NewTicket, Ticket, TicketStatus};
use crate::store::{CatalogStore, TicketStore};

#[derive(Clone)]
pub struct SeatLedger {
    catalog: Arc<dyn CatalogStore>,
    tickets: Arc<dyn TicketStore>,
}

impl SeatLedger {
    pub fn new(catalog: Arc<dyn CatalogStore>, tickets: Arc<dyn TicketStore>) -> Self {
        Self { catalog, tickets }
    }

    /// Создаёт pending-билет без владельца. Цена фиксируется сейчас: либо
    /// переданная, либо текущая цена сеанса.
    pub async fn reserve(&self, session_id: i64, seat_id: i64, price: Option<f64>) -> Result<Ticket> {
        let session = self.catalog.session(session_id).await?;
        let seat = self.catalog.seat(seat_id).await?;
        if seat.room_id != session.room_id {
            return Err(BookingError::InvalidRelation { session_id, seat_id });
        }

        let ticket = self
            .tickets
            .insert_pending(NewTicket {
                session_id,
                seat_id,
                price: price.unwrap_or(session.price),
            })
            .await?;

        info!(
            "Seat reserved: ticket_id={}, session_id={}, seat_id={}, price={}",
            ticket.id, session_id, seat_id, ticket.price
        );
        Ok(ticket)
    }

    /// Резервирует место или возвращает уже существующий pending-билет, если
    /// его может оплачивать этот пользователь (владельца нет или это он сам).
    pub async fn reserve_or_present(&self, session_id: i64, seat_id: i64, requester: i64) -> Result<Ticket> {
        match self.reserve(session_id, seat_id, None).await {
            Err(BookingError::AlreadyReserved) => {}
            other => return other,
        }

        let existing = match self.tickets.get_by_session_and_seat(session_id, seat_id).await {
            Ok(ticket) => ticket,
            // Билет успел завершиться между вставкой и чтением
            Err(BookingError::NotFound(_)) => return Err(BookingError::AlreadyReserved),
            Err(e) => return Err(e),
        };

        if existing.is_claimable_by(requester) {
            Ok(existing)
        } else {
            warn!(
                "Seat {} of session {} is held by ticket {} ({})",
                seat_id, session_id, existing.id, existing.status
            );
            Err(BookingError::AlreadyReserved)
        }
    }

    /// Освобождает место по неоплаченному билету: pending -> `failed` с
    /// одновременным снятием владельца. Строка остаётся в хранилище.
    /// `None`, если билет уже завершён; его запись не трогается.
    pub async fn release_if_unclaimed(&self, ticket_id: i64) -> Result<Option<Ticket>> {
        let released = self.tickets.settle(ticket_id, TicketStatus::Failed).await?;
        if released.is_some() {
            info!("Seat released: ticket_id={}", ticket_id);
        }
        Ok(released)
    }
}
