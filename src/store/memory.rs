//! Хранилище в памяти процесса.
//!
//! Используется в тестах и для локального запуска без базы. Уникальность
//! активного билета на место проверяется под тем же мьютексом, что и вставка,
//! поэтому гарантии те же, что у частичного индекса в PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{CatalogStore, TicketStore, UserDirectory};
use crate::error::{BookingError, Result};
use crate::models::{
    Identity, NewTicket, Seat, SeatAvailability, SeatStatus, Session, Ticket, TicketStatus,
    TicketUpdate, UserCredentials,
};

#[derive(Default)]
struct MemoryState {
    seats: HashMap<i64, Seat>,
    sessions: HashMap<i64, Session>,
    tickets: BTreeMap<i64, Ticket>,
    users: HashMap<i64, (UserCredentials, String)>,
    roles: HashMap<String, i32>,
    next_ticket_id: i64,
}

impl MemoryState {
    fn active_ticket(&self, session_id: i64, seat_id: i64) -> Option<&Ticket> {
        self.tickets.values().find(|t| {
            t.session_id == session_id && t.seat_id == seat_id && t.status != TicketStatus::Failed
        })
    }
}

pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Пустое хранилище с тремя стандартными ролями.
    pub fn new() -> Self {
        let mut state = MemoryState {
            next_ticket_id: 1,
            ..MemoryState::default()
        };
        state.roles.insert("user".to_string(), 1);
        state.roles.insert("moderator".to_string(), 2);
        state.roles.insert("admin".to_string(), 3);
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn add_seat(&self, seat: Seat) {
        self.state.lock().await.seats.insert(seat.id, seat);
    }

    pub async fn add_session(&self, session: Session) {
        self.state.lock().await.sessions.insert(session.id, session);
    }

    pub async fn set_session_price(&self, session_id: i64, price: f64) {
        if let Some(session) = self.state.lock().await.sessions.get_mut(&session_id) {
            session.price = price;
        }
    }

    pub async fn add_user(&self, credentials: UserCredentials, role: &str) {
        self.state
            .lock()
            .await
            .users
            .insert(credentials.user_id, (credentials, role.to_string()));
    }

    /// Сдвигает отметки времени билета в прошлое, чтобы смоделировать
    /// прошедшее время.
    pub async fn age_ticket(&self, id: i64, by: Duration) {
        if let Some(ticket) = self.state.lock().await.tickets.get_mut(&id) {
            ticket.created_at = ticket.created_at - by;
            ticket.claimed_at = ticket.claimed_at.map(|at| at - by);
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn session(&self, id: i64) -> Result<Session> {
        let state = self.state.lock().await;
        state.sessions.get(&id).cloned().ok_or(BookingError::NotFound("session"))
    }

    async fn seat(&self, id: i64) -> Result<Seat> {
        let state = self.state.lock().await;
        state.seats.get(&id).cloned().ok_or(BookingError::NotFound("seat"))
    }

    async fn seat_map(&self, session_id: i64) -> Result<Vec<SeatAvailability>> {
        let state = self.state.lock().await;
        let session = state
            .sessions
            .get(&session_id)
            .ok_or(BookingError::NotFound("session"))?;

        let mut seats: Vec<&Seat> = state
            .seats
            .values()
            .filter(|s| s.room_id == session.room_id)
            .collect();
        seats.sort_by_key(|s| (s.row, s.number));

        Ok(seats
            .into_iter()
            .map(|seat| {
                let ticket = state.active_ticket(session_id, seat.id);
                SeatAvailability {
                    id: seat.id,
                    room_id: seat.room_id,
                    row: seat.row,
                    number: seat.number,
                    status: SeatStatus::for_ticket(
                        ticket.map(|t| t.status),
                        ticket.is_some_and(Ticket::is_claimed),
                    ),
                }
            })
            .collect())
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert_pending(&self, ticket: NewTicket) -> Result<Ticket> {
        let mut state = self.state.lock().await;
        if !state.sessions.contains_key(&ticket.session_id) || !state.seats.contains_key(&ticket.seat_id) {
            return Err(BookingError::NotFound("referenced record"));
        }
        if state.active_ticket(ticket.session_id, ticket.seat_id).is_some() {
            return Err(BookingError::AlreadyReserved);
        }

        let id = state.next_ticket_id;
        state.next_ticket_id += 1;
        let created = Ticket {
            id,
            session_id: ticket.session_id,
            seat_id: ticket.seat_id,
            user_id: None,
            price: ticket.price,
            status: TicketStatus::Pending,
            created_at: Utc::now(),
            claimed_at: None,
            settled_at: None,
        };
        state.tickets.insert(id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Ticket> {
        let state = self.state.lock().await;
        state.tickets.get(&id).cloned().ok_or(BookingError::NotFound("ticket"))
    }

    async fn get_by_session_and_seat(&self, session_id: i64, seat_id: i64) -> Result<Ticket> {
        let state = self.state.lock().await;
        state
            .active_ticket(session_id, seat_id)
            .cloned()
            .ok_or(BookingError::NotFound("ticket"))
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Ticket>> {
        let state = self.state.lock().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| t.user_id == Some(user_id))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    async fn claim(&self, id: i64, user_id: i64) -> Result<Option<Ticket>> {
        let mut state = self.state.lock().await;
        match state.tickets.get_mut(&id) {
            Some(ticket) if ticket.is_claimable_by(user_id) => {
                ticket.user_id = Some(user_id);
                ticket.claimed_at = Some(Utc::now());
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn settle(&self, id: i64, status: TicketStatus) -> Result<Option<Ticket>> {
        let mut state = self.state.lock().await;
        match state.tickets.get_mut(&id) {
            Some(ticket) if ticket.status == TicketStatus::Pending => {
                ticket.status = status;
                ticket.settled_at = Some(Utc::now());
                if status == TicketStatus::Failed {
                    ticket.user_id = None;
                }
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update(&self, id: i64, update: TicketUpdate) -> Result<Ticket> {
        let mut state = self.state.lock().await;
        if let Some(user_id) = update.user_id {
            if !state.users.contains_key(&user_id) {
                return Err(BookingError::NotFound("referenced record"));
            }
        }
        let ticket = state.tickets.get_mut(&id).ok_or(BookingError::NotFound("ticket"))?;
        if let Some(user_id) = update.user_id {
            ticket.user_id = Some(user_id);
        }
        if let Some(price) = update.price {
            ticket.price = price;
        }
        Ok(ticket.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .tickets
            .remove(&id)
            .map(|_| ())
            .ok_or(BookingError::NotFound("ticket"))
    }

    async fn list_stale_pending(&self, pending_before: DateTime<Utc>) -> Result<Vec<Ticket>> {
        let state = self.state.lock().await;
        let mut stale: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Pending && t.pending_since() < pending_before)
            .cloned()
            .collect();
        stale.sort_by_key(Ticket::pending_since);
        Ok(stale)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn identity(&self, user_id: i64) -> Result<Identity> {
        let state = self.state.lock().await;
        let (credentials, role) = state
            .users
            .get(&user_id)
            .filter(|(c, _)| c.is_active)
            .ok_or(BookingError::NotFound("user"))?;
        let level = state.roles.get(role).copied().ok_or(BookingError::NotFound("role"))?;
        Ok(Identity {
            user_id: credentials.user_id,
            email: credentials.email.clone(),
            role: role.clone(),
            level,
        })
    }

    async fn credentials(&self, email: &str) -> Result<UserCredentials> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .find(|(c, _)| c.email == email)
            .map(|(c, _)| c.clone())
            .ok_or(BookingError::NotFound("user"))
    }

    async fn role_level(&self, role: &str) -> Result<i32> {
        let state = self.state.lock().await;
        state.roles.get(role).copied().ok_or(BookingError::NotFound("role"))
    }
}
