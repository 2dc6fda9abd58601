//! Порты хранилища.
//!
//! Бизнес-правила живут в `SeatLedger` и `SettlementCoordinator`, здесь только
//! хранение. Единственная точка взаимного исключения для мест: уникальный
//! индекс по (session_id, seat_id) среди активных билетов, который обязан
//! поддерживать любой движок.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Identity, NewTicket, Seat, SeatAvailability, Session, Ticket, TicketStatus, TicketUpdate,
    UserCredentials,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Каталог: сеансы и места. Для ядра бронирования только чтение.
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    async fn session(&self, id: i64) -> Result<Session>;

    async fn seat(&self, id: i64) -> Result<Seat>;

    /// Карта зала для сеанса: все места зала и их состояние.
    async fn seat_map(&self, session_id: i64) -> Result<Vec<SeatAvailability>>;
}

#[async_trait]
pub trait TicketStore: Send + Sync + 'static {
    /// Создаёт pending-билет без владельца. Если для пары (сеанс, место) уже
    /// есть активный билет, возвращает `AlreadyReserved`.
    async fn insert_pending(&self, ticket: NewTicket) -> Result<Ticket>;

    async fn get_by_id(&self, id: i64) -> Result<Ticket>;

    /// Текущий pending/confirmed билет на место, иначе `NotFound`.
    async fn get_by_session_and_seat(&self, session_id: i64, seat_id: i64) -> Result<Ticket>;

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Ticket>>;

    /// Условно привязывает владельца: только pending-билет, у которого
    /// владельца нет или он тот же. Отметка `claimed_at` обновляется.
    /// `None`, если условие не выполнено.
    async fn claim(&self, id: i64, user_id: i64) -> Result<Option<Ticket>>;

    /// Условный переход pending -> `status` одной записью. При `failed` в той
    /// же записи снимается владелец. `None`, если билет уже не pending.
    async fn settle(&self, id: i64, status: TicketStatus) -> Result<Option<Ticket>>;

    async fn update(&self, id: i64, update: TicketUpdate) -> Result<Ticket>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Pending-билеты, у которых `pending_since` раньше `pending_before`.
    async fn list_stale_pending(&self, pending_before: DateTime<Utc>) -> Result<Vec<Ticket>>;
}

/// Провайдер идентификации: пользователь и уровень его роли.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Активный пользователь по id, иначе `NotFound`.
    async fn identity(&self, user_id: i64) -> Result<Identity>;

    async fn credentials(&self, email: &str) -> Result<UserCredentials>;

    async fn role_level(&self, role: &str) -> Result<i32>;
}
