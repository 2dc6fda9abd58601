//! Реализация портов хранилища на PostgreSQL (sqlx).
//!
//! Каждый запрос выполняется с ограничением по времени: таймаут превращается в
//! `BookingError::Transient`. Все мутации выполняются одиночными выражениями, поэтому
//! частично применённых изменений не бывает.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use super::{CatalogStore, TicketStore, UserDirectory};
use crate::error::{BookingError, Result};
use crate::models::{
    Identity, NewTicket, Seat, SeatAvailability, SeatStatus, Session, Ticket, TicketStatus,
    TicketUpdate, UserCredentials,
};

const TICKET_COLUMNS: &str =
    "id, session_id, seat_id, user_id, price::FLOAT8 AS price, status, created_at, claimed_at, settled_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

// Строка tickets как есть: статус хранится текстом
#[derive(FromRow)]
struct TicketRow {
    id: i64,
    session_id: i64,
    seat_id: i64,
    user_id: Option<i64>,
    price: f64,
    status: String,
    created_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = BookingError;

    fn try_from(row: TicketRow) -> Result<Self> {
        let status = row
            .status
            .parse::<TicketStatus>()
            .map_err(|e| BookingError::Internal(e.to_string()))?;
        Ok(Ticket {
            id: row.id,
            session_id: row.session_id,
            seat_id: row.seat_id,
            user_id: row.user_id,
            price: row.price,
            status,
            created_at: row.created_at,
            claimed_at: row.claimed_at,
            settled_at: row.settled_at,
        })
    }
}

fn into_ticket(row: Option<TicketRow>) -> Result<Option<Ticket>> {
    row.map(Ticket::try_from).transpose()
}

/// Перевод ошибок драйвера в доменные. Дальше store-слоя sqlx не уходит.
fn translate(op: &'static str, err: sqlx::Error) -> BookingError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => BookingError::AlreadyReserved,
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            BookingError::NotFound("referenced record")
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            warn!("{} failed with a connection error: {}", op, err);
            BookingError::Transient(format!("{op}: database unavailable"))
        }
        other => {
            error!("{} failed: {:?}", op, other);
            BookingError::Internal(format!("{op}: {other}"))
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }

    async fn with_deadline<T, F>(&self, op: &'static str, query: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(result) => result.map_err(|e| translate(op, e)),
            Err(_) => {
                warn!("{} exceeded {:?}", op, self.query_timeout);
                Err(BookingError::Transient(format!("{op} timed out")))
            }
        }
    }

    async fn fetch_ticket(&self, op: &'static str, sql: &str, id: i64) -> Result<Option<Ticket>> {
        let row = self
            .with_deadline(
                op,
                sqlx::query_as::<_, TicketRow>(sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;
        into_ticket(row)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn session(&self, id: i64) -> Result<Session> {
        self.with_deadline(
            "session lookup",
            sqlx::query_as::<_, Session>(
                "SELECT id, movie_id, room_id, start_time, price::FLOAT8 AS price
                 FROM sessions
                 WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(BookingError::NotFound("session"))
    }

    async fn seat(&self, id: i64) -> Result<Seat> {
        self.with_deadline(
            "seat lookup",
            sqlx::query_as::<_, Seat>("SELECT id, room_id, row, seat_number FROM seats WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(BookingError::NotFound("seat"))
    }

    async fn seat_map(&self, session_id: i64) -> Result<Vec<SeatAvailability>> {
        // 404 для несуществующего сеанса, а не пустая карта
        self.session(session_id).await?;

        let rows: Vec<(i64, i64, i32, i32, Option<String>, Option<i64>)> = self
            .with_deadline(
                "seat map",
                sqlx::query_as(
                    r#"
                    SELECT s.id, s.room_id, s.row, s.seat_number, t.status, t.user_id
                    FROM sessions ses
                    JOIN seats s ON s.room_id = ses.room_id
                    LEFT JOIN tickets t
                           ON t.seat_id = s.id
                          AND t.session_id = ses.id
                          AND t.status IN ('pending', 'confirmed')
                    WHERE ses.id = $1
                    ORDER BY s.row, s.seat_number
                    "#,
                )
                .bind(session_id)
                .fetch_all(&self.pool),
            )
            .await?;

        rows.into_iter()
            .map(|(id, room_id, row, number, status, user_id)| {
                let status = status
                    .map(|s| s.parse::<TicketStatus>())
                    .transpose()
                    .map_err(|e| BookingError::Internal(e.to_string()))?;
                Ok(SeatAvailability {
                    id,
                    room_id,
                    row,
                    number,
                    status: SeatStatus::for_ticket(status, user_id.is_some()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn insert_pending(&self, ticket: NewTicket) -> Result<Ticket> {
        let sql = format!(
            "INSERT INTO tickets (session_id, seat_id, price, status)
             VALUES ($1, $2, $3, 'pending')
             RETURNING {TICKET_COLUMNS}"
        );
        let row = self
            .with_deadline(
                "ticket insert",
                sqlx::query_as::<_, TicketRow>(&sql)
                    .bind(ticket.session_id)
                    .bind(ticket.seat_id)
                    .bind(ticket.price)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ticket::try_from(row)
    }

    async fn get_by_id(&self, id: i64) -> Result<Ticket> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
        self.fetch_ticket("ticket lookup", &sql, id)
            .await?
            .ok_or(BookingError::NotFound("ticket"))
    }

    async fn get_by_session_and_seat(&self, session_id: i64, seat_id: i64) -> Result<Ticket> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets
             WHERE session_id = $1 AND seat_id = $2 AND status IN ('pending', 'confirmed')"
        );
        let row = self
            .with_deadline(
                "ticket lookup by seat",
                sqlx::query_as::<_, TicketRow>(&sql)
                    .bind(session_id)
                    .bind(seat_id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        into_ticket(row)?.ok_or(BookingError::NotFound("ticket"))
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows = self
            .with_deadline(
                "tickets by user",
                sqlx::query_as::<_, TicketRow>(&sql).bind(user_id).fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn claim(&self, id: i64, user_id: i64) -> Result<Option<Ticket>> {
        let sql = format!(
            "UPDATE tickets SET user_id = $2, claimed_at = NOW()
             WHERE id = $1 AND status = 'pending' AND (user_id IS NULL OR user_id = $2)
             RETURNING {TICKET_COLUMNS}"
        );
        let row = self
            .with_deadline(
                "ticket claim",
                sqlx::query_as::<_, TicketRow>(&sql)
                    .bind(id)
                    .bind(user_id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        into_ticket(row)
    }

    async fn settle(&self, id: i64, status: TicketStatus) -> Result<Option<Ticket>> {
        let sql = format!(
            "UPDATE tickets
             SET status = $2,
                 settled_at = NOW(),
                 user_id = CASE WHEN $2::TEXT = 'failed' THEN NULL ELSE user_id END
             WHERE id = $1 AND status = 'pending'
             RETURNING {TICKET_COLUMNS}"
        );
        let row = self
            .with_deadline(
                "ticket settle",
                sqlx::query_as::<_, TicketRow>(&sql)
                    .bind(id)
                    .bind(status.as_str())
                    .fetch_optional(&self.pool),
            )
            .await?;
        into_ticket(row)
    }

    async fn update(&self, id: i64, update: TicketUpdate) -> Result<Ticket> {
        let sql = format!(
            "UPDATE tickets
             SET user_id = COALESCE($2, user_id),
                 price = COALESCE($3::NUMERIC, price)
             WHERE id = $1
             RETURNING {TICKET_COLUMNS}"
        );
        let row = self
            .with_deadline(
                "ticket update",
                sqlx::query_as::<_, TicketRow>(&sql)
                    .bind(id)
                    .bind(update.user_id)
                    .bind(update.price)
                    .fetch_optional(&self.pool),
            )
            .await?;
        into_ticket(row)?.ok_or(BookingError::NotFound("ticket"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = self
            .with_deadline(
                "ticket delete",
                sqlx::query("DELETE FROM tickets WHERE id = $1").bind(id).execute(&self.pool),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(BookingError::NotFound("ticket"));
        }
        Ok(())
    }

    async fn list_stale_pending(&self, pending_before: DateTime<Utc>) -> Result<Vec<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets
             WHERE status = 'pending' AND COALESCE(claimed_at, created_at) < $1
             ORDER BY COALESCE(claimed_at, created_at)"
        );
        let rows = self
            .with_deadline(
                "stale pending tickets",
                sqlx::query_as::<_, TicketRow>(&sql)
                    .bind(pending_before)
                    .fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(Ticket::try_from).collect()
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn identity(&self, user_id: i64) -> Result<Identity> {
        self.with_deadline(
            "identity lookup",
            sqlx::query_as::<_, Identity>(
                "SELECT u.id AS user_id, u.email, r.name AS role, r.level
                 FROM users u
                 JOIN roles r ON r.id = u.role_id
                 WHERE u.id = $1 AND u.is_active = true",
            )
            .bind(user_id)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(BookingError::NotFound("user"))
    }

    async fn credentials(&self, email: &str) -> Result<UserCredentials> {
        self.with_deadline(
            "credentials lookup",
            sqlx::query_as::<_, UserCredentials>(
                "SELECT id AS user_id, email, password_hash, is_active FROM users WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(BookingError::NotFound("user"))
    }

    async fn role_level(&self, role: &str) -> Result<i32> {
        self.with_deadline(
            "role lookup",
            sqlx::query_scalar::<_, i32>("SELECT level FROM roles WHERE name = $1")
                .bind(role)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(BookingError::NotFound("role"))
    }
}
