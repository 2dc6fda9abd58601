use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Статус расчёта по билету: pending -> confirmed | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Confirmed => "confirmed",
            TicketStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketStatus::Pending)
    }

    /// Коды провайдера: только точные `success` и `sandbox` означают оплату,
    /// всё остальное считается отказом.
    pub fn from_provider(code: &str) -> Self {
        match code {
            "success" | "sandbox" => TicketStatus::Confirmed,
            _ => TicketStatus::Failed,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown ticket status: {0}")]
pub struct UnknownTicketStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownTicketStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TicketStatus::Pending),
            "confirmed" => Ok(TicketStatus::Confirmed),
            "failed" => Ok(TicketStatus::Failed),
            other => Err(UnknownTicketStatus(other.to_string())),
        }
    }
}

/// Бронь конкретного места на конкретный сеанс.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub session_id: i64,
    pub seat_id: i64,
    /// `None`: билет ещё никто не оплачивает, либо оплата не прошла.
    pub user_id: Option<i64>,
    /// Цена фиксируется при создании и больше не пересчитывается.
    pub price: f64,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    /// Когда покупатель последний раз получил ссылку на оплату.
    pub claimed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_claimed(&self) -> bool {
        self.user_id.is_some()
    }

    /// С какого момента отсчитывается срок жизни pending-билета.
    pub fn pending_since(&self) -> DateTime<Utc> {
        self.claimed_at.unwrap_or(self.created_at)
    }

    /// Может ли пользователь начать (или повторить) оплату этого билета.
    pub fn is_claimable_by(&self, user_id: i64) -> bool {
        self.status == TicketStatus::Pending && self.user_id.map_or(true, |owner| owner == user_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub session_id: i64,
    pub seat_id: i64,
    pub price: f64,
}

/// Административное изменение билета. Статус так не меняется.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketUpdate {
    pub user_id: Option<i64>,
    pub price: Option<f64>,
}
