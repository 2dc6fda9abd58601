//! Координатор расчётов.
//!
//! Единственное место, которое выводит билет из `pending`:
//!
//! ```text
//! pending (без владельца) --запрос оплаты--> pending (владелец)
//! pending --success|sandbox--> confirmed
//! pending --иначе / истёк срок--> failed (владелец снят)
//! ```
//!
//! Каждый переход делается одной условной записью `WHERE status = 'pending'`.
//! Повторное или запоздавшее уведомление видит уже завершённый билет и ничего
//! не меняет.

use std::sync::Arc;
use tracing::{info, warn};

use super::ledger::SeatLedger;
use super::payment::{is_in_progress, PaymentGateway, PaymentRequest, PaymentResponse, ProviderNotice};
use crate::error::{BookingError, Result};
use crate::models::{Ticket, TicketStatus};
use crate::store::TicketStore;

/// Результат применения статуса к билету.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub ticket: Ticket,
    /// `false`, если билет уже был завершён и запись не понадобилась.
    pub transitioned: bool,
}

/// Выданная ссылка на оплату вместе с билетом, к которому она относится.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    pub ticket: Ticket,
    pub payment: PaymentResponse,
}

/// Итог опроса провайдера по pending-билету.
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh {
    Settled(Settlement),
    /// Провайдер знает о платеже, но он ещё не завершён.
    InProgress(Ticket),
    /// Провайдер о платеже не знает: по билету не платили.
    NoPayment(Ticket),
}

impl Refresh {
    pub fn ticket(&self) -> &Ticket {
        match self {
            Refresh::Settled(settlement) => &settlement.ticket,
            Refresh::InProgress(ticket) | Refresh::NoPayment(ticket) => ticket,
        }
    }
}

#[derive(Clone)]
pub struct SettlementCoordinator {
    ledger: SeatLedger,
    tickets: Arc<dyn TicketStore>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl SettlementCoordinator {
    pub fn new(
        ledger: SeatLedger,
        tickets: Arc<dyn TicketStore>,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            tickets,
            gateway,
            currency: currency.into(),
        }
    }

    pub fn ledger(&self) -> &SeatLedger {
        &self.ledger
    }

    /// Запрос оплаты места: резервирует его (или берёт существующий
    /// неоплаченный билет) и выдаёт ссылку на оплату.
    pub async fn request_payment(&self, session_id: i64, seat_id: i64, user_id: i64) -> Result<Checkout> {
        let ticket = self.ledger.reserve_or_present(session_id, seat_id, user_id).await?;
        self.checkout(ticket, user_id).await
    }

    /// Запрос оплаты уже существующего билета.
    pub async fn request_payment_for_ticket(&self, ticket_id: i64, user_id: i64) -> Result<Checkout> {
        let ticket = self.tickets.get_by_id(ticket_id).await?;
        if !ticket.is_claimable_by(user_id) {
            warn!(
                "User {} cannot pay for ticket {} ({}, owner {:?})",
                user_id, ticket.id, ticket.status, ticket.user_id
            );
            return Err(BookingError::AlreadyReserved);
        }
        self.checkout(ticket, user_id).await
    }

    async fn checkout(&self, ticket: Ticket, user_id: i64) -> Result<Checkout> {
        let request = PaymentRequest {
            amount: ticket.price,
            currency: self.currency.clone(),
            description: format!(
                "Cinema ticket #{}: session {}, seat {}",
                ticket.id, ticket.session_id, ticket.seat_id
            ),
            order_id: ticket.id,
        };

        // Владелец ещё не привязан: при ошибке шлюза билет остаётся свободным
        let payment = self.gateway.create_payment(&request).await.map_err(|e| {
            warn!("Payment request for ticket {} failed: {}", ticket.id, e);
            BookingError::from(e)
        })?;

        let ticket = self
            .tickets
            .claim(ticket.id, user_id)
            .await?
            .ok_or_else(|| {
                warn!("Ticket {} was claimed concurrently, dropping payment link", request.order_id);
                BookingError::AlreadyReserved
            })?;

        info!(
            "Payment link issued: ticket_id={}, user_id={}, amount={} {}",
            ticket.id, user_id, request.amount, request.currency
        );
        Ok(Checkout { ticket, payment })
    }

    /// Обрабатывает уведомление провайдера. Подпись проверяется до разбора
    /// `data`; `expected_order` задаётся, когда номер заказа пришёл в пути.
    pub async fn handle_callback(
        &self,
        data: &str,
        signature: &str,
        expected_order: Option<i64>,
    ) -> Result<Settlement> {
        if !self.gateway.verify_signature(data, signature) {
            warn!("Rejected payment callback: signature mismatch");
            return Err(BookingError::Unauthenticated);
        }

        let notice = ProviderNotice::decode(data)?;
        if let Some(expected) = expected_order {
            if expected != notice.order_id {
                return Err(BookingError::BadPayload(format!(
                    "callback for order {} delivered to order {}",
                    notice.order_id, expected
                )));
            }
        }

        let ticket = self.tickets.get_by_id(notice.order_id).await?;
        info!(
            "Payment callback: ticket_id={}, provider_status={}",
            ticket.id, notice.status
        );
        self.apply(ticket, TicketStatus::from_provider(&notice.status), "callback")
            .await
    }

    /// Спрашивает у провайдера статус pending-билета и применяет его.
    pub async fn refresh(&self, ticket_id: i64) -> Result<Refresh> {
        let ticket = self.tickets.get_by_id(ticket_id).await?;
        if ticket.status.is_terminal() {
            return Ok(Refresh::Settled(Settlement {
                ticket,
                transitioned: false,
            }));
        }

        match self.gateway.query_status(ticket.id).await? {
            None => Ok(Refresh::NoPayment(ticket)),
            Some(code) if is_in_progress(&code) => Ok(Refresh::InProgress(ticket)),
            Some(code) => {
                let status = TicketStatus::from_provider(&code);
                self.apply(ticket, status, "poll").await.map(Refresh::Settled)
            }
        }
    }

    /// Переводит зависший pending-билет в `failed`.
    pub async fn expire(&self, ticket_id: i64) -> Result<Settlement> {
        let ticket = self.tickets.get_by_id(ticket_id).await?;
        self.apply(ticket, TicketStatus::Failed, "expiry").await
    }

    async fn apply(&self, ticket: Ticket, status: TicketStatus, source: &str) -> Result<Settlement> {
        if ticket.status.is_terminal() {
            return Ok(self.replay(ticket, status));
        }

        // Отказ и снятие владельца делает одна условная запись
        let settled = match status {
            TicketStatus::Failed => self.ledger.release_if_unclaimed(ticket.id).await?,
            _ => self.tickets.settle(ticket.id, status).await?,
        };

        match settled {
            Some(settled) => {
                info!(
                    "Ticket {} {} via {}: session_id={}, seat_id={}, price={}",
                    settled.id, settled.status, source, settled.session_id, settled.seat_id, settled.price
                );
                Ok(Settlement {
                    ticket: settled,
                    transitioned: true,
                })
            }
            None => {
                // Другой обработчик успел завершить билет первым
                let current = self.tickets.get_by_id(ticket.id).await?;
                Ok(self.replay(current, status))
            }
        }
    }

    fn replay(&self, ticket: Ticket, requested: TicketStatus) -> Settlement {
        if ticket.status != requested {
            warn!(
                "Ignoring {} for ticket {}: already {}",
                requested, ticket.id, ticket.status
            );
        }

        Settlement {
            ticket,
            transitioned: false,
        }
    }
}
