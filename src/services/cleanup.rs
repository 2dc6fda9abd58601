use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::settlement::{Refresh, Settlement, SettlementCoordinator};
use crate::error::Result;
use crate::models::{Ticket, TicketStatus};
use crate::store::TicketStore;

/// Что сделала одна итерация очистки.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub expired: usize,
    pub confirmed: usize,
    pub skipped: usize,
    /// Сеансы, у которых поменялась карта мест.
    pub sessions: BTreeSet<i64>,
}

enum SweepAction {
    Settled(Settlement),
    Skipped,
}

/// Переводит зависшие pending-билеты в терминальный статус.
///
/// Билет без владельца просто истекает. Для билета с владельцем сначала
/// спрашиваем провайдера: оплата могла пройти, а уведомление потеряться.
/// Если провайдер не отвечает или платёж ещё в процессе, билет ждёт до
/// двойного TTL и после этого истекает без вопросов. Оба срока считаются от
/// последней выдачи ссылки на оплату, а для билета без владельца от создания.
pub struct ExpiryService {
    coordinator: SettlementCoordinator,
    tickets: Arc<dyn TicketStore>,
    pending_ttl: Duration,
}

impl ExpiryService {
    pub fn new(
        coordinator: SettlementCoordinator,
        tickets: Arc<dyn TicketStore>,
        pending_ttl: std::time::Duration,
    ) -> Self {
        Self {
            coordinator,
            tickets,
            pending_ttl: Duration::from_std(pending_ttl).unwrap_or_else(|_| Duration::days(365)),
        }
    }

    pub async fn run_once(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let stale = self.tickets.list_stale_pending(now - self.pending_ttl).await?;
        let mut report = SweepReport::default();

        if stale.is_empty() {
            debug!("🧹 No stale pending tickets");
            return Ok(report);
        }
        info!("🧹 Found {} stale pending tickets", stale.len());

        let hard_cutoff = now - self.pending_ttl * 2;
        for ticket in stale {
            let overdue = ticket.pending_since() < hard_cutoff;
            match self.sweep_ticket(&ticket, overdue).await {
                Ok(SweepAction::Settled(settlement)) if settlement.transitioned => {
                    report.sessions.insert(settlement.ticket.session_id);
                    match settlement.ticket.status {
                        TicketStatus::Confirmed => report.confirmed += 1,
                        _ => report.expired += 1,
                    }
                }
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    error!("🧹 Failed to sweep ticket {}: {}", ticket.id, e);
                    report.skipped += 1;
                }
            }
        }

        info!(
            "✅ Sweep finished: {} expired, {} confirmed, {} left pending",
            report.expired, report.confirmed, report.skipped
        );
        Ok(report)
    }

    async fn sweep_ticket(&self, ticket: &Ticket, overdue: bool) -> Result<SweepAction> {
        if !ticket.is_claimed() {
            return self.expire(ticket).await;
        }

        match self.coordinator.refresh(ticket.id).await {
            Ok(Refresh::Settled(settlement)) => Ok(SweepAction::Settled(settlement)),
            Ok(Refresh::NoPayment(_)) => self.expire(ticket).await,
            Ok(Refresh::InProgress(_)) if overdue => {
                warn!("💳 Payment for ticket {} still in progress past the deadline", ticket.id);
                self.expire(ticket).await
            }
            Ok(Refresh::InProgress(_)) => Ok(SweepAction::Skipped),
            Err(e) if overdue => {
                warn!("💳 Status check for ticket {} failed ({}), expiring anyway", ticket.id, e);
                self.expire(ticket).await
            }
            Err(e) => {
                warn!("💳 Status check for ticket {} failed, will retry: {}", ticket.id, e);
                Ok(SweepAction::Skipped)
            }
        }
    }

    async fn expire(&self, ticket: &Ticket) -> Result<SweepAction> {
        let settlement = self.coordinator.expire(ticket.id).await?;
        Ok(SweepAction::Settled(settlement))
    }
}
