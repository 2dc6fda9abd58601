mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cinema_booking::error::{BookingError, Result};
use cinema_booking::models::{NewTicket, Ticket, TicketStatus, TicketUpdate};
use cinema_booking::services::{Refresh, SeatLedger, SettlementCoordinator};
use cinema_booking::store::{MemoryStore, TicketStore};
use common::*;

/// Хранилище, которое после первого завершения билета отказывает в любой
/// записи. Переход должен уложиться в одну запись.
struct SingleSettleStore {
    inner: Arc<MemoryStore>,
    settled: AtomicBool,
}

impl SingleSettleStore {
    fn write_allowed(&self) -> Result<()> {
        if self.settled.load(Ordering::SeqCst) {
            return Err(BookingError::Transient("store went away".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketStore for SingleSettleStore {
    async fn insert_pending(&self, ticket: NewTicket) -> Result<Ticket> {
        self.write_allowed()?;
        self.inner.insert_pending(ticket).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Ticket> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_session_and_seat(&self, session_id: i64, seat_id: i64) -> Result<Ticket> {
        self.inner.get_by_session_and_seat(session_id, seat_id).await
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Ticket>> {
        self.inner.list_by_user(user_id).await
    }

    async fn claim(&self, id: i64, user_id: i64) -> Result<Option<Ticket>> {
        self.write_allowed()?;
        self.inner.claim(id, user_id).await
    }

    async fn settle(&self, id: i64, status: TicketStatus) -> Result<Option<Ticket>> {
        self.write_allowed()?;
        let settled = self.inner.settle(id, status).await?;
        self.settled.store(true, Ordering::SeqCst);
        Ok(settled)
    }

    async fn update(&self, id: i64, update: TicketUpdate) -> Result<Ticket> {
        self.write_allowed()?;
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.write_allowed()?;
        self.inner.delete(id).await
    }

    async fn list_stale_pending(&self, pending_before: DateTime<Utc>) -> Result<Vec<Ticket>> {
        self.inner.list_stale_pending(pending_before).await
    }
}

#[tokio::test]
async fn paid_ticket_is_confirmed_and_keeps_owner() {
    let fx = fixture().await;

    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();
    assert_eq!(checkout.payment.status, "pending");
    assert!(checkout.payment.url.ends_with(&checkout.ticket.id.to_string()));
    assert_eq!(checkout.ticket.user_id, Some(ALICE));
    assert_eq!(checkout.ticket.status, TicketStatus::Pending);

    let request = fx.gateway.created.lock().unwrap()[0].clone();
    assert_eq!(request.amount, PRICE);
    assert_eq!(request.order_id, checkout.ticket.id);
    assert_eq!(request.currency, "UAH");

    let (data, signature) = signed_callback(checkout.ticket.id, "success");
    let settlement = fx.coordinator.handle_callback(&data, &signature, None).await.unwrap();
    assert!(settlement.transitioned);
    assert_eq!(settlement.ticket.status, TicketStatus::Confirmed);
    assert_eq!(settlement.ticket.user_id, Some(ALICE));
    assert!(settlement.ticket.settled_at.is_some());
}

#[tokio::test]
async fn sandbox_status_counts_as_paid() {
    let fx = fixture().await;
    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();

    let (data, signature) = signed_callback(checkout.ticket.id, "sandbox");
    let settlement = fx.coordinator.handle_callback(&data, &signature, None).await.unwrap();
    assert_eq!(settlement.ticket.status, TicketStatus::Confirmed);
}

#[tokio::test]
async fn declined_payment_frees_the_seat() {
    let fx = fixture().await;
    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();

    let (data, signature) = signed_callback(checkout.ticket.id, "declined");
    let settlement = fx.coordinator.handle_callback(&data, &signature, None).await.unwrap();
    assert_eq!(settlement.ticket.status, TicketStatus::Failed);
    assert_eq!(settlement.ticket.user_id, None);
    assert_eq!(settlement.ticket.price, PRICE);

    let again = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, BOB).await.unwrap();
    assert_ne!(again.ticket.id, checkout.ticket.id);
    assert_eq!(again.ticket.user_id, Some(BOB));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_buyers_get_one_payment_link() {
    let fx = fixture().await;

    let alice = {
        let coordinator = fx.coordinator.clone();
        tokio::spawn(async move { coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await })
    };
    let bob = {
        let coordinator = fx.coordinator.clone();
        tokio::spawn(async move { coordinator.request_payment(SESSION_ID, SEAT_ID, BOB).await })
    };
    let results = [alice.await.unwrap(), bob.await.unwrap()];

    let links: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(links.len(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(BookingError::AlreadyReserved))));

    let ticket = fx.store.get_by_session_and_seat(SESSION_ID, SEAT_ID).await.unwrap();
    assert_eq!(ticket.user_id, links[0].ticket.user_id);
}

#[tokio::test]
async fn repeated_callback_is_applied_once() {
    let fx = fixture().await;
    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();
    let (data, signature) = signed_callback(checkout.ticket.id, "success");

    let first = fx.coordinator.handle_callback(&data, &signature, None).await.unwrap();
    let second = fx.coordinator.handle_callback(&data, &signature, None).await.unwrap();

    assert!(first.transitioned);
    assert!(!second.transitioned);
    assert_eq!(first.ticket, second.ticket);
}

#[tokio::test]
async fn late_conflicting_callback_is_ignored() {
    let fx = fixture().await;
    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();

    let (data, signature) = signed_callback(checkout.ticket.id, "success");
    fx.coordinator.handle_callback(&data, &signature, None).await.unwrap();

    let (data, signature) = signed_callback(checkout.ticket.id, "failure");
    let late = fx.coordinator.handle_callback(&data, &signature, None).await.unwrap();
    assert!(!late.transitioned);
    assert_eq!(late.ticket.status, TicketStatus::Confirmed);
    assert_eq!(late.ticket.user_id, Some(ALICE));
}

#[tokio::test]
async fn price_survives_settlement_after_session_repricing() {
    let fx = fixture().await;
    let paid = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();
    let declined = fx.coordinator.request_payment(SESSION_ID, NEIGHBOUR_SEAT_ID, BOB).await.unwrap();

    fx.store.set_session_price(SESSION_ID, 999.0).await;

    let (data, signature) = signed_callback(paid.ticket.id, "success");
    let confirmed = fx.coordinator.handle_callback(&data, &signature, None).await.unwrap();
    let (data, signature) = signed_callback(declined.ticket.id, "failure");
    let failed = fx.coordinator.handle_callback(&data, &signature, None).await.unwrap();

    assert_eq!(confirmed.ticket.price, PRICE);
    assert_eq!(failed.ticket.price, PRICE);
}

#[tokio::test]
async fn callback_for_unknown_order_is_not_found() {
    let fx = fixture().await;
    let (data, signature) = signed_callback(404, "success");

    let err = fx.coordinator.handle_callback(&data, &signature, None).await.unwrap_err();
    assert!(matches!(err, BookingError::NotFound("ticket")));
}

#[tokio::test]
async fn path_order_must_match_payload() {
    let fx = fixture().await;
    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();
    let (data, signature) = signed_callback(checkout.ticket.id, "success");

    let err = fx
        .coordinator
        .handle_callback(&data, &signature, Some(checkout.ticket.id + 1))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::BadPayload(_)));
    assert_eq!(
        fx.store.get_by_id(checkout.ticket.id).await.unwrap().status,
        TicketStatus::Pending
    );

    let ok = fx
        .coordinator
        .handle_callback(&data, &signature, Some(checkout.ticket.id))
        .await
        .unwrap();
    assert_eq!(ok.ticket.status, TicketStatus::Confirmed);
}

#[tokio::test]
async fn gateway_failure_leaves_ticket_unclaimed() {
    let fx = fixture().await;
    fx.gateway.fail_create.store(true, Ordering::SeqCst);

    let err = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap_err();
    assert!(matches!(err, BookingError::Gateway(_)));

    let ticket = fx.store.get_by_session_and_seat(SESSION_ID, SEAT_ID).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Pending);
    assert_eq!(ticket.user_id, None);

    // Место не потеряно: другой покупатель получает тот же билет
    fx.gateway.fail_create.store(false, Ordering::SeqCst);
    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, BOB).await.unwrap();
    assert_eq!(checkout.ticket.id, ticket.id);
}

#[tokio::test]
async fn owner_can_request_a_fresh_link() {
    let fx = fixture().await;
    let first = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();
    let second = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();

    assert_eq!(first.ticket.id, second.ticket.id);
    assert_eq!(fx.gateway.created_count(), 2);

    let err = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, BOB).await.unwrap_err();
    assert!(matches!(err, BookingError::AlreadyReserved));
}

#[tokio::test]
async fn existing_ticket_can_be_paid_by_id() {
    let fx = fixture().await;
    let ticket = fx.ledger.reserve(SESSION_ID, SEAT_ID, Some(120.0)).await.unwrap();

    let checkout = fx.coordinator.request_payment_for_ticket(ticket.id, BOB).await.unwrap();
    assert_eq!(checkout.ticket.user_id, Some(BOB));
    assert_eq!(fx.gateway.created.lock().unwrap()[0].amount, 120.0);

    let err = fx
        .coordinator
        .request_payment_for_ticket(ticket.id, ALICE)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::AlreadyReserved));
}

#[tokio::test]
async fn refresh_applies_provider_status() {
    let fx = fixture().await;
    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();

    fx.gateway.set_provider(ProviderState::Status("wait_secure"));
    let refresh = fx.coordinator.refresh(checkout.ticket.id).await.unwrap();
    assert!(matches!(refresh, Refresh::InProgress(_)));

    fx.gateway.set_provider(ProviderState::Status("success"));
    match fx.coordinator.refresh(checkout.ticket.id).await.unwrap() {
        Refresh::Settled(settlement) => {
            assert!(settlement.transitioned);
            assert_eq!(settlement.ticket.status, TicketStatus::Confirmed);
        }
        other => panic!("expected settlement, got {other:?}"),
    }
}

#[tokio::test]
async fn refresh_without_provider_record_changes_nothing() {
    let fx = fixture().await;
    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();

    let refresh = fx.coordinator.refresh(checkout.ticket.id).await.unwrap();
    assert!(matches!(refresh, Refresh::NoPayment(_)));
    assert_eq!(refresh.ticket().status, TicketStatus::Pending);
}

#[tokio::test]
async fn declined_payment_is_settled_in_one_write() {
    let store = seeded_store().await;
    let tickets = Arc::new(SingleSettleStore {
        inner: store.clone(),
        settled: AtomicBool::new(false),
    });
    let ledger = SeatLedger::new(store.clone(), tickets.clone());
    let coordinator = SettlementCoordinator::new(ledger, tickets, Arc::new(StubGateway::new()), "UAH");

    let checkout = coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();
    let (data, signature) = signed_callback(checkout.ticket.id, "declined");
    let settlement = coordinator.handle_callback(&data, &signature, None).await.unwrap();
    assert!(settlement.transitioned);

    let stored = store.get_by_id(checkout.ticket.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::Failed);
    assert_eq!(stored.user_id, None);
}

#[tokio::test]
async fn expired_claimed_ticket_loses_owner() {
    let fx = fixture().await;
    let checkout = fx.coordinator.request_payment(SESSION_ID, SEAT_ID, ALICE).await.unwrap();

    let settlement = fx.coordinator.expire(checkout.ticket.id).await.unwrap();
    assert!(settlement.transitioned);
    assert_eq!(settlement.ticket.status, TicketStatus::Failed);
    assert_eq!(settlement.ticket.user_id, None);
    assert!(fx.store.list_by_user(ALICE).await.unwrap().is_empty());
}
