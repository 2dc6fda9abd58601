#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cinema_booking::models::{Seat, Session, UserCredentials};
use cinema_booking::services::payment::{sign, GatewayError, PaymentGateway, PaymentRequest, PaymentResponse};
use cinema_booking::services::{SeatLedger, SettlementCoordinator};
use cinema_booking::store::MemoryStore;

pub const PRIVATE_KEY: &str = "sandbox_private_key";
pub const SESSION_ID: i64 = 7;
pub const SEAT_ID: i64 = 12;
pub const NEIGHBOUR_SEAT_ID: i64 = 11;
/// Место из другого зала.
pub const FOREIGN_SEAT_ID: i64 = 13;
pub const PRICE: f64 = 150.0;

pub const ALICE: i64 = 5;
pub const BOB: i64 = 6;
pub const ADMIN: i64 = 1;

/// Что провайдер ответит на запрос статуса.
#[derive(Debug, Clone)]
pub enum ProviderState {
    Unknown,
    Status(&'static str),
    Unreachable,
}

/// Шлюз-заглушка: подписывает так же, как настоящий, и запоминает запросы.
pub struct StubGateway {
    pub fail_create: AtomicBool,
    pub created: Mutex<Vec<PaymentRequest>>,
    pub provider: Mutex<ProviderState>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            fail_create: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
            provider: Mutex::new(ProviderState::Unknown),
        }
    }

    pub fn set_provider(&self, state: ProviderState) {
        *self.provider.lock().unwrap() = state;
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentResponse, GatewayError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("stub refused".into()));
        }
        self.created.lock().unwrap().push(request.clone());
        Ok(PaymentResponse {
            order_id: request.order_id,
            status: "pending".into(),
            url: format!("https://pay.example/checkout/{}", request.order_id),
        })
    }

    fn verify_signature(&self, data: &str, signature: &str) -> bool {
        sign(PRIVATE_KEY, data) == signature
    }

    async fn query_status(&self, _order_id: i64) -> Result<Option<String>, GatewayError> {
        match self.provider.lock().unwrap().clone() {
            ProviderState::Unknown => Ok(None),
            ProviderState::Status(status) => Ok(Some(status.to_string())),
            ProviderState::Unreachable => Err(GatewayError::Malformed("stub is down".into())),
        }
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<StubGateway>,
    pub ledger: SeatLedger,
    pub coordinator: SettlementCoordinator,
}

/// Сеанс 7 в зале 1 по 150.0; места 11 и 12 в зале 1, место 13 в зале 2.
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for (id, room_id, number) in [(NEIGHBOUR_SEAT_ID, 1, 1), (SEAT_ID, 1, 2), (FOREIGN_SEAT_ID, 2, 1)] {
        store.add_seat(Seat { id, room_id, row: 1, number }).await;
    }
    store
        .add_session(Session {
            id: SESSION_ID,
            movie_id: 1,
            room_id: 1,
            start_time: Utc::now(),
            price: PRICE,
        })
        .await;

    for (user_id, email, role) in [
        (ADMIN, "admin@cinema.test", "admin"),
        (ALICE, "alice@cinema.test", "user"),
        (BOB, "bob@cinema.test", "user"),
    ] {
        store
            .add_user(
                UserCredentials {
                    user_id,
                    email: email.to_string(),
                    password_hash: bcrypt::hash("password", 4).unwrap(),
                    is_active: true,
                },
                role,
            )
            .await;
    }
    store
}

pub async fn fixture() -> Fixture {
    let store = seeded_store().await;
    let gateway = Arc::new(StubGateway::new());
    let ledger = SeatLedger::new(store.clone(), store.clone());
    let coordinator = SettlementCoordinator::new(ledger.clone(), store.clone(), gateway.clone(), "UAH");
    Fixture {
        store,
        gateway,
        ledger,
        coordinator,
    }
}

/// Уведомление провайдера с корректной подписью.
pub fn signed_callback(order_id: i64, status: &str) -> (String, String) {
    let payload = serde_json::json!({ "order_id": order_id.to_string(), "status": status });
    let data = BASE64.encode(payload.to_string());
    let signature = sign(PRIVATE_KEY, &data);
    (data, signature)
}
