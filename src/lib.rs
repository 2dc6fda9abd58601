pub mod auth;
pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use anyhow::Context;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::JwtAuthenticator;
use crate::cache::CacheService;
use crate::config::Config;
use crate::database::Database;
use crate::redis_client::RedisClient;
use crate::services::{ExpiryService, LiqPayGateway, PaymentGateway, SeatLedger, SettlementCoordinator};
use crate::store::{CatalogStore, TicketStore, UserDirectory};

// Shared state для всего приложения
pub struct AppState {
    pub config: Config,
    pub cache: CacheService,
    pub tickets: Arc<dyn TicketStore>,
    pub users: Arc<dyn UserDirectory>,
    pub coordinator: SettlementCoordinator,
    pub authenticator: JwtAuthenticator,
}

/// Внешние зависимости состояния: хранилища, шлюз и (необязательный) Redis.
pub struct Backends {
    pub catalog: Arc<dyn CatalogStore>,
    pub tickets: Arc<dyn TicketStore>,
    pub users: Arc<dyn UserDirectory>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub redis: Option<RedisClient>,
}

impl AppState {
    /// Подключается к PostgreSQL, Redis и платёжному шлюзу по конфигурации.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let db = Database::connect(&config.database)
            .await
            .context("failed to connect to database")?;
        db.run_migrations().await.context("failed to run migrations")?;
        let store = Arc::new(db.store());

        // Без Redis работаем, просто без кеша карты мест
        let redis = match RedisClient::new(&config.redis.url).await {
            Ok(redis) => {
                info!("Redis connected");
                Some(redis)
            }
            Err(e) => {
                warn!("Redis unavailable, seat maps will not be cached: {}", e);
                None
            }
        };

        let gateway = LiqPayGateway::from_config(&config.payment)
            .context("failed to build payment gateway client")?;

        Ok(Self::from_parts(
            config,
            Backends {
                catalog: store.clone(),
                tickets: store.clone(),
                users: store,
                gateway: Arc::new(gateway),
                redis,
            },
        ))
    }

    pub fn from_parts(config: Config, backends: Backends) -> Arc<Self> {
        let ledger = SeatLedger::new(backends.catalog.clone(), backends.tickets.clone());
        let coordinator = SettlementCoordinator::new(
            ledger,
            backends.tickets.clone(),
            backends.gateway,
            config.payment.currency.clone(),
        );
        let cache = CacheService::new(backends.redis, backends.catalog, config.redis.seat_map_ttl);
        let authenticator = JwtAuthenticator::from_config(&config.jwt);

        Arc::new(Self {
            config,
            cache,
            tickets: backends.tickets,
            users: backends.users,
            coordinator,
            authenticator,
        })
    }

    pub fn expiry_service(&self) -> ExpiryService {
        ExpiryService::new(
            self.coordinator.clone(),
            self.tickets.clone(),
            self.config.booking.pending_ttl,
        )
    }
}

/// Полный HTTP-роутер приложения.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Cinema Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
