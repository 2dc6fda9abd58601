use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::store::PgStore;

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
    query_timeout: Duration,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.query_timeout)
            .connect(&config.url)
            .await?;

        info!("Database pool ready ({} connections max)", config.pool_size);
        Ok(Database {
            pool,
            query_timeout: config.query_timeout,
        })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }

    /// Хранилище поверх пула; каждый запрос ограничен `query_timeout`.
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone(), self.query_timeout)
    }
}
