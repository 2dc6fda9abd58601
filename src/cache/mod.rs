use std::sync::Arc;
use std::time::Duration;

use crate::{redis_client::RedisClient, store::CatalogStore};

pub mod seats;

/// Кеш карты мест поверх каталога.
///
/// Redis необязателен: без него (или при его ошибках) данные читаются прямо
/// из хранилища.
#[derive(Clone)]
pub struct CacheService {
    redis: Option<RedisClient>,
    catalog: Arc<dyn CatalogStore>,
    ttl: Duration,
}

impl CacheService {
    pub fn new(redis: Option<RedisClient>, catalog: Arc<dyn CatalogStore>, ttl: Duration) -> Self {
        Self { redis, catalog, ttl }
    }
}
