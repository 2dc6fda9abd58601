use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::cache::CacheService;
use crate::error::Result;
use crate::models::SeatAvailability;

fn seats_key(session_id: i64) -> String {
    format!("seats:session:{}", session_id)
}

impl CacheService {
    /// Карта мест сеанса: сначала кеш, потом хранилище.
    pub async fn seat_map(&self, session_id: i64) -> Result<Vec<SeatAvailability>> {
        match self.get_seats_from_cache(session_id).await {
            Ok(Some(seats)) => return Ok(seats),
            Ok(None) => {}
            Err(e) => warn!("Seat map cache read failed for session {}: {}", session_id, e),
        }

        let seats = self.catalog.seat_map(session_id).await?;
        if let Err(e) = self.save_seats_to_cache(session_id, &seats).await {
            warn!("Seat map cache write failed for session {}: {}", session_id, e);
        }
        Ok(seats)
    }

    /// Сбрасывает кеш карты мест после любого изменения билета сеанса.
    pub async fn invalidate_seats(&self, session_id: i64) {
        let Some(redis) = &self.redis else {
            return;
        };
        let mut conn = redis.conn.clone();
        let result: redis::RedisResult<i64> = conn.del(seats_key(session_id)).await;
        if let Err(e) = result {
            warn!("Failed to invalidate seat map of session {}: {}", session_id, e);
        }
    }

    async fn get_seats_from_cache(&self, session_id: i64) -> redis::RedisResult<Option<Vec<SeatAvailability>>> {
        let Some(redis) = &self.redis else {
            return Ok(None);
        };
        let mut conn = redis.conn.clone();
        let data: Option<String> = conn.get(seats_key(session_id)).await?;
        match data {
            Some(json) => match serde_json::from_str(&json) {
                Ok(seats) => Ok(Some(seats)),
                Err(e) => {
                    // Битая запись: читаем из хранилища и перезаписываем
                    debug!("Discarding cached seat map of session {}: {}", session_id, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn save_seats_to_cache(&self, session_id: i64, seats: &[SeatAvailability]) -> redis::RedisResult<()> {
        let Some(redis) = &self.redis else {
            return Ok(());
        };
        let data = serde_json::to_string(seats).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error"))
        })?;
        let mut conn = redis.conn.clone();
        conn.set_ex(seats_key(session_id), data, self.ttl.as_secs().max(1)).await
    }
}
