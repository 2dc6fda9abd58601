use serde::Serialize;
use sqlx::FromRow;

/// Пользователь, которого вернул провайдер идентификации, с уровнем роли.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
    pub role: String,
    pub level: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub user_id: i64,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
}
