use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub payment: PaymentConfig,
    pub booking: BookingConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    /// Предельное время одного запроса к базе.
    pub query_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub seat_map_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub expires_in_hours: i64,
}

// Настройки платёжного шлюза (LiqPay)
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub public_key: String,
    pub private_key: String,
    pub api_url: String,
    /// Куда провайдер вернёт покупателя; к адресу дописывается номер заказа.
    pub result_url: String,
    /// Адрес для уведомлений провайдера о статусе.
    pub server_url: String,
    pub currency: String,
    pub sandbox: bool,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Сколько неоплаченный билет может висеть в pending.
    pub pending_ttl: Duration,
    pub sweep_interval: Duration,
}

fn parse<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn parse_bool(key: &'static str, raw: String) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника ключей.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            app: AppConfig {
                host: or_default("HOST", "0.0.0.0"),
                port: parse("PORT", or_default("PORT", "8000"))?,
                rust_log: or_default("RUST_LOG", "cinema_booking=debug,tower_http=debug"),
                json_logs: or_default("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_size: parse("DB_POOL_SIZE", or_default("DB_POOL_SIZE", "20"))?,
                query_timeout: Duration::from_millis(parse(
                    "DB_QUERY_TIMEOUT_MS",
                    or_default("DB_QUERY_TIMEOUT_MS", "5000"),
                )?),
            },
            redis: RedisConfig {
                url: required("REDIS_URL")?,
                seat_map_ttl: Duration::from_secs(parse(
                    "SEAT_MAP_CACHE_TTL_SECONDS",
                    or_default("SEAT_MAP_CACHE_TTL_SECONDS", "30"),
                )?),
            },
            jwt: JwtConfig {
                secret: required("JWT_SECRET")?,
                issuer: or_default("JWT_ISSUER", "cinema_booking"),
                expires_in_hours: parse("JWT_EXPIRES_IN_HOURS", or_default("JWT_EXPIRES_IN_HOURS", "24"))?,
            },
            payment: PaymentConfig {
                public_key: required("PAYMENT_PUBLIC_KEY")?,
                private_key: required("PAYMENT_PRIVATE_KEY")?,
                api_url: or_default("PAYMENT_API_URL", "https://www.liqpay.ua/api/request"),
                result_url: or_default("PAYMENT_RESULT_URL", "http://localhost:3000/orders/"),
                server_url: required("PAYMENT_SERVER_URL")?,
                currency: or_default("PAYMENT_CURRENCY", "UAH"),
                sandbox: parse_bool("PAYMENT_SANDBOX", or_default("PAYMENT_SANDBOX", "true"))?,
                timeout_seconds: parse(
                    "PAYMENT_TIMEOUT_SECONDS",
                    or_default("PAYMENT_TIMEOUT_SECONDS", "10"),
                )?,
            },
            booking: BookingConfig {
                pending_ttl: Duration::from_secs(parse::<u32>(
                    "BOOKING_PENDING_TTL_SECONDS",
                    or_default("BOOKING_PENDING_TTL_SECONDS", "900"),
                )?
                .into()),
                sweep_interval: Duration::from_secs(parse(
                    "BOOKING_SWEEP_INTERVAL_SECONDS",
                    or_default("BOOKING_SWEEP_INTERVAL_SECONDS", "60"),
                )?),
            },
        })
    }
}
