//! Адаптер платёжного шлюза.
//!
//! Шлюз скрыт за трейтом `PaymentGateway`: координатор расчётов знает только
//! три операции (создать платёж, проверить подпись уведомления, запросить
//! статус). Реализация для LiqPay подписывает запросы как
//! `base64(sha1(private_key + data + private_key))`, где `data` это base64 JSON.
//!
//! Адаптер не хранит состояния кроме конфигурации и пула HTTP-соединений,
//! поэтому его можно делить между задачами без синхронизации. Повторов нет:
//! ошибка шлюза сразу возвращается вызывающему.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PaymentConfig;
use crate::error::BookingError;

/// Запрос на создание платежа. Не сохраняется.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: f64,
    pub currency: String,
    pub description: String,
    /// Номер заказа у провайдера: id билета.
    pub order_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentResponse {
    pub order_id: i64,
    pub status: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected payment gateway reply: {0}")]
    Malformed(String),
}

impl From<GatewayError> for BookingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transport(e) => BookingError::Transient(format!("payment gateway: {e}")),
            other => BookingError::Gateway(other.to_string()),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Создаёт платёж на стороне провайдера и возвращает ссылку на оплату.
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentResponse, GatewayError>;

    /// Проверяет подпись уведомления по сырому `data`, до любого декодирования.
    fn verify_signature(&self, data: &str, signature: &str) -> bool;

    /// Статус платежа у провайдера. `None`, если провайдер о заказе не знает.
    async fn query_status(&self, order_id: i64) -> Result<Option<String>, GatewayError>;
}

/// Подпись LiqPay: base64(sha1(private_key + data + private_key)).
pub fn sign(private_key: &str, data: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(private_key.as_bytes());
    hasher.update(data.as_bytes());
    hasher.update(private_key.as_bytes());
    BASE64.encode(hasher.finalize())
}

fn encode_data<T: Serialize>(payload: &T) -> Result<String, GatewayError> {
    let json = serde_json::to_vec(payload).map_err(|e| GatewayError::Malformed(e.to_string()))?;
    Ok(BASE64.encode(json))
}

// --- Модели API LiqPay ---

#[derive(Debug, Serialize)]
struct CheckoutData<'a> {
    version: u8,
    public_key: &'a str,
    action: &'a str,
    action_payment: &'a str,
    amount: f64,
    currency: &'a str,
    description: &'a str,
    order_id: String,
    result_url: String,
    server_url: &'a str,
    sandbox: u8,
}

#[derive(Debug, Serialize)]
struct StatusData<'a> {
    version: u8,
    public_key: &'a str,
    action: &'a str,
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    result: Option<String>,
    status: Option<String>,
    url_checkout: Option<String>,
    err_code: Option<String>,
    err_description: Option<String>,
}

impl ApiReply {
    fn rejection(&self) -> String {
        self.err_description
            .clone()
            .or_else(|| self.err_code.clone())
            .unwrap_or_else(|| "no error description".to_string())
    }
}

/// Клиент LiqPay API.
#[derive(Clone)]
pub struct LiqPayGateway {
    public_key: String,
    private_key: String,
    api_url: String,
    result_url: String,
    server_url: String,
    sandbox: bool,
    http_client: reqwest::Client,
}

impl LiqPayGateway {
    pub fn from_config(config: &PaymentConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            public_key: config.public_key.clone(),
            private_key: config.private_key.clone(),
            api_url: config.api_url.clone(),
            result_url: config.result_url.clone(),
            server_url: config.server_url.clone(),
            sandbox: config.sandbox,
            http_client,
        })
    }

    async fn call(&self, data: String) -> Result<ApiReply, GatewayError> {
        let signature = sign(&self.private_key, &data);
        let response = self
            .http_client
            .post(&self.api_url)
            .form(&[("data", data.as_str()), ("signature", signature.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("HTTP {status}")));
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for LiqPayGateway {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentResponse, GatewayError> {
        let order_id = request.order_id.to_string();
        let data = encode_data(&CheckoutData {
            version: 3,
            public_key: &self.public_key,
            action: "payment_prepare",
            action_payment: "pay",
            amount: request.amount,
            currency: &request.currency,
            description: &request.description,
            result_url: format!("{}{}", self.result_url, order_id),
            order_id,
            server_url: &self.server_url,
            sandbox: u8::from(self.sandbox),
        })?;

        info!(
            "Creating payment: order_id={}, amount={}, currency={}",
            request.order_id, request.amount, request.currency
        );

        let reply = self.call(data).await?;
        if reply.result.as_deref() != Some("ok") {
            warn!("Payment gateway refused order {}: {}", request.order_id, reply.rejection());
            return Err(GatewayError::Rejected(reply.rejection()));
        }
        let url = reply
            .url_checkout
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GatewayError::Malformed("reply has no url_checkout".to_string()))?;

        Ok(PaymentResponse {
            order_id: request.order_id,
            status: "pending".to_string(),
            url,
        })
    }

    fn verify_signature(&self, data: &str, signature: &str) -> bool {
        let expected = sign(&self.private_key, data);
        constant_time_eq::constant_time_eq(expected.as_bytes(), signature.trim().as_bytes())
    }

    async fn query_status(&self, order_id: i64) -> Result<Option<String>, GatewayError> {
        let data = encode_data(&StatusData {
            version: 3,
            public_key: &self.public_key,
            action: "status",
            order_id: order_id.to_string(),
        })?;

        let reply = self.call(data).await?;
        if reply.err_code.as_deref() == Some("payment_not_found") {
            return Ok(None);
        }
        if reply.result.as_deref() == Some("error") {
            return Err(GatewayError::Rejected(reply.rejection()));
        }
        reply
            .status
            .map(Some)
            .ok_or_else(|| GatewayError::Malformed("status reply has no status".to_string()))
    }
}

// Номер заказа в уведомлении приходит то строкой, то числом
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrderRef {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawNotice {
    order_id: OrderRef,
    status: String,
}

/// Расшифрованное уведомление провайдера о статусе платежа.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderNotice {
    pub order_id: i64,
    pub status: String,
}

impl ProviderNotice {
    /// Декодирует `data` уведомления. Вызывать только после проверки подписи.
    pub fn decode(data: &str) -> Result<Self, BookingError> {
        let raw = BASE64
            .decode(data)
            .map_err(|e| BookingError::BadPayload(format!("data is not base64: {e}")))?;
        let notice: RawNotice = serde_json::from_slice(&raw)
            .map_err(|e| BookingError::BadPayload(format!("data is not a payment notice: {e}")))?;

        let order_id = match notice.order_id {
            OrderRef::Number(id) => id,
            OrderRef::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| BookingError::BadPayload(format!("order_id {text:?} is not a ticket id")))?,
        };

        Ok(Self {
            order_id,
            status: notice.status,
        })
    }
}

/// Статусы LiqPay, при которых платёж ещё не завершён.
pub fn is_in_progress(status: &str) -> bool {
    matches!(
        status,
        "processing"
            | "prepared"
            | "wait_secure"
            | "wait_accept"
            | "wait_card"
            | "wait_lc"
            | "wait_reserve"
            | "wait_compensation"
            | "invoice_wait"
            | "hold_wait"
            | "3ds_verify"
            | "otp_verify"
            | "cvv_verify"
            | "captcha_verify"
            | "ivr_verify"
            | "password_verify"
            | "phone_verify"
            | "pin_verify"
            | "senderapp_verify"
            | "sender_verify"
            | "receiver_verify"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_provider_formula() {
        assert_eq!(sign("a", "b"), "TV7M+Tc5xjBar4lppoLMV+H9c5U=");
        assert_eq!(
            sign(
                "sandbox_private_key",
                "eyJvcmRlcl9pZCI6IjQyIiwic3RhdHVzIjoic3VjY2VzcyJ9"
            ),
            "/BnUikUu9Rv9aggbTJ0EXIq4fnE="
        );
    }

    #[test]
    fn notice_accepts_string_and_numeric_order_ids() {
        let text = ProviderNotice::decode("eyJvcmRlcl9pZCI6IjQyIiwic3RhdHVzIjoic3VjY2VzcyJ9").unwrap();
        assert_eq!(text, ProviderNotice { order_id: 42, status: "success".into() });

        let number = ProviderNotice::decode("eyJvcmRlcl9pZCI6NDIsInN0YXR1cyI6ImZhaWx1cmUifQ==").unwrap();
        assert_eq!(number, ProviderNotice { order_id: 42, status: "failure".into() });
    }

    #[test]
    fn garbage_notice_is_bad_payload() {
        assert!(matches!(ProviderNotice::decode("%%%"), Err(BookingError::BadPayload(_))));
        let not_json = BASE64.encode("order 42 paid");
        assert!(matches!(ProviderNotice::decode(&not_json), Err(BookingError::BadPayload(_))));
        let bad_id = BASE64.encode(r#"{"order_id":"abc","status":"success"}"#);
        assert!(matches!(ProviderNotice::decode(&bad_id), Err(BookingError::BadPayload(_))));
    }

    #[test]
    fn rejections_surface_as_gateway_errors() {
        let err: BookingError = GatewayError::Rejected("limit".into()).into();
        assert!(matches!(err, BookingError::Gateway(_)));
    }
}
