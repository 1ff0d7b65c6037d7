//! Command gateway for the bot's control API
//!
//! Every call is a JSON request against the bot API. Non-2xx responses are
//! turned into `ConsoleError::Api` carrying the server's `detail` text.

use std::time::Duration;

use async_trait::async_trait;
use operator_core::{ConsoleError, ConsoleResult};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_REQUEST_TIMEOUT;

/// Control operations on the remote bot
#[async_trait]
pub trait CommandGateway: Send + Sync + 'static {
    async fn start(&self, token_ids: &[String]) -> ConsoleResult<Value>;
    async fn stop(&self) -> ConsoleResult<Value>;
    /// Close all positions
    async fn cashout(&self) -> ConsoleResult<Value>;
    async fn add_markets(&self, token_ids: &[String]) -> ConsoleResult<Value>;
    async fn remove_markets(&self, token_ids: &[String]) -> ConsoleResult<Value>;
    async fn update_config(&self, update: &ConfigUpdate) -> ConsoleResult<Value>;
}

/// Partial bot configuration; unset fields are left unchanged server-side
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_trading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_websocket: Option<bool>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub base_spread: Option<Decimal>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub order_size: Option<Decimal>,
    /// Whole shares
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_position: Option<u64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub max_exposure: Option<Decimal>,
    /// Quote refresh interval in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<f64>,
}

impl ConfigUpdate {
    /// Set one field from a `key=value` pair
    pub fn set(&mut self, key: &str, value: &str) -> ConsoleResult<()> {
        let value = value.trim();
        match key.trim() {
            "paper_trading" => self.paper_trading = Some(parse_bool(key, value)?),
            "use_websocket" => self.use_websocket = Some(parse_bool(key, value)?),
            "base_spread" => self.base_spread = Some(parse_decimal(key, value)?),
            "order_size" => self.order_size = Some(parse_decimal(key, value)?),
            "max_position" => {
                let shares = value.parse::<u64>().map_err(|_| {
                    ConsoleError::parse(format!("{} must be a whole number of shares", key))
                })?;
                self.max_position = Some(shares);
            }
            "max_exposure" => self.max_exposure = Some(parse_decimal(key, value)?),
            "refresh_interval" => {
                let secs = value
                    .parse::<f64>()
                    .map_err(|e| ConsoleError::parse(format!("{}: {}", key, e)))?;
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(ConsoleError::parse("refresh_interval must be positive"));
                }
                self.refresh_interval = Some(secs);
            }
            other => return Err(ConsoleError::parse(format!("unknown config key '{}'", other))),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn parse_bool(key: &str, value: &str) -> ConsoleResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(ConsoleError::parse(format!("{} must be true or false", key))),
    }
}

fn parse_decimal(key: &str, value: &str) -> ConsoleResult<Decimal> {
    let parsed = value
        .parse::<Decimal>()
        .map_err(|e| ConsoleError::parse(format!("{}: {}", key, e)))?;
    if parsed.is_sign_negative() {
        return Err(ConsoleError::parse(format!("{} must not be negative", key)));
    }
    Ok(parsed)
}

// ============================================================================
// HTTP Gateway
// ============================================================================

/// [`CommandGateway`] over the bot's REST API
#[derive(Debug, Clone)]
pub struct HttpCommandGateway {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpCommandGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Gateway whose requests fail once `timeout` elapses
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent("operator-console/1.0")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, path: &str, body: Option<Value>) -> ConsoleResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("[Gateway] POST {}", url);

        let mut request = self.http_client.post(&url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(network_error)?;
        read_json(ensure_success(response).await?).await
    }
}

#[async_trait]
impl CommandGateway for HttpCommandGateway {
    async fn start(&self, token_ids: &[String]) -> ConsoleResult<Value> {
        info!("[Gateway] Starting bot with {} market(s)", token_ids.len());
        self.post("/api/bot/start", Some(json!({ "token_ids": token_ids })))
            .await
    }

    async fn stop(&self) -> ConsoleResult<Value> {
        info!("[Gateway] Stopping bot");
        self.post("/api/bot/stop", None).await
    }

    async fn cashout(&self) -> ConsoleResult<Value> {
        info!("[Gateway] Cashing out all positions");
        self.post("/api/bot/cashout", None).await
    }

    async fn add_markets(&self, token_ids: &[String]) -> ConsoleResult<Value> {
        self.post("/api/bot/markets/add", Some(json!({ "token_ids": token_ids })))
            .await
    }

    async fn remove_markets(&self, token_ids: &[String]) -> ConsoleResult<Value> {
        self.post(
            "/api/bot/markets/remove",
            Some(json!({ "token_ids": token_ids })),
        )
        .await
    }

    async fn update_config(&self, update: &ConfigUpdate) -> ConsoleResult<Value> {
        let url = format!("{}/api/config", self.base_url);
        debug!("[Gateway] PUT {}", url);

        let response = self
            .http_client
            .put(&url)
            .json(update)
            .send()
            .await
            .map_err(network_error)?;
        read_json(ensure_success(response).await?).await
    }
}

// ============================================================================
// Response Helpers
// ============================================================================

pub(crate) fn network_error(err: reqwest::Error) -> ConsoleError {
    ConsoleError::network(err.to_string())
}

/// Pass a 2xx response through; anything else becomes `ConsoleError::Api`
pub(crate) async fn ensure_success(response: reqwest::Response) -> ConsoleResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let fallback = status.canonical_reason().unwrap_or("request failed");
    let detail = error_detail(&body, fallback);
    warn!("[Gateway] {} - {}", status, detail);
    Err(ConsoleError::api(status.as_u16(), detail))
}

async fn read_json(response: reqwest::Response) -> ConsoleResult<Value> {
    let body = response.text().await.map_err(network_error)?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

/// Extract the human-readable error text from an error body
///
/// Prefers a `detail` field (string, or the first validation message when
/// it is a list), then the raw body, then `fallback`.
fn error_detail(body: &str, fallback: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        match value.get("detail") {
            Some(Value::String(detail)) => return detail.clone(),
            Some(Value::Array(items)) => {
                if let Some(msg) = items.first().and_then(|i| i.get("msg")).and_then(Value::as_str) {
                    return msg.to_string();
                }
            }
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }

    let body = body.trim();
    if body.is_empty() {
        fallback.to_string()
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_request_times_out_when_server_never_replies() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let gateway =
            HttpCommandGateway::with_timeout(format!("http://{}", addr), Duration::from_millis(200));
        let result = tokio::time::timeout(Duration::from_secs(5), gateway.stop()).await;

        match result {
            Ok(Err(ConsoleError::Network(_))) => {}
            other => panic!("expected network timeout, got {:?}", other),
        }
        server.abort();
    }

    #[test]
    fn test_error_detail_string() {
        assert_eq!(
            error_detail(r#"{"detail":"Bot is already running"}"#, "Bad Request"),
            "Bot is already running"
        );
    }

    #[test]
    fn test_error_detail_validation_list() {
        let body = r#"{"detail":[{"loc":["body","token_ids"],"msg":"field required","type":"missing"}]}"#;
        assert_eq!(error_detail(body, "Unprocessable Entity"), "field required");
    }

    #[test]
    fn test_error_detail_falls_back() {
        assert_eq!(error_detail("upstream timeout", "Bad Gateway"), "upstream timeout");
        assert_eq!(error_detail("", "Bad Gateway"), "Bad Gateway");
        assert_eq!(error_detail(r#"{"error":"x"}"#, "Bad Gateway"), r#"{"error":"x"}"#);
    }

    #[test]
    fn test_config_update_serializes_only_set_fields() {
        let mut update = ConfigUpdate::default();
        assert!(update.is_empty());

        update.set("base_spread", "0.02").unwrap();
        update.set("paper_trading", "off").unwrap();
        assert!(!update.is_empty());

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, json!({ "base_spread": 0.02, "paper_trading": false }));
    }

    #[test]
    fn test_config_update_set_fields() {
        let mut update = ConfigUpdate::default();
        update.set("order_size", "25").unwrap();
        update.set("max_exposure", "500.5").unwrap();
        update.set("max_position", "200").unwrap();
        update.set("refresh_interval", "2.5").unwrap();
        update.set("use_websocket", "true").unwrap();

        assert_eq!(update.order_size, Some(dec!(25)));
        assert_eq!(update.max_exposure, Some(dec!(500.5)));
        assert_eq!(update.max_position, Some(200));
        assert_eq!(serde_json::to_value(&update).unwrap()["max_position"], json!(200));
        assert_eq!(update.refresh_interval, Some(2.5));
        assert_eq!(update.use_websocket, Some(true));
    }

    #[test]
    fn test_config_update_rejects_bad_input() {
        let mut update = ConfigUpdate::default();
        assert!(update.set("leverage", "10").is_err());
        assert!(update.set("order_size", "ten").is_err());
        assert!(update.set("max_position", "-5").is_err());
        assert!(update.set("max_position", "500.5").is_err());
        assert!(update.set("paper_trading", "maybe").is_err());
        assert!(update.set("refresh_interval", "0").is_err());
        assert!(update.is_empty());
    }
}
