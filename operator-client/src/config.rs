//! Console configuration

use std::env;
use std::time::Duration;

use operator_core::{ConsoleError, ConsoleResult, NotificationPermission};
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Fixed delay before reconnecting the push channel
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Total timeout for command gateway requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for the chat stream; the body itself is unbounded
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the operator console
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// REST base URL of the bot API (no trailing slash)
    pub api_url: String,
    /// Push channel URL
    pub ws_url: String,
    pub reconnect_delay: Duration,
    /// How often the console prints a status line
    pub status_interval: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub notifications: NotificationPermission,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: "ws://localhost:8000/ws".to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            status_interval: DEFAULT_STATUS_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            notifications: NotificationPermission::Granted,
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from environment variables
    ///
    /// Reads:
    /// - OPERATOR_API_URL: REST base URL (default http://localhost:8000)
    /// - OPERATOR_WS_URL: push channel URL (default derived from the API URL)
    /// - OPERATOR_RECONNECT_DELAY_MS: fixed reconnect delay
    /// - OPERATOR_STATUS_INTERVAL_SECS: status line interval
    /// - OPERATOR_REQUEST_TIMEOUT_SECS: command request timeout (default 30)
    /// - OPERATOR_CONNECT_TIMEOUT_SECS: chat connect timeout (default 10)
    /// - OPERATOR_NOTIFICATIONS: "granted" or "denied"
    pub fn from_env() -> ConsoleResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ConsoleResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("OPERATOR_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let ws_url = match lookup("OPERATOR_WS_URL") {
            Some(url) => url,
            None => derive_ws_url(&api_url)?,
        };
        Url::parse(&ws_url)
            .map_err(|e| ConsoleError::config(format!("OPERATOR_WS_URL {}: {}", ws_url, e)))?;

        let reconnect_delay = match lookup("OPERATOR_RECONNECT_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_positive(&raw, "OPERATOR_RECONNECT_DELAY_MS")?),
            None => DEFAULT_RECONNECT_DELAY,
        };

        let status_interval = match lookup("OPERATOR_STATUS_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(parse_positive(&raw, "OPERATOR_STATUS_INTERVAL_SECS")?),
            None => DEFAULT_STATUS_INTERVAL,
        };

        let request_timeout = match lookup("OPERATOR_REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_positive(&raw, "OPERATOR_REQUEST_TIMEOUT_SECS")?),
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let connect_timeout = match lookup("OPERATOR_CONNECT_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_positive(&raw, "OPERATOR_CONNECT_TIMEOUT_SECS")?),
            None => DEFAULT_CONNECT_TIMEOUT,
        };

        let notifications = match lookup("OPERATOR_NOTIFICATIONS").as_deref().map(str::trim) {
            None | Some("") => NotificationPermission::Granted,
            Some(v) if v.eq_ignore_ascii_case("granted") => NotificationPermission::Granted,
            Some(v) if v.eq_ignore_ascii_case("denied") => NotificationPermission::Denied,
            Some(other) => {
                return Err(ConsoleError::config(format!(
                    "OPERATOR_NOTIFICATIONS must be 'granted' or 'denied', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            api_url,
            ws_url,
            reconnect_delay,
            status_interval,
            request_timeout,
            connect_timeout,
            notifications,
        })
    }
}

/// Map http(s)://host[:port] to ws(s)://host[:port]/ws
fn derive_ws_url(api_url: &str) -> ConsoleResult<String> {
    let mut url = Url::parse(api_url)
        .map_err(|e| ConsoleError::config(format!("OPERATOR_API_URL {}: {}", api_url, e)))?;

    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ConsoleError::config(format!(
                "OPERATOR_API_URL has unsupported scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ConsoleError::config("cannot derive websocket URL"))?;
    url.set_path("/ws");
    Ok(url.to_string())
}

/// Parse a duration count that must be non-zero
fn parse_positive(raw: &str, field: &str) -> ConsoleResult<u64> {
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConsoleError::config(format!("{} must be a number: {}", field, e)))?;
    if value == 0 {
        return Err(ConsoleError::config(format!("{} must be greater than zero", field)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ConsoleResult<ConsoleConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConsoleConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.ws_url, "ws://localhost:8000/ws");
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.notifications, NotificationPermission::Granted);
    }

    #[test]
    fn test_ws_url_derived_from_https() {
        let config = config_from(&[("OPERATOR_API_URL", "https://bot.example.com/")]).unwrap();
        assert_eq!(config.api_url, "https://bot.example.com");
        assert_eq!(config.ws_url, "wss://bot.example.com/ws");
    }

    #[test]
    fn test_explicit_values() {
        let config = config_from(&[
            ("OPERATOR_WS_URL", "ws://10.0.0.2:9000/ws"),
            ("OPERATOR_RECONNECT_DELAY_MS", "500"),
            ("OPERATOR_STATUS_INTERVAL_SECS", "5"),
            ("OPERATOR_REQUEST_TIMEOUT_SECS", "8"),
            ("OPERATOR_CONNECT_TIMEOUT_SECS", "2"),
            ("OPERATOR_NOTIFICATIONS", "Denied"),
        ])
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(8));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.ws_url, "ws://10.0.0.2:9000/ws");
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.status_interval, Duration::from_secs(5));
        assert_eq!(config.notifications, NotificationPermission::Denied);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config_from(&[("OPERATOR_RECONNECT_DELAY_MS", "soon")]).is_err());
        assert!(config_from(&[("OPERATOR_NOTIFICATIONS", "maybe")]).is_err());
        assert!(config_from(&[("OPERATOR_API_URL", "ftp://host")]).is_err());
        assert!(config_from(&[("OPERATOR_WS_URL", "not a url")]).is_err());
    }

    #[test]
    fn test_zero_durations_rejected() {
        for key in [
            "OPERATOR_RECONNECT_DELAY_MS",
            "OPERATOR_STATUS_INTERVAL_SECS",
            "OPERATOR_REQUEST_TIMEOUT_SECS",
            "OPERATOR_CONNECT_TIMEOUT_SECS",
        ] {
            assert!(config_from(&[(key, "0")]).is_err(), "{} accepted 0", key);
        }
    }
}
