//! Realtime channel configuration types

use std::time::Duration;

use url::Url;

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult, Environment};

/// Default base delay between reconnection attempts (milliseconds)
const DEFAULT_RETRY_BASE_MS: u64 = 3000;

/// Default growth factor applied to the reconnect delay per attempt
const DEFAULT_RETRY_FACTOR: f64 = 1.5;

/// Default ceiling on automatic reconnection attempts
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Realtime channel configuration
///
/// The endpoint URL is resolved per deployment environment; the channel
/// itself never decides where to connect.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint URL (`ws://` or `wss://`)
    pub endpoint: String,

    /// Base delay between reconnection attempts
    pub retry_base: Duration,

    /// Multiplier applied to the delay for each successive attempt
    pub retry_factor: f64,

    /// Maximum number of automatic reconnection attempts
    pub max_reconnect_attempts: u32,
}

impl RealtimeConfig {
    /// Load realtime configuration from environment variables
    ///
    /// `REALTIME_URL` overrides the per-environment default endpoint.
    pub fn from_env(environment: Environment) -> ConfigResult<Self> {
        let endpoint = get_env_or_default("REALTIME_URL", default_endpoint(environment));

        let config = Self {
            endpoint,
            retry_base: Duration::from_millis(parse_env(
                "REALTIME_RETRY_BASE_MS",
                DEFAULT_RETRY_BASE_MS,
            )?),
            retry_factor: parse_env("REALTIME_RETRY_FACTOR", DEFAULT_RETRY_FACTOR)?,
            max_reconnect_attempts: parse_env(
                "REALTIME_MAX_RECONNECTS",
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create a configuration with a custom endpoint (useful for testing)
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            retry_base: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            retry_factor: DEFAULT_RETRY_FACTOR,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }

    /// Validate the endpoint URL and backoff tunables
    pub fn validate(&self) -> ConfigResult<()> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::InvalidUrl("REALTIME_URL".into(), e.to_string()))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ConfigError::InvalidUrl(
                    "REALTIME_URL".into(),
                    format!("expected ws:// or wss:// scheme, got {other}://"),
                ));
            }
        }

        if self.retry_factor < 1.0 {
            return Err(ConfigError::InvalidValue(
                "REALTIME_RETRY_FACTOR".into(),
                "must be >= 1.0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self::with_endpoint(default_endpoint(Environment::Development))
    }
}

/// Default realtime endpoint per deployment environment
fn default_endpoint(environment: Environment) -> &'static str {
    match environment {
        Environment::Development => "ws://localhost:8080/api/realtime",
        Environment::Staging => "wss://staging.codedeck.dev/api/realtime",
        Environment::Production => "wss://app.codedeck.dev/api/realtime",
    }
}
