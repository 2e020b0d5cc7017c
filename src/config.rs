//! Link configuration as consumed by the core.
//!
//! Reading and persisting the configuration file belongs to the host, it
//! only needs to deserialize a [`LinkConfig`] from whatever format it uses.

use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::backoff::BackoffPolicy;

/// Parse string as gateway url error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(parse_gateway_url_error), context(suffix(false)))]
pub enum ParseGatewayUrlError {
    /// no url configured
    #[snafu(display("gateway url is not configured"))]
    Empty,

    /// the str is not a valid url
    #[snafu(display("{s} is an invalid url: {source}"))]
    InvalidURL {
        /// string be parsed
        s: String,
        /// source error
        source: url::ParseError,
    },

    /// the parsed url schema is not websocket
    #[snafu(display("the url {s} has invalid schema {schema}, only ws or wss is ok"))]
    InvalidSchema {
        /// the url
        s: String,
        /// invalid schema
        schema: String,
    },

    /// the parsed url has no host
    #[snafu(display("the gateway url {s} has no host"))]
    NoHost {
        /// the url
        s: String,
    },
}

/// Error when log settings can't be read
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(config_error), context(suffix(false)))]
pub enum ConfigError {
    /// the source is not readable right now
    #[snafu(display("log settings unavailable: {message}"))]
    Unavailable {
        /// reason for human read
        message: String,
    },
}

/// Full configuration of a link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// websocket url of the management service
    pub url: String,
    /// identity of this game server
    pub identity_token: String,
    /// registration token issued by the management service
    pub registration_token: String,
    /// reconnect policy
    pub reconnect: ReconnectConfig,
    /// diagnostics and log forwarding
    pub logging: LoggingConfig,
}

/// Reconnect backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// first delay, seconds
    pub base_delay_secs: u64,
    /// delay cap, seconds
    pub max_delay_secs: u64,
    /// growth factor
    pub multiplier: f64,
    /// attempt limit, unlimited when absent
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            base_delay_secs: policy.base_delay.as_secs(),
            max_delay_secs: policy.max_delay.as_secs(),
            multiplier: policy.multiplier,
            max_attempts: policy.max_attempts,
        }
    }
}

impl ReconnectConfig {
    /// Backoff policy described by this config.
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            multiplier: self.multiplier,
            max_attempts: self.max_attempts,
        }
    }
}

/// Logging toggles and server log forwarding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// forward host log lines to the management service
    pub forward_server_logs: bool,
    /// lowest level that gets forwarded
    pub min_level: String,
    /// logger names containing one of these are never forwarded
    pub filtered_loggers: Vec<String>,
    /// verbose diagnostics
    pub debug: bool,
    /// log every raw frame
    pub log_messages: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            forward_server_logs: true,
            min_level: "INFO".to_string(),
            filtered_loggers: Vec::new(),
            debug: false,
            log_messages: false,
        }
    }
}

impl LinkConfig {
    /// Validated websocket url.
    pub fn gateway_url(&self) -> Result<url::Url, ParseGatewayUrlError> {
        let s = self.url.trim();

        ensure!(!s.is_empty(), parse_gateway_url_error::Empty);

        let url = url::Url::parse(s)
            .with_context(|_| parse_gateway_url_error::InvalidURL { s })?;

        ensure!(
            url.scheme() == "wss" || url.scheme() == "ws",
            parse_gateway_url_error::InvalidSchema {
                s,
                schema: url.scheme(),
            }
        );

        ensure!(url.host().is_some(), parse_gateway_url_error::NoHost { s });

        Ok(url)
    }
}

/// Source the log filter reads its settings from.
pub trait LogSettingsSource: Send + Sync {
    /// Current log forwarding settings.
    fn log_settings(&self) -> Result<LoggingConfig, ConfigError>;
}

/// Live, shareable view of the current configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<LinkConfig>>,
}

impl ConfigHandle {
    /// Wrap a config.
    pub fn new(config: LinkConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current config.
    pub fn get(&self) -> LinkConfig {
        self.inner.read().clone()
    }

    /// Replace the config, readers see the new value on their next read.
    pub fn replace(&self, config: LinkConfig) {
        *self.inner.write() = config;
    }
}

impl LogSettingsSource for ConfigHandle {
    fn log_settings(&self) -> Result<LoggingConfig, ConfigError> {
        Ok(self.inner.read().logging.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn with_url(url: &str) -> LinkConfig {
        LinkConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_gateway_url_accepts_ws_and_wss() {
        assert_eq!(
            with_url("wss://connect.example.com/").gateway_url().unwrap().host_str(),
            Some("connect.example.com")
        );
        assert!(with_url("ws://127.0.0.1:3000/ws").gateway_url().is_ok());
    }

    #[test]
    fn test_gateway_url_rejects_bad_input() {
        assert!(matches!(
            with_url("").gateway_url(),
            Err(ParseGatewayUrlError::Empty)
        ));
        assert!(matches!(
            with_url("not a url").gateway_url(),
            Err(ParseGatewayUrlError::InvalidURL { .. })
        ));
        assert!(matches!(
            with_url("https://example.com").gateway_url(),
            Err(ParseGatewayUrlError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_defaults_from_partial_document() {
        let config: LinkConfig = serde_json::from_value(serde_json::json!({
            "url": "wss://example.com",
            "logging": { "debug": true },
        }))
        .unwrap();

        assert!(config.logging.debug);
        assert!(config.logging.forward_server_logs);
        assert_eq!(config.logging.min_level, "INFO");
        assert_eq!(config.reconnect, ReconnectConfig::default());
        assert_eq!(config.reconnect.policy(), BackoffPolicy::default());
    }

    #[test]
    fn test_handle_replace_is_visible() {
        let handle = ConfigHandle::new(LinkConfig::default());
        let other = handle.clone();

        let mut config = handle.get();
        config.logging.forward_server_logs = false;
        handle.replace(config);

        assert!(!other.log_settings().unwrap().forward_server_logs);
    }
}
