use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::client::controller::ControllerOptions;
use crate::i18n::Language;
use crate::relay::{RouterOptions, DEFAULT_BROADCAST_CAPACITY};
use crate::retry::ReconnectPolicy;
use crate::translation::DEFAULT_TRANSLATE_API_URL;

/// Parse `key` from the environment, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub broadcast_capacity: usize,
    pub trust_client_timestamps: bool,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("RELAY_PORT", 3000),
            broadcast_capacity: env_or("RELAY_BROADCAST_CAPACITY", DEFAULT_BROADCAST_CAPACITY),
            trust_client_timestamps: env_or("RELAY_TRUST_CLIENT_TIMESTAMPS", true),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            broadcast_capacity: self.broadcast_capacity,
            trust_client_timestamps: self.trust_client_timestamps,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    // Relay
    pub relay_url: String,

    // Identity
    pub display_name: String,
    pub language: Language,

    // Reconnect
    pub reconnect_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub reconnect_backoff_multiplier: f64,
    pub reconnect_max_attempts: Option<u32>,
    pub connect_timeout: Duration,

    // Translation
    pub translate_api_url: String,
    pub translate_timeout: Duration,
    pub translation_cache_capacity: usize,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let language = match std::env::var("CHAT_LANGUAGE") {
            Ok(code) => Language::from_code(&code).context("CHAT_LANGUAGE is not supported")?,
            Err(_) => Language::fallback(),
        };

        let display_name = std::env::var("CHAT_DISPLAY_NAME")
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "User".to_string());

        let reconnect_delay_ms: u64 = env_or("RECONNECT_DELAY_MS", 3000);
        let reconnect_backoff_multiplier: f64 = env_or("RECONNECT_BACKOFF_MULTIPLIER", 1.0);

        Ok(Self {
            relay_url: std::env::var("RELAY_URL")
                .unwrap_or_else(|_| "ws://127.0.0.1:3000/ws".to_string()),

            display_name,
            language,

            reconnect_delay: Duration::from_millis(reconnect_delay_ms),
            reconnect_max_delay: Duration::from_millis(env_or(
                "RECONNECT_MAX_DELAY_MS",
                reconnect_delay_ms,
            )),
            // Multipliers below 1.0 would shrink the delay; treat them as fixed.
            reconnect_backoff_multiplier: if reconnect_backoff_multiplier.is_finite()
                && reconnect_backoff_multiplier >= 1.0
            {
                reconnect_backoff_multiplier
            } else {
                1.0
            },
            reconnect_max_attempts: std::env::var("RECONNECT_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            connect_timeout: Duration::from_millis(env_or("CONNECT_TIMEOUT_MS", 10_000)),

            translate_api_url: std::env::var("TRANSLATE_API_URL")
                .unwrap_or_else(|_| DEFAULT_TRANSLATE_API_URL.to_string()),
            translate_timeout: Duration::from_millis(env_or("TRANSLATE_TIMEOUT_MS", 10_000)),
            translation_cache_capacity: env_or("TRANSLATION_CACHE_CAPACITY", 10_000),
        })
    }

    pub fn controller_options(&self) -> ControllerOptions {
        let mut reconnect = ReconnectPolicy::fixed(self.reconnect_delay)
            .with_max_delay(self.reconnect_max_delay)
            .with_backoff_multiplier(self.reconnect_backoff_multiplier);
        if let Some(max) = self.reconnect_max_attempts {
            reconnect = reconnect.with_max_attempts(max);
        }
        ControllerOptions {
            connect_timeout: self.connect_timeout,
            reconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const RELAY_VARS: &[&str] = &[
        "RELAY_HOST",
        "RELAY_PORT",
        "RELAY_BROADCAST_CAPACITY",
        "RELAY_TRUST_CLIENT_TIMESTAMPS",
    ];

    const CLIENT_VARS: &[&str] = &[
        "RELAY_URL",
        "CHAT_DISPLAY_NAME",
        "CHAT_LANGUAGE",
        "RECONNECT_DELAY_MS",
        "RECONNECT_MAX_DELAY_MS",
        "RECONNECT_BACKOFF_MULTIPLIER",
        "RECONNECT_MAX_ATTEMPTS",
        "CONNECT_TIMEOUT_MS",
        "TRANSLATE_API_URL",
        "TRANSLATE_TIMEOUT_MS",
        "TRANSLATION_CACHE_CAPACITY",
    ];

    fn clear(vars: &[&str]) {
        for var in vars {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_relay_defaults() {
        clear(RELAY_VARS);

        let config = RelayConfig::from_env().unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.broadcast_capacity, 1024);
        assert!(config.trust_client_timestamps);
    }

    #[test]
    #[serial]
    fn test_relay_overrides_and_invalid_numbers() {
        clear(RELAY_VARS);
        std::env::set_var("RELAY_HOST", "127.0.0.1");
        std::env::set_var("RELAY_PORT", "not-a-port");
        std::env::set_var("RELAY_TRUST_CLIENT_TIMESTAMPS", "false");

        let config = RelayConfig::from_env().unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert!(!config.router_options().trust_client_timestamps);

        clear(RELAY_VARS);
    }

    #[test]
    #[serial]
    fn test_client_defaults() {
        clear(CLIENT_VARS);

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.relay_url, "ws://127.0.0.1:3000/ws");
        assert_eq!(config.display_name, "User");
        assert_eq!(config.language, Language::ENGLISH);
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.reconnect_max_attempts, None);
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(3));
        assert_eq!(config.reconnect_backoff_multiplier, 1.0);
        assert_eq!(
            config.controller_options().reconnect.delay_for_attempt(5),
            Duration::from_secs(3)
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.translate_api_url, DEFAULT_TRANSLATE_API_URL);
        assert_eq!(config.translation_cache_capacity, 10_000);
    }

    #[test]
    #[serial]
    fn test_client_overrides() {
        clear(CLIENT_VARS);
        std::env::set_var("CHAT_DISPLAY_NAME", "  Asha ");
        std::env::set_var("CHAT_LANGUAGE", "HI");
        std::env::set_var("RECONNECT_DELAY_MS", "500");
        std::env::set_var("RECONNECT_MAX_ATTEMPTS", "4");

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.display_name, "Asha");
        assert_eq!(config.language, Language::HINDI);

        let options = config.controller_options();
        assert_eq!(options.reconnect.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(options.reconnect.max_attempts, Some(4));

        clear(CLIENT_VARS);
    }

    #[test]
    #[serial]
    fn test_client_exponential_backoff() {
        clear(CLIENT_VARS);
        std::env::set_var("RECONNECT_DELAY_MS", "1000");
        std::env::set_var("RECONNECT_MAX_DELAY_MS", "5000");
        std::env::set_var("RECONNECT_BACKOFF_MULTIPLIER", "2");

        let reconnect = ClientConfig::from_env().unwrap().controller_options().reconnect;
        assert_eq!(reconnect.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(reconnect.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(reconnect.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(reconnect.delay_for_attempt(4), Duration::from_secs(5));

        clear(CLIENT_VARS);
    }

    #[test]
    #[serial]
    fn test_client_backoff_multiplier_below_one_is_fixed() {
        clear(CLIENT_VARS);
        std::env::set_var("RECONNECT_DELAY_MS", "1000");
        std::env::set_var("RECONNECT_MAX_DELAY_MS", "5000");
        std::env::set_var("RECONNECT_BACKOFF_MULTIPLIER", "0.5");

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.reconnect_backoff_multiplier, 1.0);
        assert_eq!(
            config.controller_options().reconnect.delay_for_attempt(3),
            Duration::from_secs(1)
        );

        clear(CLIENT_VARS);
    }

    #[test]
    #[serial]
    fn test_client_rejects_unsupported_language() {
        clear(CLIENT_VARS);
        std::env::set_var("CHAT_LANGUAGE", "xx");

        assert!(ClientConfig::from_env().is_err());

        clear(CLIENT_VARS);
    }
}
