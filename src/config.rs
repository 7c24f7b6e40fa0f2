//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). The relay endpoint is the only required
//! piece of information and it is static; there is no runtime discovery.

use std::time::Duration;

use crate::error::ClientError;
use crate::protocol::endpoint;

/// Relay endpoint used when `CHAT_RELAY_URL` is not set.
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000";

/// Retry behaviour after an unrequested connection loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Whether the transport retries at all.
    pub enabled: bool,
    /// Maximum consecutive attempts; `0` retries forever.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl ReconnectPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 0,
            delay: Duration::ZERO,
        }
    }

    /// Returns `true` if the `attempt`-th consecutive retry is allowed
    /// (attempts are counted from 1).
    #[must_use]
    pub const fn allows(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt <= self.max_attempts)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 0,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the relay service (`http`, `https`, `ws` or `wss`).
    pub relay_url: String,

    /// Append locally composed messages to the feed immediately instead of
    /// waiting for the relay to echo them back.
    pub local_echo: bool,

    /// Capacity of the channel carrying decoded events from the I/O task to
    /// the session owner.
    pub event_channel_capacity: usize,

    /// Reconnection behaviour.
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            local_echo: true,
            event_channel_capacity: 256,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file, then
    /// falls back to defaults for every variable that is not set.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if `CHAT_RELAY_URL` cannot be
    /// turned into a socket URL.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if the relay URL is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let relay_url = lookup("CHAT_RELAY_URL").unwrap_or(defaults.relay_url);
        endpoint::socket_url(&relay_url)?;

        let local_echo = parse_bool(lookup("CHAT_LOCAL_ECHO"), defaults.local_echo);
        let event_channel_capacity = parse_or(
            lookup("CHAT_EVENT_CHANNEL_CAPACITY"),
            defaults.event_channel_capacity,
        )
        .max(1);

        let reconnect = ReconnectPolicy {
            enabled: parse_bool(lookup("CHAT_RECONNECT"), defaults.reconnect.enabled),
            max_attempts: parse_or(
                lookup("CHAT_RECONNECT_ATTEMPTS"),
                defaults.reconnect.max_attempts,
            ),
            delay: Duration::from_millis(parse_or(lookup("CHAT_RECONNECT_DELAY_MS"), 1000)),
        };

        Ok(Self {
            relay_url,
            local_echo,
            event_channel_capacity,
            reconnect,
        })
    }
}

/// Parses a raw value as `T`, returning `default` on missing or invalid input.
fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Parses a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool(raw: Option<String>, default: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ClientConfig, ClientError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let Ok(config) = load(&[]) else {
            panic!("defaults must load");
        };
        assert_eq!(config.relay_url, DEFAULT_RELAY_URL);
        assert!(config.local_echo);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn reads_every_key() {
        let Ok(config) = load(&[
            ("CHAT_RELAY_URL", "http://relay.example.com:8080"),
            ("CHAT_LOCAL_ECHO", "FALSE"),
            ("CHAT_EVENT_CHANNEL_CAPACITY", "16"),
            ("CHAT_RECONNECT", "0"),
            ("CHAT_RECONNECT_ATTEMPTS", "3"),
            ("CHAT_RECONNECT_DELAY_MS", "250"),
        ]) else {
            panic!("config must load");
        };
        assert_eq!(config.relay_url, "http://relay.example.com:8080");
        assert!(!config.local_echo);
        assert_eq!(config.event_channel_capacity, 16);
        assert!(!config.reconnect.enabled);
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.delay, Duration::from_millis(250));
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let Ok(config) = load(&[
            ("CHAT_EVENT_CHANNEL_CAPACITY", "lots"),
            ("CHAT_RECONNECT_DELAY_MS", "-5"),
        ]) else {
            panic!("config must load");
        };
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.reconnect.delay, Duration::from_millis(1000));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let Ok(config) = load(&[("CHAT_EVENT_CHANNEL_CAPACITY", "0")]) else {
            panic!("config must load");
        };
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn bad_relay_scheme_is_rejected() {
        let result = load(&[("CHAT_RELAY_URL", "ftp://relay.example.com")]);
        assert!(matches!(result, Err(ClientError::InvalidEndpoint(_))));
    }

    #[test]
    fn unreachable_relay_hosts_are_rejected() {
        for relay in ["http://exa mple.com", "http://:3000", "http://host:99999"] {
            let result = load(&[("CHAT_RELAY_URL", relay)]);
            assert!(
                matches!(result, Err(ClientError::InvalidEndpoint(_))),
                "{relay} should be rejected"
            );
        }
    }

    #[test]
    fn reconnect_policy_limits_attempts() {
        let policy = ReconnectPolicy {
            enabled: true,
            max_attempts: 2,
            delay: Duration::ZERO,
        };
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
        assert!(ReconnectPolicy::default().allows(1_000));
        assert!(!ReconnectPolicy::disabled().allows(1));
    }
}
