//! Process configuration for the gateway and the events service.
//!
//! Both services resolve their settings once at startup from environment
//! variables with fallback defaults. Resolution goes through a lookup closure so
//! the same code path can be exercised in tests without touching the process
//! environment.

use std::fmt;
use std::time::Duration;

use async_nats::ServerAddr;
use reqwest::Url;

/// Consumer group shared by every topic's consumer loop.
pub const CONSUMER_GROUP: &str = "cinemaabyss-events-consumer-group";

/// Error type for configuration resolution. Always fatal at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidUpstream {
        name: &'static str,
        value: String,
        reason: String,
    },
    InvalidBrokerAddress {
        value: String,
        reason: String,
    },
    InvalidPort(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidUpstream { name, value, reason } => {
                write!(f, "Failed to parse {} '{}': {}", name, value, reason)
            }
            ConfigError::InvalidBrokerAddress { value, reason } => {
                write!(f, "Invalid broker address '{}': {}", value, reason)
            }
            ConfigError::InvalidPort(value) => write!(f, "Invalid PORT: {}", value),
        }
    }
}

impl std::error::Error for ConfigError {}

fn env_or<F>(lookup: &F, key: &str, fallback: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| fallback.to_string())
}

fn parse_port<F>(lookup: &F, fallback: u16) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("PORT") {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidPort(raw)),
        None => Ok(fallback),
    }
}

/// Parse an upstream origin. Only absolute http(s) URLs with a host can be
/// forwarded to.
pub fn parse_upstream(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUpstream {
        name,
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Gradual migration settings for the movies capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationConfig {
    pub enabled: bool,
    /// Share of movies traffic sent to the movies service, in [0, 100].
    pub percent: u32,
}

impl MigrationConfig {
    pub fn disabled() -> Self {
        Self { enabled: false, percent: 0 }
    }

    /// Build a config, clamping the percentage into [0, 100].
    pub fn new(enabled: bool, percent: i64) -> Self {
        Self {
            enabled,
            percent: percent.clamp(0, 100) as u32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub monolith_url: Url,
    pub movies_service_url: Url,
    pub events_service_url: Url,
    pub migration: MigrationConfig,
    /// Seed for the migration random source; `None` draws from OS entropy.
    pub migration_seed: Option<u64>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_port(&lookup, 8000)?;
        let monolith_url = parse_upstream(
            "MONOLITH_URL",
            &env_or(&lookup, "MONOLITH_URL", "http://localhost:8080"),
        )?;
        let movies_service_url = parse_upstream(
            "MOVIES_SERVICE_URL",
            &env_or(&lookup, "MOVIES_SERVICE_URL", "http://localhost:8081"),
        )?;
        let events_service_url = parse_upstream(
            "EVENTS_SERVICE_URL",
            &env_or(&lookup, "EVENTS_SERVICE_URL", "http://localhost:8082"),
        )?;

        let enabled = env_or(&lookup, "GRADUAL_MIGRATION", "false") == "true";
        let raw_percent = env_or(&lookup, "MOVIES_MIGRATION_PERCENT", "0");
        let percent = match raw_percent.trim().parse::<i64>() {
            Ok(p) if (0..=100).contains(&p) => p,
            Ok(p) => {
                tracing::warn!(
                    "MOVIES_MIGRATION_PERCENT {} is outside [0, 100], clamping",
                    p
                );
                p
            }
            Err(e) => {
                tracing::warn!(
                    "Invalid MOVIES_MIGRATION_PERCENT value '{}', defaulting to 0: {}",
                    raw_percent,
                    e
                );
                0
            }
        };

        let migration_seed = match lookup("MIGRATION_SEED") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(seed) => Some(seed),
                Err(e) => {
                    tracing::warn!("Ignoring invalid MIGRATION_SEED '{}': {}", raw, e);
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            port,
            monolith_url,
            movies_service_url,
            events_service_url,
            migration: MigrationConfig::new(enabled, percent),
            migration_seed,
        })
    }
}

/// Shortest delay between consumer restarts.
pub const MIN_BACKOFF: Duration = Duration::from_millis(10);

/// What happens to a consumer loop after its source fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Log and let the loop end; the rest of the process keeps running.
    Terminate,
    /// Reconnect with exponential backoff between attempts.
    Backoff { initial: Duration, max: Duration },
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Terminate
    }
}

#[derive(Debug, Clone)]
pub struct EventsConfig {
    pub port: u16,
    pub broker_addrs: Vec<ServerAddr>,
    pub stream_name: String,
    pub consumer_group: String,
    pub max_age: Duration,
    pub max_bytes: i64,
    pub restart_policy: RestartPolicy,
}

impl EventsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_port(&lookup, 8082)?;
        let broker_addrs =
            parse_broker_list(&env_or(&lookup, "NATS_URL", "nats://localhost:4222"))?;

        let millis = |key: &str, fallback: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or_else(|| Duration::from_millis(fallback))
        };
        let restart_policy = match env_or(&lookup, "CONSUMER_RESTART", "terminate")
            .to_lowercase()
            .as_str()
        {
            "backoff" => {
                let initial = millis("CONSUMER_BACKOFF_MS", 500).max(MIN_BACKOFF);
                RestartPolicy::Backoff {
                    initial,
                    max: millis("CONSUMER_BACKOFF_MAX_MS", 30_000).max(initial),
                }
            }
            "terminate" => RestartPolicy::Terminate,
            other => {
                tracing::warn!("Unknown CONSUMER_RESTART '{}', using terminate", other);
                RestartPolicy::Terminate
            }
        };

        Ok(Self {
            port,
            broker_addrs,
            stream_name: env_or(&lookup, "NATS_STREAM", "EVENTS"),
            consumer_group: CONSUMER_GROUP.to_string(),
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            max_bytes: 1024 * 1024 * 1024,
            restart_policy,
        })
    }
}

/// Split a comma separated broker list into server addresses.
pub fn parse_broker_list(raw: &str) -> Result<Vec<ServerAddr>, ConfigError> {
    let addrs = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ServerAddr>()
                .map_err(|e| ConfigError::InvalidBrokerAddress {
                    value: s.to_string(),
                    reason: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if addrs.is_empty() {
        return Err(ConfigError::InvalidBrokerAddress {
            value: raw.to_string(),
            reason: "no broker addresses given".to_string(),
        });
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_gateway_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.monolith_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.movies_service_url.as_str(), "http://localhost:8081/");
        assert_eq!(config.events_service_url.as_str(), "http://localhost:8082/");
        assert_eq!(config.migration, MigrationConfig::disabled());
        assert_eq!(config.migration_seed, None);
    }

    #[test]
    fn test_migration_enabled_only_by_exact_true() {
        let on = GatewayConfig::from_lookup(lookup(&[
            ("GRADUAL_MIGRATION", "true"),
            ("MOVIES_MIGRATION_PERCENT", "25"),
        ]))
        .unwrap();
        assert_eq!(on.migration, MigrationConfig { enabled: true, percent: 25 });

        let off = GatewayConfig::from_lookup(lookup(&[("GRADUAL_MIGRATION", "yes")])).unwrap();
        assert!(!off.migration.enabled);
    }

    #[test]
    fn test_invalid_percent_defaults_to_zero() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GRADUAL_MIGRATION", "true"),
            ("MOVIES_MIGRATION_PERCENT", "half"),
        ]))
        .unwrap();
        assert_eq!(config.migration.percent, 0);
    }

    #[test]
    fn test_out_of_range_percent_is_clamped() {
        let high = GatewayConfig::from_lookup(lookup(&[("MOVIES_MIGRATION_PERCENT", "150")]))
            .unwrap();
        assert_eq!(high.migration.percent, 100);

        let low = GatewayConfig::from_lookup(lookup(&[("MOVIES_MIGRATION_PERCENT", "-5")]))
            .unwrap();
        assert_eq!(low.migration.percent, 0);
    }

    #[test]
    fn test_malformed_upstream_is_fatal() {
        let err = GatewayConfig::from_lookup(lookup(&[("MONOLITH_URL", "::not a url")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUpstream { name: "MONOLITH_URL", .. }));

        let err = GatewayConfig::from_lookup(lookup(&[("MOVIES_SERVICE_URL", "ftp://movies")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUpstream { name: "MOVIES_SERVICE_URL", .. }));
    }

    #[test]
    fn test_invalid_port_is_fatal() {
        let err = GatewayConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidPort("eighty".to_string()));
    }

    #[test]
    fn test_events_defaults() {
        let config = EventsConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.port, 8082);
        assert_eq!(config.broker_addrs.len(), 1);
        assert_eq!(config.stream_name, "EVENTS");
        assert_eq!(config.consumer_group, CONSUMER_GROUP);
        assert_eq!(config.restart_policy, RestartPolicy::Terminate);
    }

    #[test]
    fn test_broker_list_is_comma_separated() {
        let addrs = parse_broker_list("nats://a:4222, nats://b:4222,,").unwrap();
        assert_eq!(addrs.len(), 2);

        assert!(parse_broker_list(" , ").is_err());
    }

    #[test]
    fn test_backoff_restart_policy() {
        let config = EventsConfig::from_lookup(lookup(&[
            ("CONSUMER_RESTART", "backoff"),
            ("CONSUMER_BACKOFF_MS", "100"),
        ]))
        .unwrap();
        assert_eq!(
            config.restart_policy,
            RestartPolicy::Backoff {
                initial: Duration::from_millis(100),
                max: Duration::from_millis(30_000),
            }
        );
    }

    #[test]
    fn test_backoff_delays_have_a_floor() {
        let config = EventsConfig::from_lookup(lookup(&[
            ("CONSUMER_RESTART", "backoff"),
            ("CONSUMER_BACKOFF_MS", "0"),
            ("CONSUMER_BACKOFF_MAX_MS", "0"),
        ]))
        .unwrap();
        assert_eq!(
            config.restart_policy,
            RestartPolicy::Backoff {
                initial: MIN_BACKOFF,
                max: MIN_BACKOFF,
            }
        );
    }
}
