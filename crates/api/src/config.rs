//! Application configuration loaded from environment variables.

use std::time::Duration;

use idempotency::GuardConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `IDEMPOTENCY_TTL_SECS`: how long responses are replayed (default: `3600`)
/// - `IDEMPOTENCY_IN_FLIGHT_SECS`: lifetime of an unfinished claim (default: `30`)
/// - `IDEMPOTENCY_WAIT_MS`: wait on a concurrent duplicate (default: `5000`)
/// - `PARTNER_LOCK_TIMEOUT_MS`: wait for a partner lock (default: `2000`)
/// - `CREDIT_CACHE_TTL_SECS`: credit read cache lifetime, `0` disables (default: `60`)
/// - `SEED_DEMO_PARTNER`: create the demo partner at startup (default: `false`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub idempotency_ttl: Duration,
    pub idempotency_in_flight_ttl: Duration,
    pub idempotency_wait: Duration,
    pub partner_lock_timeout: Duration,
    pub credit_cache_ttl: Duration,
    pub seed_demo_partner: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            idempotency_ttl: number("IDEMPOTENCY_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_ttl),
            idempotency_in_flight_ttl: number("IDEMPOTENCY_IN_FLIGHT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_in_flight_ttl),
            idempotency_wait: number("IDEMPOTENCY_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.idempotency_wait),
            partner_lock_timeout: number("PARTNER_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.partner_lock_timeout),
            credit_cache_ttl: number("CREDIT_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.credit_cache_ttl),
            seed_demo_partner: lookup("SEED_DEMO_PARTNER")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.seed_demo_partner),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Timing for the idempotency guard on order creation.
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            ttl: self.idempotency_ttl,
            in_flight_ttl: self.idempotency_in_flight_ttl,
            wait_timeout: self.idempotency_wait,
            ..GuardConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            idempotency_ttl: Duration::from_secs(3600),
            idempotency_in_flight_ttl: Duration::from_secs(30),
            idempotency_wait: Duration::from_millis(5000),
            partner_lock_timeout: Duration::from_millis(2000),
            credit_cache_ttl: Duration::from_secs(60),
            seed_demo_partner: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.idempotency_ttl, Duration::from_secs(3600));
        assert!(!config.seed_demo_partner);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = from_pairs(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.partner_lock_timeout, Duration::from_millis(2000));
        assert_eq!(config.credit_cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = from_pairs(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("IDEMPOTENCY_TTL_SECS", "120"),
            ("IDEMPOTENCY_WAIT_MS", "250"),
            ("PARTNER_LOCK_TIMEOUT_MS", "500"),
            ("CREDIT_CACHE_TTL_SECS", "0"),
            ("SEED_DEMO_PARTNER", "true"),
        ]);

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/orders")
        );
        assert_eq!(config.partner_lock_timeout, Duration::from_millis(500));
        assert_eq!(config.credit_cache_ttl, Duration::ZERO);
        assert!(config.seed_demo_partner);

        let guard = config.guard_config();
        assert_eq!(guard.ttl, Duration::from_secs(120));
        assert_eq!(guard.wait_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = from_pairs(&[("PORT", "not-a-port"), ("IDEMPOTENCY_TTL_SECS", "-5")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.idempotency_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_blank_database_url_means_in_memory() {
        let config = from_pairs(&[("DATABASE_URL", "  ")]);
        assert!(config.database_url.is_none());
    }
}
