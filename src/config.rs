//! Configuration for sheetproxy
//!
//! All settings can be supplied as command-line flags or environment
//! variables. An unparseable rate limit falls back to a safe default
//! instead of failing startup.

use std::time::Duration;

use clap::Parser;

use crate::error::{ConfigError, Result};

/// Default upstream rate limit when the configured value is unparseable.
pub const DEFAULT_RATE_LIMIT: &str = "60/minute";

/// Application configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "sheetproxy", version, about = "Caching proxy for the Google Sheets API")]
pub struct Config {
    /// Google API key used for all upstream calls
    #[arg(long, env = "GOOGLE_API_KEY")]
    pub api_key: Option<String>,

    /// Cache TTL for sheet data, in seconds
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 1)]
    pub cache_ttl_secs: u64,

    /// Upstream rate limit, expressed as "N/second", "N/minute" or "N/hour"
    #[arg(long, env = "UPSTREAM_RATE_LIMIT", default_value = DEFAULT_RATE_LIMIT)]
    pub rate_limit: String,

    /// Background poll interval, in seconds
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 1)]
    pub poll_interval_secs: u64,

    /// Polling stops after this many seconds without client activity
    #[arg(long, env = "INACTIVITY_TIMEOUT_SECS", default_value_t = 60)]
    pub inactivity_timeout_secs: u64,

    /// TTL for the gid-to-title metadata cache, in seconds
    #[arg(long, env = "METADATA_TTL_SECS", default_value_t = 300)]
    pub metadata_ttl_secs: u64,

    /// Bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Override the upstream Sheets API base URL (used by tests)
    #[arg(long, env = "SHEETS_BASE_URL")]
    pub base_url: Option<String>,
}

impl Config {
    /// Validate that required configuration is present.
    ///
    /// Called once at startup so a missing credential fails fast instead
    /// of surfacing on every request.
    pub fn validate(&self) -> Result<()> {
        match &self.api_key {
            Some(key) if !key.is_empty() => Ok(()),
            _ => Err(ConfigError::MissingApiKey.into()),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }

    /// Parse the configured upstream rate limit, falling back to
    /// [`DEFAULT_RATE_LIMIT`] when the value is unparseable.
    pub fn upstream_rate_limit(&self) -> RateLimit {
        match RateLimit::parse(&self.rate_limit) {
            Some(limit) => limit,
            None => {
                log::warn!(
                    "Unparseable rate limit {:?}, falling back to {}",
                    self.rate_limit,
                    DEFAULT_RATE_LIMIT
                );
                RateLimit::default()
            }
        }
    }
}

/// An upstream rate limit: at most `max_requests` grants per sliding `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimit {
    /// Parse a rate expressed as "N/unit" (second/minute/hour).
    pub fn parse(value: &str) -> Option<Self> {
        let (count, unit) = value.trim().split_once('/')?;
        let max_requests: usize = count.trim().parse().ok()?;
        if max_requests == 0 {
            return None;
        }

        let window = match unit.trim().to_ascii_lowercase().as_str() {
            "second" | "sec" | "s" => Duration::from_secs(1),
            "minute" | "min" | "m" => Duration::from_secs(60),
            "hour" | "hr" | "h" => Duration::from_secs(3600),
            _ => return None,
        };

        Some(RateLimit {
            max_requests,
            window,
        })
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        // DEFAULT_RATE_LIMIT is a valid literal; parse cannot fail on it.
        RateLimit::parse(DEFAULT_RATE_LIMIT).unwrap_or(RateLimit {
            max_requests: 60,
            window: Duration::from_secs(60),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(args: &[&str]) -> Config {
        let mut argv = vec!["sheetproxy"];
        argv.extend_from_slice(args);
        Config::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.cache_ttl(), Duration::from_secs(1));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.inactivity_timeout(), Duration::from_secs(60));
        assert_eq!(config.metadata_ttl(), Duration::from_secs(300));
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = config_from(&[]);
        assert!(config.validate().is_err());

        let config = config_from(&["--api-key", "test-key"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_api_key() {
        let config = config_from(&["--api-key", ""]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_parse_units() {
        assert_eq!(
            RateLimit::parse("10/second"),
            Some(RateLimit {
                max_requests: 10,
                window: Duration::from_secs(1),
            })
        );
        assert_eq!(
            RateLimit::parse("60/minute"),
            Some(RateLimit {
                max_requests: 60,
                window: Duration::from_secs(60),
            })
        );
        assert_eq!(
            RateLimit::parse("100/hour"),
            Some(RateLimit {
                max_requests: 100,
                window: Duration::from_secs(3600),
            })
        );
    }

    #[test]
    fn test_rate_limit_parse_short_units() {
        assert!(RateLimit::parse("5/s").is_some());
        assert!(RateLimit::parse("5/min").is_some());
        assert!(RateLimit::parse("5/h").is_some());
    }

    #[test]
    fn test_rate_limit_parse_invalid() {
        assert!(RateLimit::parse("").is_none());
        assert!(RateLimit::parse("60").is_none());
        assert!(RateLimit::parse("sixty/minute").is_none());
        assert!(RateLimit::parse("60/fortnight").is_none());
        assert!(RateLimit::parse("0/minute").is_none());
    }

    #[test]
    fn test_unparseable_rate_limit_falls_back() {
        let config = config_from(&["--rate-limit", "lots"]);
        assert_eq!(config.upstream_rate_limit(), RateLimit::default());
    }
}
