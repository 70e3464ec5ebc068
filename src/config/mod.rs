use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::error::FeedError;

const DEFAULT_WS_API_URL: &str = "ws://localhost:8080";
const DEFAULT_RESET_SETTLE_MS: u64 = 1_000;
const DEFAULT_METRICS_PORT: u16 = 9000;

/// Throttle choices offered to the host. Anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThrottleInterval {
    Ms100,
    Ms500,
    #[default]
    Ms1000,
    Ms2000,
    Ms5000,
}

impl ThrottleInterval {
    pub const ALL: [ThrottleInterval; 5] = [
        ThrottleInterval::Ms100,
        ThrottleInterval::Ms500,
        ThrottleInterval::Ms1000,
        ThrottleInterval::Ms2000,
        ThrottleInterval::Ms5000,
    ];

    pub fn as_millis(self) -> u64 {
        match self {
            ThrottleInterval::Ms100 => 100,
            ThrottleInterval::Ms500 => 500,
            ThrottleInterval::Ms1000 => 1_000,
            ThrottleInterval::Ms2000 => 2_000,
            ThrottleInterval::Ms5000 => 5_000,
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.as_millis())
    }

    pub fn from_millis(ms: u64) -> Result<Self, FeedError> {
        Self::ALL
            .into_iter()
            .find(|choice| choice.as_millis() == ms)
            .ok_or_else(|| FeedError::Config(format!("unsupported throttle interval {ms}ms")))
    }
}

impl FromStr for ThrottleInterval {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s
            .trim()
            .parse::<u64>()
            .map_err(|_| FeedError::Config(format!("throttle interval {s:?} is not a number")))?;
        Self::from_millis(ms)
    }
}

impl fmt::Display for ThrottleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub ws_api_url: String,
    pub throttle_default: ThrottleInterval,
    pub reset_settle: Duration,
    /// `None` disables the Prometheus exporter.
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            ws_api_url: DEFAULT_WS_API_URL.to_string(),
            throttle_default: ThrottleInterval::default(),
            reset_settle: Duration::from_millis(DEFAULT_RESET_SETTLE_MS),
            metrics_port: Some(DEFAULT_METRICS_PORT),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, so tests don't touch the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_level = lookup("RUST_LOG").unwrap_or(defaults.log_level);
        let ws_api_url = lookup("WS_API_URL").unwrap_or(defaults.ws_api_url);

        let throttle_default = match lookup("THROTTLE_INTERVAL_DEFAULT") {
            Some(raw) => raw
                .parse::<ThrottleInterval>()
                .context("invalid THROTTLE_INTERVAL_DEFAULT")?,
            None => defaults.throttle_default,
        };

        let reset_settle = match lookup("RESET_SETTLE_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("invalid RESET_SETTLE_MS {raw:?}"))?,
            ),
            None => defaults.reset_settle,
        };

        let metrics_port = match lookup("METRICS_PORT") {
            Some(raw) => {
                let port = raw
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("invalid METRICS_PORT {raw:?}"))?;
                (port != 0).then_some(port)
            }
            None => defaults.metrics_port,
        };

        Ok(Self {
            log_level,
            ws_api_url,
            throttle_default,
            reset_settle,
            metrics_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.ws_api_url, DEFAULT_WS_API_URL);
        assert_eq!(config.throttle_default, ThrottleInterval::Ms1000);
        assert_eq!(config.reset_settle, Duration::from_secs(1));
        assert_eq!(config.metrics_port, Some(9000));
    }

    #[test]
    fn test_reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("WS_API_URL", "ws://feed.local:9001/stream"),
            ("THROTTLE_INTERVAL_DEFAULT", "500"),
            ("RESET_SETTLE_MS", "250"),
            ("METRICS_PORT", "0"),
        ]))
        .unwrap();

        assert_eq!(config.ws_api_url, "ws://feed.local:9001/stream");
        assert_eq!(config.throttle_default, ThrottleInterval::Ms500);
        assert_eq!(config.reset_settle, Duration::from_millis(250));
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn test_rejects_unlisted_throttle() {
        let result = Config::from_lookup(lookup_from(&[("THROTTLE_INTERVAL_DEFAULT", "750")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_throttle_choices() {
        let millis: Vec<u64> = ThrottleInterval::ALL.iter().map(|t| t.as_millis()).collect();
        assert_eq!(millis, vec![100, 500, 1000, 2000, 5000]);
        assert_eq!("2000".parse::<ThrottleInterval>().unwrap(), ThrottleInterval::Ms2000);
        assert!("fast".parse::<ThrottleInterval>().is_err());
    }
}
