//! Dispatcher configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Delay applied before a failed job is attempted again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base_delay * retry_count`
    #[default]
    Linear,
    /// `base_delay * 2^(retry_count - 1)`
    Exponential,
    /// `base_delay` for every retry
    Constant,
}

impl BackoffStrategy {
    /// Delay before attempt number `retry_count + 1`, where `retry_count` is
    /// the number of retries recorded so far (1 for the first retry).
    pub fn delay(&self, base: Duration, retry_count: u32) -> Duration {
        let n = retry_count.max(1);
        match self {
            Self::Linear => base.saturating_mul(n),
            Self::Exponential => base.saturating_mul(2u32.saturating_pow(n - 1)),
            Self::Constant => base,
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            "constant" => Ok(Self::Constant),
            other => Err(format!("unknown backoff strategy `{other}`")),
        }
    }
}

/// Immutable queue settings, read once when the dispatcher is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Slots in the dispatch queue (per level when `multi_queue` is set)
    pub capacity: usize,
    /// How long an idle dispatch loop sleeps before polling again
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Retry ceiling per job
    pub max_retries: u32,
    #[serde(with = "millis")]
    pub base_delay: Duration,
    pub backoff: BackoffStrategy,
    /// Grow the dispatch queue by another level instead of blocking producers
    pub multi_queue: bool,
    /// Reject `push_job` for worker types with no registered worker
    pub strict_routing: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            poll_interval: Duration::from_millis(100),
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            backoff: BackoffStrategy::Linear,
            multi_queue: false,
            strict_routing: false,
        }
    }
}

impl QueueConfig {
    /// Load from `WORKQ_*` environment variables, keeping defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: env_parse("WORKQ_QUEUE_CAPACITY")
                .filter(|c| *c > 0)
                .unwrap_or(defaults.capacity),
            poll_interval: env_parse("WORKQ_POLL_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_retries: env_parse("WORKQ_MAX_RETRIES").unwrap_or(defaults.max_retries),
            base_delay: env_parse("WORKQ_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            backoff: env_parse("WORKQ_BACKOFF").unwrap_or(defaults.backoff),
            multi_queue: env_flag("WORKQ_MULTI_QUEUE").unwrap_or(defaults.multi_queue),
            strict_routing: env_flag("WORKQ_STRICT_ROUTING").unwrap_or(defaults.strict_routing),
        }
    }

    /// Backoff delay once a job has been retried `retry_count` times
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        self.backoff.delay(self.base_delay, retry_count)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid queue setting");
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_millis(100));
        assert_eq!(config.backoff, BackoffStrategy::Linear);
        assert!(!config.multi_queue);
    }

    #[test]
    fn test_linear_backoff() {
        let base = Duration::from_millis(100);
        assert_eq!(BackoffStrategy::Linear.delay(base, 1), Duration::from_millis(100));
        assert_eq!(BackoffStrategy::Linear.delay(base, 2), Duration::from_millis(200));
        assert_eq!(BackoffStrategy::Linear.delay(base, 3), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_and_constant_backoff() {
        let base = Duration::from_millis(100);
        assert_eq!(BackoffStrategy::Exponential.delay(base, 1), Duration::from_millis(100));
        assert_eq!(BackoffStrategy::Exponential.delay(base, 2), Duration::from_millis(200));
        assert_eq!(BackoffStrategy::Exponential.delay(base, 4), Duration::from_millis(800));
        assert_eq!(BackoffStrategy::Constant.delay(base, 7), base);
    }

    #[test]
    fn test_serde_uses_milliseconds() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"poll_interval": 250, "backoff": "exponential"}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.backoff, BackoffStrategy::Exponential);
        assert_eq!(config.capacity, 1000);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["base_delay"], 100);
    }
}
