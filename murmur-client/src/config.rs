use std::{path::Path, time::Duration};

use anyhow::Context;

/// Ordering of top-level comments; replies are always oldest first
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Order {
    NewestFirst,
    OldestFirst,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Page size used when the caller does not ask for one
    pub page_size: usize,
    pub max_page_size: usize,

    /// Deepest allowed nesting level, top-level comments being at depth 0
    pub max_depth: usize,

    /// Number of automatic retries of a transiently failing fetch
    pub retry_limit: u32,
    pub retry_backoff_ms: u64,

    pub notification_retention_ms: u64,
    pub request_timeout_ms: u64,
    pub refresh_interval_ms: u64,
    pub order: Order,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            page_size: 20,
            max_page_size: 50,
            max_depth: 2,
            retry_limit: 3,
            retry_backoff_ms: 500,
            notification_retention_ms: 24 * 60 * 60 * 1000,
            request_timeout_ms: 10_000,
            refresh_interval_ms: 30_000,
            order: Order::NewestFirst,
        }
    }
}

impl Config {
    /// Loads a JSON config file; missing keys keep their default value
    pub fn from_file(path: &Path) -> anyhow::Result<Config> {
        let data = std::fs::read(path).with_context(|| format!("reading config file {path:?}"))?;
        serde_json::from_slice(&data).with_context(|| format!("parsing config file {path:?}"))
    }

    /// Delay before retry number `attempt` (starting at 0)
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn notification_retention(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(
            i64::try_from(self.notification_retention_ms).unwrap_or(i64::MAX),
        )
    }
}
