//! Dashboard configuration: defaults, environment overrides and the limits
//! every coordinator relies on.

use std::str::FromStr;
use std::time::Duration;

/// Dashboard configuration.
///
/// Nothing is persisted between sessions; the only value most embedders set
/// is `base_url`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL (http or https). The log stream uses the matching ws scheme.
    pub base_url: String,
    /// Interval between document list polls
    pub document_poll_interval: Duration,
    /// Interval between task list polls
    pub task_poll_interval: Duration,
    /// Maximum number of buffered log lines
    pub log_capacity: usize,
    /// Width of the timestamp bucket used for log deduplication
    pub log_dedup_window: Duration,
    /// Delay before reopening the log stream after an abnormal closure
    pub reconnect_delay: Duration,
    /// Consecutive reconnect attempts before giving up (0 = unlimited)
    pub max_reconnect_attempts: u32,
    /// Per-request timeout for backend calls
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            document_poll_interval: Duration::from_secs(10),
            task_poll_interval: Duration::from_secs(10),
            log_capacity: 500,
            log_dedup_window: Duration::from_millis(1000),
            reconnect_delay: Duration::from_millis(3000),
            max_reconnect_attempts: 10,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from the environment (and a `.env` file if present),
    /// falling back to defaults for anything unset or unparsable.
    pub fn load_or_default() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| {
            parse_or(&lookup, key, default.as_secs())
                .filter(|secs| *secs > 0)
                .map_or(default, Duration::from_secs)
        };
        let millis = |key: &str, default: Duration| {
            parse_or(&lookup, key, default.as_millis() as u64).map_or(default, Duration::from_millis)
        };

        Self {
            base_url: lookup("DOCDASH_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .unwrap_or(defaults.base_url),
            document_poll_interval: secs(
                "DOCDASH_DOCUMENT_POLL_SECS",
                defaults.document_poll_interval,
            ),
            task_poll_interval: secs("DOCDASH_TASK_POLL_SECS", defaults.task_poll_interval),
            log_capacity: parse_or(&lookup, "DOCDASH_LOG_CAPACITY", defaults.log_capacity)
                .filter(|cap| *cap > 0)
                .unwrap_or(defaults.log_capacity),
            log_dedup_window: millis("DOCDASH_LOG_DEDUP_MS", defaults.log_dedup_window),
            reconnect_delay: millis("DOCDASH_RECONNECT_DELAY_MS", defaults.reconnect_delay),
            max_reconnect_attempts: parse_or(
                &lookup,
                "DOCDASH_MAX_RECONNECTS",
                defaults.max_reconnect_attempts,
            )
            .unwrap_or(defaults.max_reconnect_attempts),
            request_timeout: secs("DOCDASH_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
        }
    }

    /// Replace values the coordinators cannot run with by their defaults:
    /// zero poll intervals, a zero request timeout and a zero log capacity.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.document_poll_interval.is_zero() {
            tracing::warn!("Document poll interval is zero, using the default");
            self.document_poll_interval = defaults.document_poll_interval;
        }
        if self.task_poll_interval.is_zero() {
            tracing::warn!("Task poll interval is zero, using the default");
            self.task_poll_interval = defaults.task_poll_interval;
        }
        if self.request_timeout.is_zero() {
            tracing::warn!("Request timeout is zero, using the default");
            self.request_timeout = defaults.request_timeout;
        }
        if self.log_capacity == 0 {
            tracing::warn!("Log capacity is zero, using the default");
            self.log_capacity = defaults.log_capacity;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Parse `key`, returning `Some(default)` when unset and `None` (after a
/// warning) when the value is present but invalid.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Some(default),
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring invalid config value");
                None
            }
        },
    }
}
