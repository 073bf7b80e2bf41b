//! Sync configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api/chat";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_INLINE_REPLIES: usize = 2;
pub const DEFAULT_BACKGROUND_REFRESH_TICKS: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the chat API, without a trailing slash.
    pub api_base_url: String,
    /// Period of the reconciliation timer. Never zero.
    pub poll_interval: Duration,
    pub timeouts: HttpTimeouts,
    /// Directory for the on-disk cache; `None` keeps the cache in memory.
    pub cache_dir: Option<PathBuf>,
    /// Replies shown inline under a main message before "see N more".
    pub inline_replies: usize,
    /// Every n-th tick also refreshes non-active topics. 0 disables.
    pub background_refresh_ticks: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeouts: HttpTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            cache_dir: None,
            inline_replies: DEFAULT_INLINE_REPLIES,
            background_refresh_ticks: DEFAULT_BACKGROUND_REFRESH_TICKS,
        }
    }
}

impl SyncConfig {
    /// Build typed config from environment variables.
    ///
    /// All optional:
    /// - `CHAT_API_BASE_URL`: default `http://localhost:5000/api/chat`
    /// - `CHAT_POLL_INTERVAL_MS`: default 3000
    /// - `CHAT_REQUEST_TIMEOUT_SECS`: default 10
    /// - `CHAT_CONNECT_TIMEOUT_SECS`: default 5
    /// - `CHAT_CACHE_DIR`: in-memory cache when absent
    /// - `CHAT_INLINE_REPLIES`: default 2
    /// - `CHAT_BACKGROUND_REFRESH_TICKS`: default 0 (disabled)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unparsable values fall
    /// back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("CHAT_API_BASE_URL")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();

        let poll_ms = parse_or(&lookup, "CHAT_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        // EDGE: tokio intervals panic on a zero period.
        let poll_ms = if poll_ms == 0 { DEFAULT_POLL_INTERVAL_MS } else { poll_ms };

        let cache_dir = lookup("CHAT_CACHE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            api_base_url,
            poll_interval: Duration::from_millis(poll_ms),
            timeouts: HttpTimeouts {
                request_secs: parse_or(&lookup, "CHAT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                connect_secs: parse_or(&lookup, "CHAT_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            cache_dir,
            inline_replies: parse_or(&lookup, "CHAT_INLINE_REPLIES", DEFAULT_INLINE_REPLIES),
            background_refresh_ticks: parse_or(
                &lookup,
                "CHAT_BACKGROUND_REFRESH_TICKS",
                DEFAULT_BACKGROUND_REFRESH_TICKS,
            ),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
