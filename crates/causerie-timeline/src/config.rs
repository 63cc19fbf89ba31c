//! Timeline configuration loaded from environment variables.
//!
//! All settings default to the constants in `causerie_shared::constants`, so
//! a conversation can be opened with zero configuration.

use std::time::Duration;

use causerie_shared::constants::{
    DEFAULT_PAGE_SIZE, MAX_DELTA_TIMESTAMP1, MAX_DELTA_TIMESTAMP2, TYPING_PEER_TIMER_DURATION,
    TYPING_RESEND_DELAY, TYPING_TIMER_DURATION,
};

/// Timeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineConfig {
    /// Items from one sender closer than this share a bubble group (ms).
    /// Env: `CAUSERIE_GROUPING_WINDOW_MS`
    /// Default: `120000`
    pub grouping_window_ms: i64,

    /// Gap after which a new TIME separator is inserted (ms).
    /// Env: `CAUSERIE_TIME_SEPARATOR_MS`
    /// Default: `3600000`
    pub time_separator_gap_ms: i64,

    /// Silence after which a typing peer is considered idle.
    /// Env: `CAUSERIE_TYPING_PEER_TIMEOUT_MS`
    /// Default: 12 s
    pub typing_peer_timeout: Duration,

    /// Delay before re-announcing our own START while still typing.
    /// Env: `CAUSERIE_TYPING_RESEND_MS`
    /// Default: 8 s
    pub typing_resend_delay: Duration,

    /// Inactivity after which our own typing state stops by itself.
    /// Env: `CAUSERIE_TYPING_STOP_MS`
    /// Default: 10 s
    pub typing_stop_delay: Duration,

    /// Descriptors requested per fetch.
    /// Env: `CAUSERIE_PAGE_SIZE`
    /// Default: `64`
    pub page_size: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            grouping_window_ms: MAX_DELTA_TIMESTAMP1,
            time_separator_gap_ms: MAX_DELTA_TIMESTAMP2,
            typing_peer_timeout: Duration::from_millis(TYPING_PEER_TIMER_DURATION),
            typing_resend_delay: Duration::from_millis(TYPING_RESEND_DELAY),
            typing_stop_delay: Duration::from_millis(TYPING_TIMER_DURATION),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TimelineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<i64>(&lookup, "CAUSERIE_GROUPING_WINDOW_MS") {
            config.grouping_window_ms = ms;
        }

        if let Some(ms) = parse_var::<i64>(&lookup, "CAUSERIE_TIME_SEPARATOR_MS") {
            config.time_separator_gap_ms = ms;
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "CAUSERIE_TYPING_PEER_TIMEOUT_MS") {
            config.typing_peer_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "CAUSERIE_TYPING_RESEND_MS") {
            config.typing_resend_delay = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "CAUSERIE_TYPING_STOP_MS") {
            config.typing_stop_delay = Duration::from_millis(ms);
        }

        if let Some(n) = parse_var::<usize>(&lookup, "CAUSERIE_PAGE_SIZE") {
            if n > 0 {
                config.page_size = n;
            }
        }

        config
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if value >= T::default() => Some(value),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid timeline setting, using default");
            None
        }
    }
}
