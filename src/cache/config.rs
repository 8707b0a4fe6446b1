//! Query cache configuration.
//!
//! Controlled via the `[cache]` section of `postdesk.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_REFETCH_ON_INVALIDATE: bool = true;

/// Query cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Start a background refetch for invalidated keys that have a registered fetcher.
    pub refetch_on_invalidate: bool,
    /// Treat entries older than this as stale on read. `None` keeps data fresh
    /// until it is invalidated.
    pub stale_after_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refetch_on_invalidate: DEFAULT_REFETCH_ON_INVALIDATE,
            stale_after_ms: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            refetch_on_invalidate: settings.refetch_on_invalidate,
            stale_after_ms: settings.stale_after.map(|age| {
                u64::try_from(age.as_millis()).unwrap_or(u64::MAX)
            }),
        }
    }
}

impl CacheConfig {
    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_ms.map(Duration::from_millis)
    }
}
