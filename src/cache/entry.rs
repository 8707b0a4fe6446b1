//! Per-key cache entry state.

use std::time::Duration;

use time::OffsetDateTime;

use crate::application::gateway::GatewayError;

use super::value::CacheValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// State of one query key.
///
/// `data` is either the last confirmed server value or an optimistic value; in
/// the latter case `snapshot` holds the value to restore until the write
/// resolves.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    data: Option<CacheValue>,
    status: EntryStatus,
    stale: bool,
    snapshot: Option<CacheValue>,
    error: Option<GatewayError>,
    updated_at: Option<OffsetDateTime>,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheEntry {
    pub(crate) fn new() -> Self {
        Self {
            data: None,
            status: EntryStatus::Idle,
            stale: false,
            snapshot: None,
            error: None,
            updated_at: None,
        }
    }

    pub fn data(&self) -> Option<&CacheValue> {
        self.data.as_ref()
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn snapshot(&self) -> Option<&CacheValue> {
        self.snapshot.as_ref()
    }

    pub fn error(&self) -> Option<&GatewayError> {
        self.error.as_ref()
    }

    pub fn updated_at(&self) -> Option<OffsetDateTime> {
        self.updated_at
    }

    pub fn has_pending_write(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Older than `stale_after` since the last confirmed value.
    pub(crate) fn is_expired(&self, stale_after: Option<Duration>) -> bool {
        match (stale_after, self.updated_at) {
            (Some(limit), Some(at)) => OffsetDateTime::now_utc() - at >= limit,
            _ => false,
        }
    }

    /// Data that can be served without fetching.
    ///
    /// While an optimistic write is pending the current value is served even
    /// when stale; a fetch is deferred until the write resolves.
    pub(crate) fn servable(&self, stale_after: Option<Duration>) -> Option<&CacheValue> {
        let fresh = !self.stale && !self.is_expired(stale_after);
        match &self.data {
            Some(data) if fresh || self.has_pending_write() => Some(data),
            _ => None,
        }
    }

    pub(crate) fn begin_fetch(&mut self) {
        self.status = EntryStatus::Loading;
    }

    /// Leave `Loading` after the in-flight fetch was dropped.
    pub(crate) fn abandon_fetch(&mut self) {
        if self.status == EntryStatus::Loading {
            self.status = if self.data.is_some() {
                EntryStatus::Success
            } else {
                EntryStatus::Idle
            };
        }
    }

    pub(crate) fn resolve(&mut self, value: CacheValue) {
        self.data = Some(value);
        self.status = EntryStatus::Success;
        self.stale = false;
        self.error = None;
        self.updated_at = Some(OffsetDateTime::now_utc());
    }

    /// Record a failed fetch; the previous data stays visible.
    pub(crate) fn fail(&mut self, error: GatewayError) {
        self.status = EntryStatus::Error;
        self.error = Some(error);
    }

    pub(crate) fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Snapshot the current data and replace it with `mutate(current)`.
    ///
    /// Returns `false` when there is nothing to mutate yet; the write then
    /// commits without a local value.
    pub(crate) fn apply_optimistic<M>(&mut self, mutate: M) -> bool
    where
        M: FnOnce(&CacheValue) -> CacheValue,
    {
        match self.data.take() {
            Some(current) => {
                let next = mutate(&current);
                self.snapshot = Some(current);
                self.data = Some(next);
                true
            }
            None => false,
        }
    }

    /// The pending optimistic value was accepted by the server.
    pub(crate) fn confirm_optimistic(&mut self) {
        if self.snapshot.take().is_some() {
            self.updated_at = Some(OffsetDateTime::now_utc());
        }
    }

    /// Restore the data captured before the pending optimistic write.
    pub(crate) fn rollback(&mut self) {
        if let Some(previous) = self.snapshot.take() {
            self.data = Some(previous);
        }
    }
}
