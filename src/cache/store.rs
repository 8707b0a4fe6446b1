//! Query cache store.
//!
//! Holds one [`CacheEntry`] per [`QueryKey`] and coordinates access to it:
//! read-through fetches deduplicated by key, optimistic writes serialized by
//! key with rollback, and invalidation with background refetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::counter;
use tracing::{debug, warn};

use crate::application::gateway::GatewayError;

use super::config::CacheConfig;
use super::entry::{CacheEntry, EntryStatus};
use super::keys::QueryKey;
use super::lock::{mutex_lock, rw_read, rw_write};
use super::value::CacheValue;

const SOURCE: &str = "cache::store";

pub type FetchResult = Result<CacheValue, GatewayError>;

/// Produces the value for a key. Receives the data currently cached for the
/// key, if any, so paged values can decide which pages to load.
pub type Fetcher = Arc<dyn Fn(Option<CacheValue>) -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// Wrap an async closure as a [`Fetcher`].
pub fn fetcher<F, Fut>(f: F) -> Fetcher
where
    F: Fn(Option<CacheValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult> + Send + 'static,
{
    Arc::new(move |current| f(current).boxed())
}

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// The in-flight fetch for `key`, if any, counted as a deduplicated request.
fn joinable(in_flight: &HashMap<QueryKey, InFlight>, key: QueryKey) -> Option<(u64, SharedFetch)> {
    let flight = in_flight.get(&key)?;
    counter!("postdesk_cache_dedup_total", "key" => key.label()).increment(1);
    Some((flight.ticket, flight.future.clone()))
}

/// A fetch registered for a key. Only the holder of the current `ticket` may
/// apply the result; superseded or cancelled fetches still resolve for their
/// awaiters but leave the entry alone.
struct InFlight {
    ticket: u64,
    kind: FetchKind,
    future: SharedFetch,
}

/// How a fetch was started. A forced fetch carries data the cache cannot
/// recover by refetching (an appended page), so writes wait for it; a read
/// can be cancelled and repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Read,
    Forced,
}

/// Result of an optimistic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    /// The server accepted the write; the optimistic value stays.
    Committed(T),
    /// The server rejected the write; the entry was restored to its prior data.
    RolledBack(GatewayError),
}

impl<T> WriteOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed(_))
    }

    pub fn into_result(self) -> Result<T, GatewayError> {
        match self {
            WriteOutcome::Committed(value) => Ok(value),
            WriteOutcome::RolledBack(error) => Err(error),
        }
    }
}

struct Inner {
    config: CacheConfig,
    entries: RwLock<HashMap<QueryKey, CacheEntry>>,
    in_flight: Mutex<HashMap<QueryKey, InFlight>>,
    refreshers: Mutex<HashMap<QueryKey, Fetcher>>,
    write_locks: Mutex<HashMap<QueryKey, Arc<tokio::sync::Mutex<()>>>>,
    next_ticket: AtomicU64,
}

/// Shared client-side query cache.
///
/// Cloning is cheap and yields a handle to the same store. Create one at
/// startup, hand it to every view, and call [`QueryCache::clear`] on teardown.
///
/// Lock order is `in_flight` then `entries`; neither is held across an await.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                refreshers: Mutex::new(HashMap::new()),
                write_locks: Mutex::new(HashMap::new()),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Serve `key` from memory when fresh, otherwise fetch it.
    ///
    /// `fetcher` is remembered as the key's refresh function for background
    /// refetches after invalidation. Concurrent reads of a key that is already
    /// loading await the same fetch instead of starting another.
    pub async fn read(&self, key: QueryKey, fetcher: Fetcher) -> FetchResult {
        mutex_lock(&self.inner.refreshers, SOURCE, "read.refreshers").insert(key, fetcher.clone());

        let (ticket, future) = {
            let mut in_flight = mutex_lock(&self.inner.in_flight, SOURCE, "read.in_flight");
            let mut entries = rw_write(&self.inner.entries, SOURCE, "read.entries");
            let entry = entries.entry(key).or_default();

            if let Some(data) = entry.servable(self.inner.config.stale_after()) {
                counter!("postdesk_cache_hit_total", "key" => key.label()).increment(1);
                return Ok(data.clone());
            }

            counter!("postdesk_cache_miss_total", "key" => key.label()).increment(1);
            match joinable(&in_flight, key) {
                Some((ticket, future)) => {
                    debug!(%key, ticket, "Joining in-flight fetch");
                    (ticket, future)
                }
                None => self.start_fetch(&mut in_flight, entry, key, &fetcher, FetchKind::Read),
            }
        };

        let result = future.await;
        self.settle(key, ticket, &result);
        result
    }

    /// Fetch `key` with a one-off `fetcher`, bypassing freshness.
    ///
    /// Joins the in-flight fetch when one exists for the key.
    pub async fn fetch(&self, key: QueryKey, fetcher: Fetcher) -> FetchResult {
        let (ticket, future) = {
            let mut in_flight = mutex_lock(&self.inner.in_flight, SOURCE, "fetch.in_flight");
            match joinable(&in_flight, key) {
                Some(joined) => joined,
                None => {
                    let mut entries = rw_write(&self.inner.entries, SOURCE, "fetch.entries");
                    let entry = entries.entry(key).or_default();
                    self.start_fetch(&mut in_flight, entry, key, &fetcher, FetchKind::Forced)
                }
            }
        };

        let result = future.await;
        self.settle(key, ticket, &result);
        result
    }

    /// Current data for `key` without fetching.
    pub fn peek(&self, key: QueryKey) -> Option<CacheValue> {
        rw_read(&self.inner.entries, SOURCE, "peek")
            .get(&key)
            .and_then(|entry| entry.data().cloned())
    }

    /// Copy of the entry for `key`.
    pub fn entry(&self, key: QueryKey) -> Option<CacheEntry> {
        rw_read(&self.inner.entries, SOURCE, "entry")
            .get(&key)
            .cloned()
    }

    pub fn status(&self, key: QueryKey) -> EntryStatus {
        rw_read(&self.inner.entries, SOURCE, "status")
            .get(&key)
            .map_or(EntryStatus::Idle, CacheEntry::status)
    }

    pub fn is_stale(&self, key: QueryKey) -> bool {
        rw_read(&self.inner.entries, SOURCE, "is_stale")
            .get(&key)
            .is_some_and(CacheEntry::is_stale)
    }

    /// Whether an optimistic write for `key` is waiting on the server.
    pub fn has_snapshot(&self, key: QueryKey) -> bool {
        rw_read(&self.inner.entries, SOURCE, "has_snapshot")
            .get(&key)
            .is_some_and(CacheEntry::has_pending_write)
    }

    pub fn is_fetching(&self, key: QueryKey) -> bool {
        mutex_lock(&self.inner.in_flight, SOURCE, "is_fetching").contains_key(&key)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Apply `mutate` to the cached data at once, then run `commit`.
    ///
    /// On success the optimistic value stays and every key matching
    /// `invalidate_on_success` is invalidated. On failure the entry is restored
    /// to exactly the data it held before the write and the error is returned.
    ///
    /// Writes to the same key run one at a time in arrival order, so each
    /// write snapshots the state left by the previous one. A forced fetch in
    /// flight for the key settles before the write applies; an in-flight read
    /// is cancelled and the key is refetched once the write resolves.
    pub async fn optimistic_write<M, C, Fut, T>(
        &self,
        key: QueryKey,
        mutate: M,
        commit: C,
        invalidate_on_success: &[QueryKey],
    ) -> WriteOutcome<T>
    where
        M: FnOnce(&CacheValue) -> CacheValue,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let lock = self.write_lock(key);
        let _serialized = lock.lock().await;

        let applied = loop {
            let forced = {
                let mut in_flight =
                    mutex_lock(&self.inner.in_flight, SOURCE, "optimistic_write.in_flight");
                let forced = in_flight
                    .get(&key)
                    .filter(|flight| flight.kind == FetchKind::Forced)
                    .map(|flight| (flight.ticket, flight.future.clone()));
                match forced {
                    Some(forced) => forced,
                    None => {
                        let mut entries =
                            rw_write(&self.inner.entries, SOURCE, "optimistic_write.apply");
                        let entry = entries.entry(key).or_default();
                        if let Some(flight) = in_flight.remove(&key) {
                            entry.abandon_fetch();
                            entry.mark_stale();
                            debug!(%key, ticket = flight.ticket, "Cancelled in-flight read");
                        }
                        break entry.apply_optimistic(mutate);
                    }
                }
            };

            let (ticket, future) = forced;
            debug!(%key, ticket, "Waiting for forced fetch before write");
            let result = future.await;
            self.settle(key, ticket, &result);
        };
        debug!(%key, applied, "Applied optimistic value");

        match commit().await {
            Ok(value) => {
                if let Some(entry) =
                    rw_write(&self.inner.entries, SOURCE, "optimistic_write.confirm").get_mut(&key)
                {
                    entry.confirm_optimistic();
                }
                for filter in invalidate_on_success {
                    self.invalidate(*filter);
                }
                self.refetch_if_stale(key);
                WriteOutcome::Committed(value)
            }
            Err(error) => {
                if let Some(entry) =
                    rw_write(&self.inner.entries, SOURCE, "optimistic_write.rollback").get_mut(&key)
                {
                    entry.rollback();
                }
                counter!("postdesk_cache_rollback_total", "key" => key.label()).increment(1);
                warn!(
                    %key,
                    error = %error,
                    error_kind = error.kind(),
                    "Optimistic write rejected; rolled back"
                );
                self.refetch_if_stale(key);
                WriteOutcome::RolledBack(error)
            }
        }
    }

    /// Store a value confirmed by the server.
    pub fn set(&self, key: QueryKey, value: CacheValue) {
        rw_write(&self.inner.entries, SOURCE, "set")
            .entry(key)
            .or_default()
            .resolve(value);
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Mark every entry matching `filter` stale and refresh it in the background.
    ///
    /// Data stays visible until the refetch resolves. Returns the number of
    /// entries marked.
    pub fn invalidate(&self, filter: QueryKey) -> usize {
        let keys: Vec<QueryKey> = {
            let mut entries = rw_write(&self.inner.entries, SOURCE, "invalidate");
            entries
                .iter_mut()
                .filter(|(key, _)| key.matches(&filter))
                .map(|(key, entry)| {
                    entry.mark_stale();
                    *key
                })
                .collect()
        };

        counter!("postdesk_cache_invalidate_total", "key" => filter.label())
            .increment(keys.len() as u64);
        debug!(%filter, marked = keys.len(), "Invalidated query keys");

        if self.inner.config.refetch_on_invalidate {
            for key in &keys {
                self.spawn_refetch(*key);
            }
        }
        keys.len()
    }

    /// Drop the entry for `key` along with its refresh function.
    pub fn remove(&self, key: QueryKey) {
        self.cancel_fetch(key);
        rw_write(&self.inner.entries, SOURCE, "remove").remove(&key);
        mutex_lock(&self.inner.refreshers, SOURCE, "remove.refreshers").remove(&key);
        let mut write_locks = mutex_lock(&self.inner.write_locks, SOURCE, "remove.write_locks");
        if write_locks
            .get(&key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            write_locks.remove(&key);
        }
    }

    /// Forget everything. Write locks held by running writes are kept so
    /// later writes to those keys still queue behind them.
    pub fn clear(&self) {
        mutex_lock(&self.inner.in_flight, SOURCE, "clear.in_flight").clear();
        rw_write(&self.inner.entries, SOURCE, "clear.entries").clear();
        mutex_lock(&self.inner.refreshers, SOURCE, "clear.refreshers").clear();
        mutex_lock(&self.inner.write_locks, SOURCE, "clear.write_locks")
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn start_fetch(
        &self,
        in_flight: &mut HashMap<QueryKey, InFlight>,
        entry: &mut CacheEntry,
        key: QueryKey,
        fetcher: &Fetcher,
        kind: FetchKind,
    ) -> (u64, SharedFetch) {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let future = fetcher(entry.data().cloned()).shared();
        in_flight.insert(
            key,
            InFlight {
                ticket,
                kind,
                future: future.clone(),
            },
        );
        entry.begin_fetch();
        counter!("postdesk_cache_fetch_total", "key" => key.label()).increment(1);
        debug!(%key, ticket, ?kind, "Started fetch");
        (ticket, future)
    }

    /// Apply a fetch result if `ticket` is still the key's current fetch.
    fn settle(&self, key: QueryKey, ticket: u64, result: &FetchResult) {
        let mut in_flight = mutex_lock(&self.inner.in_flight, SOURCE, "settle.in_flight");
        if in_flight.get(&key).map(|flight| flight.ticket) != Some(ticket) {
            return;
        }
        in_flight.remove(&key);

        let mut entries = rw_write(&self.inner.entries, SOURCE, "settle.entries");
        let entry = entries.entry(key).or_default();

        if entry.has_pending_write() {
            // the optimistic value stays; the key stays stale until refetched after the write
            entry.abandon_fetch();
            entry.mark_stale();
            debug!(%key, ticket, "Discarded fetch result during pending write");
            return;
        }

        match result {
            Ok(value) => {
                entry.resolve(value.clone());
                debug!(%key, ticket, "Fetch resolved");
            }
            Err(error) => {
                entry.fail(error.clone());
                warn!(
                    %key,
                    ticket,
                    error = %error,
                    error_kind = error.kind(),
                    "Fetch failed"
                );
            }
        }
    }

    /// Drop the in-flight marker for `key` so its late result is not applied.
    fn cancel_fetch(&self, key: QueryKey) {
        let mut in_flight = mutex_lock(&self.inner.in_flight, SOURCE, "cancel_fetch.in_flight");
        if let Some(flight) = in_flight.remove(&key) {
            if let Some(entry) =
                rw_write(&self.inner.entries, SOURCE, "cancel_fetch.entries").get_mut(&key)
            {
                entry.abandon_fetch();
            }
            debug!(%key, ticket = flight.ticket, "Cancelled in-flight fetch");
        }
    }

    /// Refetch `key` after a write if a read was cancelled or discarded while
    /// the write was pending.
    fn refetch_if_stale(&self, key: QueryKey) {
        if self.inner.config.refetch_on_invalidate && self.is_stale(key) && !self.is_fetching(key)
        {
            self.spawn_refetch(key);
        }
    }

    /// Register a refetch for `key` synchronously and drive it on a spawned task,
    /// so reads issued right after invalidation join it.
    fn spawn_refetch(&self, key: QueryKey) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(%key, "No async runtime; refetch deferred to next read");
            return;
        };
        let Some(fetcher) = mutex_lock(&self.inner.refreshers, SOURCE, "spawn_refetch.refreshers")
            .get(&key)
            .cloned()
        else {
            return;
        };

        let (ticket, future) = {
            let mut in_flight =
                mutex_lock(&self.inner.in_flight, SOURCE, "spawn_refetch.in_flight");
            let mut entries = rw_write(&self.inner.entries, SOURCE, "spawn_refetch.entries");
            let Some(entry) = entries.get_mut(&key) else {
                return;
            };
            if entry.has_pending_write() {
                return;
            }
            // a fetch started before the invalidation may carry outdated data
            self.start_fetch(&mut in_flight, entry, key, &fetcher, FetchKind::Read)
        };

        let cache = self.clone();
        runtime.spawn(async move {
            let result = future.await;
            cache.settle(key, ticket, &result);
        });
    }

    fn write_lock(&self, key: QueryKey) -> Arc<tokio::sync::Mutex<()>> {
        mutex_lock(&self.inner.write_locks, SOURCE, "write_lock")
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use time::macros::datetime;
    use tokio::sync::oneshot;

    use super::*;
    use crate::domain::posts::{Post, PostPages, PostStatus};

    fn post(id: i64, title: &str) -> Post {
        Post {
            id,
            title: title.to_string(),
            content: String::new(),
            status: PostStatus::Draft,
            date_created: datetime!(2021-03-04 10:00 UTC),
        }
    }

    fn pages(titles: &[(i64, &str)]) -> CacheValue {
        CacheValue::Pages(PostPages::from_pages(vec![
            titles.iter().map(|(id, title)| post(*id, title)).collect(),
        ]))
    }

    fn retitle(value: &CacheValue, id: i64, title: &str) -> CacheValue {
        match value {
            CacheValue::Pages(pages) => CacheValue::Pages(pages.with_title(id, title)),
            other => other.clone(),
        }
    }

    fn title_of(value: Option<CacheValue>, id: i64) -> Option<String> {
        value
            .and_then(CacheValue::into_pages)
            .and_then(|pages| pages.find(id).map(|p| p.title.clone()))
    }

    /// Fetcher that counts calls and yields once before resolving.
    fn counting_fetcher(calls: Arc<AtomicUsize>, title: &'static str) -> Fetcher {
        fetcher(move |_current| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(CacheValue::Post(post(1, title)))
            }
        })
    }

    async fn let_tasks_run() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn cache_without_refetch() -> QueryCache {
        QueryCache::new(CacheConfig {
            refetch_on_invalidate: false,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let cache = QueryCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let f = counting_fetcher(calls.clone(), "one");

        let (a, b, c) = tokio::join!(
            cache.read(QueryKey::Post(1), f.clone()),
            cache.read(QueryKey::Post(1), f.clone()),
            cache.read(QueryKey::Post(1), f.clone()),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(cache.status(QueryKey::Post(1)), EntryStatus::Success);
        assert!(!cache.is_fetching(QueryKey::Post(1)));
    }

    #[tokio::test]
    async fn fresh_entry_is_served_from_memory() {
        let cache = QueryCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let f = counting_fetcher(calls.clone(), "one");

        cache.read(QueryKey::Post(1), f.clone()).await.expect("first read");
        cache.read(QueryKey::Post(1), f).await.expect("second read");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_reported_and_not_retried() {
        let cache = QueryCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let failing = fetcher(move |_| {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::NotFound { id: 9 })
            }
        });

        let err = cache
            .read(QueryKey::Post(9), failing)
            .await
            .expect_err("fetch should fail");

        assert_eq!(err, GatewayError::NotFound { id: 9 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.status(QueryKey::Post(9)), EntryStatus::Error);
    }

    #[tokio::test]
    async fn failed_optimistic_write_restores_prior_data() {
        let cache = QueryCache::new(CacheConfig::default());
        cache.set(QueryKey::Posts, pages(&[(4, "Four"), (5, "Old Title")]));
        let before = cache.peek(QueryKey::Posts);

        let outcome = cache
            .optimistic_write(
                QueryKey::Posts,
                |v| retitle(v, 5, "New Title"),
                || async { Err::<(), _>(GatewayError::network("connection reset")) },
                &[],
            )
            .await;

        assert_eq!(
            outcome,
            WriteOutcome::RolledBack(GatewayError::network("connection reset"))
        );
        assert_eq!(cache.peek(QueryKey::Posts), before);
        let entry = cache.entry(QueryKey::Posts).expect("entry");
        assert!(entry.snapshot().is_none());
        assert!(!entry.is_stale());
    }

    #[tokio::test]
    async fn optimistic_value_is_visible_before_commit_resolves() {
        let cache = QueryCache::new(CacheConfig::default());
        cache.set(QueryKey::Posts, pages(&[(5, "Old Title")]));
        let (tx, rx) = oneshot::channel::<Result<(), GatewayError>>();

        let write = cache.optimistic_write(
            QueryKey::Posts,
            |v| retitle(v, 5, "New Title"),
            move || async move { rx.await.unwrap_or(Err(GatewayError::Timeout)) },
            &[],
        );
        let observe = async {
            let_tasks_run().await;
            let seen = title_of(cache.peek(QueryKey::Posts), 5);
            let snapshot = cache
                .entry(QueryKey::Posts)
                .and_then(|e| e.snapshot().cloned());
            let _ = tx.send(Ok(()));
            (seen, snapshot)
        };

        let (outcome, (seen, snapshot)) = tokio::join!(write, observe);

        assert!(outcome.is_committed());
        assert_eq!(seen.as_deref(), Some("New Title"));
        assert_eq!(title_of(snapshot, 5).as_deref(), Some("Old Title"));
        assert!(
            cache
                .entry(QueryKey::Posts)
                .expect("entry")
                .snapshot()
                .is_none()
        );
        assert_eq!(
            title_of(cache.peek(QueryKey::Posts), 5).as_deref(),
            Some("New Title")
        );
    }

    #[tokio::test]
    async fn writes_to_one_key_are_serialized() {
        let cache = QueryCache::new(CacheConfig::default());
        cache.set(QueryKey::Posts, pages(&[(5, "v0")]));
        let (tx1, rx1) = oneshot::channel::<Result<(), GatewayError>>();
        let (tx2, rx2) = oneshot::channel::<Result<(), GatewayError>>();

        let w1 = cache.optimistic_write(
            QueryKey::Posts,
            |v| retitle(v, 5, "v1"),
            move || async move { rx1.await.unwrap_or(Err(GatewayError::Timeout)) },
            &[],
        );
        let w2 = cache.optimistic_write(
            QueryKey::Posts,
            |v| retitle(v, 5, "v2"),
            move || async move { rx2.await.unwrap_or(Err(GatewayError::Timeout)) },
            &[],
        );
        let driver = async {
            let_tasks_run().await;
            // w2 is queued behind w1
            let during_w1 = cache.entry(QueryKey::Posts).expect("entry");
            let _ = tx1.send(Ok(()));
            let_tasks_run().await;
            let during_w2 = cache.entry(QueryKey::Posts).expect("entry");
            let _ = tx2.send(Err(GatewayError::validation("title too long")));
            (during_w1, during_w2)
        };

        let (o1, o2, (during_w1, during_w2)) = tokio::join!(w1, w2, driver);

        assert!(o1.is_committed());
        assert!(!o2.is_committed());
        assert_eq!(title_of(during_w1.data().cloned(), 5).as_deref(), Some("v1"));
        assert_eq!(title_of(during_w1.snapshot().cloned(), 5).as_deref(), Some("v0"));
        assert_eq!(title_of(during_w2.data().cloned(), 5).as_deref(), Some("v2"));
        assert_eq!(title_of(during_w2.snapshot().cloned(), 5).as_deref(), Some("v1"));
        // w2 rolled back onto w1's confirmed value
        assert_eq!(
            title_of(cache.peek(QueryKey::Posts), 5).as_deref(),
            Some("v1")
        );
    }

    #[tokio::test]
    async fn invalidated_key_refetches_once_on_next_read() {
        let cache = cache_without_refetch();
        let calls = Arc::new(AtomicUsize::new(0));
        let f = counting_fetcher(calls.clone(), "one");

        cache.read(QueryKey::Post(1), f.clone()).await.expect("initial");
        assert_eq!(cache.invalidate(QueryKey::Posts), 1);
        assert!(cache.is_stale(QueryKey::Post(1)));
        // data stays visible while stale
        assert!(cache.peek(QueryKey::Post(1)).is_some());

        cache.read(QueryKey::Post(1), f.clone()).await.expect("refetch");
        cache.read(QueryKey::Post(1), f).await.expect("hit");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_stale(QueryKey::Post(1)));
    }

    #[tokio::test]
    async fn background_refetch_is_joined_by_next_read() {
        let cache = QueryCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let f = counting_fetcher(calls.clone(), "one");

        cache.read(QueryKey::Post(1), f.clone()).await.expect("initial");
        cache.invalidate(QueryKey::Post(1));
        assert!(cache.is_fetching(QueryKey::Post(1)));

        cache.read(QueryKey::Post(1), f).await.expect("joined refetch");
        let_tasks_run().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_fetching(QueryKey::Post(1)));
        assert!(!cache.is_stale(QueryKey::Post(1)));
    }

    #[tokio::test]
    async fn successful_write_invalidates_dependent_keys() {
        let cache = cache_without_refetch();
        cache.set(QueryKey::Posts, pages(&[(5, "Old Title")]));
        cache.set(QueryKey::Post(5), CacheValue::Post(post(5, "Old Title")));

        let outcome = cache
            .optimistic_write(
                QueryKey::Posts,
                |v| retitle(v, 5, "New Title"),
                || async { Ok::<_, GatewayError>(post(5, "New Title")) },
                &[QueryKey::Post(5)],
            )
            .await;

        assert!(outcome.is_committed());
        assert!(cache.is_stale(QueryKey::Post(5)));
        assert!(!cache.is_stale(QueryKey::Posts));
    }

    #[tokio::test]
    async fn optimistic_write_suppresses_late_read_result() {
        let cache = cache_without_refetch();
        cache.set(QueryKey::Posts, pages(&[(5, "Old Title")]));
        cache.invalidate(QueryKey::Posts);
        let (tx, rx) = oneshot::channel::<()>();

        // a read that resolves only after the write has started
        let gate = Arc::new(Mutex::new(Some(rx)));
        let gated = fetcher(move |_| {
            let gate = gate.clone();
            async move {
                let rx = gate.lock().ok().and_then(|mut slot| slot.take());
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
                Ok(pages(&[(5, "Server Title")]))
            }
        });

        let read = cache.read(QueryKey::Posts, gated);
        let write = async {
            let_tasks_run().await;
            cache
                .optimistic_write(
                    QueryKey::Posts,
                    |v| retitle(v, 5, "New Title"),
                    || async {
                        let _ = tx.send(());
                        let_tasks_run().await;
                        Ok::<_, GatewayError>(())
                    },
                    &[],
                )
                .await
        };

        let (read_result, outcome) = tokio::join!(read, write);

        assert!(outcome.is_committed());
        // the reader still gets its value
        assert_eq!(
            title_of(read_result.ok(), 5).as_deref(),
            Some("Server Title")
        );
        // but the cached value is the confirmed optimistic one
        assert_eq!(
            title_of(cache.peek(QueryKey::Posts), 5).as_deref(),
            Some("New Title")
        );
        // and the cancelled read leaves the key due for a refetch
        assert!(cache.is_stale(QueryKey::Posts));
    }

    #[tokio::test]
    async fn write_refetches_key_after_cancelling_a_read() {
        let cache = QueryCache::new(CacheConfig::default());
        cache.set(QueryKey::Posts, pages(&[(5, "Old Title")]));
        cache.invalidate(QueryKey::Posts);
        let (tx, rx) = oneshot::channel::<()>();
        let calls = Arc::new(AtomicUsize::new(0));

        // first call returns data from before the write, later calls after it
        let gate = Arc::new(Mutex::new(Some(rx)));
        let counted = calls.clone();
        let gated = fetcher(move |_| {
            let gate = gate.clone();
            let call = counted.fetch_add(1, Ordering::SeqCst);
            async move {
                let rx = gate.lock().ok().and_then(|mut slot| slot.take());
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
                let title = if call == 0 { "Old Title" } else { "New Title" };
                Ok(pages(&[(5, title)]))
            }
        });

        let read = cache.read(QueryKey::Posts, gated);
        let write = async {
            let_tasks_run().await;
            cache
                .optimistic_write(
                    QueryKey::Posts,
                    |v| retitle(v, 5, "New Title"),
                    || async {
                        let _ = tx.send(());
                        let_tasks_run().await;
                        Ok::<_, GatewayError>(())
                    },
                    &[],
                )
                .await
        };

        let (_, outcome) = tokio::join!(read, write);
        assert!(outcome.is_committed());
        assert!(cache.is_fetching(QueryKey::Posts));

        let_tasks_run().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_fetching(QueryKey::Posts));
        assert!(!cache.is_stale(QueryKey::Posts));
        assert_eq!(
            title_of(cache.peek(QueryKey::Posts), 5).as_deref(),
            Some("New Title")
        );
    }

    #[tokio::test]
    async fn write_waits_for_forced_fetch_to_settle() {
        let cache = cache_without_refetch();
        cache.set(QueryKey::Posts, pages(&[(5, "Old Title")]));
        let (tx, rx) = oneshot::channel::<()>();

        // appends a second page once released
        let gate = Arc::new(Mutex::new(Some(rx)));
        let next_page = fetcher(move |current: Option<CacheValue>| {
            let gate = gate.clone();
            let held = current
                .and_then(CacheValue::into_pages)
                .unwrap_or_default();
            async move {
                let rx = gate.lock().ok().and_then(|mut slot| slot.take());
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
                Ok(CacheValue::Pages(held.appended(vec![post(6, "Next Page")])))
            }
        });

        let fetch = cache.fetch(QueryKey::Posts, next_page);
        let write = async {
            let_tasks_run().await;
            cache
                .optimistic_write(
                    QueryKey::Posts,
                    |v| retitle(v, 5, "New Title"),
                    || async { Ok::<_, GatewayError>(()) },
                    &[],
                )
                .await
        };
        let release = async {
            let_tasks_run().await;
            let_tasks_run().await;
            let _ = tx.send(());
        };

        let (fetched, outcome, ()) = tokio::join!(fetch, write, release);

        assert!(fetched.is_ok());
        assert!(outcome.is_committed());
        let held = cache
            .peek(QueryKey::Posts)
            .and_then(CacheValue::into_pages)
            .unwrap_or_default();
        assert_eq!(held.page_count(), 2);
        assert_eq!(held.find(5).map(|p| p.title.as_str()), Some("New Title"));
        assert_eq!(held.find(6).map(|p| p.title.as_str()), Some("Next Page"));
        assert!(!cache.is_stale(QueryKey::Posts));
    }

    #[tokio::test]
    async fn forced_fetch_joins_in_flight_fetch() {
        let cache = QueryCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let f = counting_fetcher(calls.clone(), "one");

        let (a, b) = tokio::join!(
            cache.fetch(QueryKey::Post(1), f.clone()),
            cache.fetch(QueryKey::Post(1), f),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_drops_all_entries() {
        let cache = QueryCache::new(CacheConfig::default());
        cache.set(QueryKey::Post(1), CacheValue::Post(post(1, "a")));
        cache.set(QueryKey::Posts, pages(&[(1, "a")]));

        cache.clear();

        assert!(cache.peek(QueryKey::Post(1)).is_none());
        assert!(cache.peek(QueryKey::Posts).is_none());
        assert_eq!(cache.status(QueryKey::Posts), EntryStatus::Idle);
    }

    fn write_lock_keys(cache: &QueryCache) -> Vec<QueryKey> {
        mutex_lock(&cache.inner.write_locks, SOURCE, "test.write_locks")
            .keys()
            .copied()
            .collect()
    }

    async fn commit_retitle(cache: &QueryCache, key: QueryKey) {
        let outcome = cache
            .optimistic_write(
                key,
                |v| retitle(v, 1, "b"),
                || async { Ok::<_, GatewayError>(()) },
                &[],
            )
            .await;
        assert!(outcome.is_committed());
    }

    #[tokio::test]
    async fn clear_and_remove_drop_idle_write_locks() {
        let cache = cache_without_refetch();
        cache.set(QueryKey::Posts, pages(&[(1, "a")]));
        cache.set(QueryKey::Post(1), CacheValue::Post(post(1, "a")));
        commit_retitle(&cache, QueryKey::Posts).await;
        commit_retitle(&cache, QueryKey::Post(1)).await;
        assert_eq!(write_lock_keys(&cache).len(), 2);

        cache.remove(QueryKey::Post(1));
        assert_eq!(write_lock_keys(&cache), vec![QueryKey::Posts]);

        cache.clear();
        assert!(write_lock_keys(&cache).is_empty());
    }

    #[tokio::test]
    async fn clear_keeps_write_lock_held_by_running_write() {
        let cache = cache_without_refetch();
        cache.set(QueryKey::Posts, pages(&[(1, "a")]));
        let (tx, rx) = oneshot::channel::<()>();

        let write = cache.optimistic_write(
            QueryKey::Posts,
            |v| retitle(v, 1, "b"),
            || async move {
                let _ = rx.await;
                Ok::<_, GatewayError>(())
            },
            &[],
        );
        let clear = async {
            let_tasks_run().await;
            cache.clear();
            let held = write_lock_keys(&cache);
            let _ = tx.send(());
            held
        };

        let (outcome, held) = tokio::join!(write, clear);

        assert!(outcome.is_committed());
        assert_eq!(held, vec![QueryKey::Posts]);
    }
}
