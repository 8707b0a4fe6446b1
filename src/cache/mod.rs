//! Client-side query cache.
//!
//! Keeps the last known server response for each query key and coordinates
//! every access to it:
//!
//! - **Reads** are served from memory while fresh; concurrent misses for one
//!   key share a single fetch.
//! - **Optimistic writes** show the new value at once, run the server call,
//!   and roll back to the prior data if the server rejects it. Writes to the
//!   same key queue behind each other.
//! - **Invalidation** marks entries stale without dropping their data and
//!   refetches them in the background.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! refetch_on_invalidate = true
//! # stale_after_seconds = 60
//! ```

mod config;
mod entry;
mod keys;
mod lock;
mod store;
mod value;

pub(crate) use lock::mutex_lock;

pub use config::CacheConfig;
pub use entry::{CacheEntry, EntryStatus};
pub use keys::QueryKey;
pub use store::{FetchResult, Fetcher, QueryCache, WriteOutcome, fetcher};
pub use value::CacheValue;
