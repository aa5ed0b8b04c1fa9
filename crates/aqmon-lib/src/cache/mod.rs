//! Named caches subject to memory-pressure eviction
//!
//! Caches do not know about budgets; the cleanup coordinator owns the
//! limits and drives eviction through [`EvictableCache`].

mod session;
mod store;

pub use session::SessionStore;
pub use store::TypedCache;

use crate::models::{ChartPoint, MetricKey, Sample};
use crate::series::RangeSelector;
use std::sync::Arc;

/// Well-known cache names
pub mod names {
    pub const REMOTE_DATA: &str = "remote-data";
    pub const DERIVED_DATA: &str = "derived-data";
    pub const IMAGE_CACHE: &str = "image-cache";
    pub const SESSION: &str = "session";
}

/// Eviction surface every named cache exposes
pub trait EvictableCache: Send + Sync {
    /// Cache name used for budgets and logs
    fn name(&self) -> &str;

    /// Trim every held array to `max_length`, keeping the newest items.
    /// Returns the number of items removed.
    fn truncate(&self, max_length: usize) -> usize;

    /// Drop least-recently-updated entries until at most `max_entries`
    /// remain. Returns the number of entries removed.
    fn evict_lru(&self, max_entries: usize) -> usize;

    /// Drop everything. Returns the number of entries removed.
    fn clear_all(&self) -> usize;

    fn entry_count(&self) -> usize;

    fn item_count(&self) -> usize;
}

/// Session-scoped scratch storage cleared on critical pressure
pub trait TransientStorage: Send + Sync {
    fn name(&self) -> &str;

    /// Drop everything. Returns the number of values removed.
    fn clear(&self) -> usize;
}

/// Key of one remote query: a source and the range it was fetched for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub source_id: String,
    pub range: RangeSelector,
}

impl QueryKey {
    pub fn new(source_id: impl Into<String>, range: RangeSelector) -> Self {
        Self {
            source_id: source_id.into(),
            range,
        }
    }
}

/// Key of a derived series: one metric of one query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub query: QueryKey,
    pub metric: MetricKey,
}

/// Raw samples per query, as fetched
pub type RemoteDataCache = TypedCache<QueryKey, Arc<Sample>>;

/// Transformed chart points per query and metric
pub type DerivedDataCache = TypedCache<SeriesKey, ChartPoint>;

/// Encoded image bytes per URL; arrays are not trimmable
pub type ImageCache = TypedCache<String, u8>;

/// Create the remote-data cache
pub fn remote_data_cache() -> RemoteDataCache {
    TypedCache::new(names::REMOTE_DATA)
}

/// Create the derived-data cache
pub fn derived_data_cache() -> DerivedDataCache {
    TypedCache::new(names::DERIVED_DATA)
}

/// Create the image cache
pub fn image_cache() -> ImageCache {
    TypedCache::new(names::IMAGE_CACHE).without_partial_truncation()
}
