//! Local persistent cache of catalog records
//!
//! One entry per catalog key, each stamped with the time it was last
//! written. Presence does not imply freshness: callers compare
//! `last_refreshed` against their own staleness threshold at read time.

mod store;

pub use store::{normalize_name, CacheStore, FileStore, StoreError};
