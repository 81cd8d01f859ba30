//! gamecache library
//!
//! Read-through cache over remote game catalogs: resolves names and package
//! identifiers into catalog records, persists them locally, and keeps the
//! local copy from growing stale.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod maintenance;
pub mod resolver;

pub use cache::{CacheStore, FileStore, StoreError};
pub use catalog::{CatalogClient, CatalogError, CatalogRecord, LookupKey, SearchOptions};
pub use resolver::{ResolveError, Resolver};
