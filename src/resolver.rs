//! Read-through resolution of lookup keys into catalog records
//!
//! The resolver serves fresh cache entries directly, refreshes missing or
//! stale ones from the remote catalogs, and falls back to a stale copy when
//! a refresh fails. At most one remote resolution per key runs at a time;
//! concurrent callers for the same key share its result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{normalize_name, CacheStore, StoreError};
use crate::catalog::{
    CatalogClient, CatalogError, CatalogRecord, LookupKey, Provider, SearchOptions,
};
use crate::config::ResolverConfig;

/// Errors surfaced to resolver callers
///
/// Provider errors never reach callers verbatim: they arrive wrapped in
/// `ResolutionFailed`, and only when no cached copy could be served.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Remote resolution failed and nothing was cached for the key
    #[error("Could not resolve {key}: {source}")]
    ResolutionFailed {
        key: String,
        #[source]
        source: CatalogError,
    },

    /// The local cache could not be read
    #[error("Cache storage error: {0}")]
    Storage(#[source] Arc<StoreError>),
}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        ResolveError::Storage(Arc::new(err))
    }
}

/// What a remote resolution fetches; also the single-flight key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Target {
    /// Search by normalised name, then fetch the top candidate
    Name(String),
    /// Fetch a known key directly from one provider
    Record { provider: Provider, key: String },
}

type PendingResolution = Shared<BoxFuture<'static, Result<CatalogRecord, CatalogError>>>;

/// Read-through cache controller
///
/// Cheap to clone; clones share the store, the clients and the in-flight
/// map. Construct once and hand clones to whoever needs to resolve.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CacheStore>,
    /// Catalog searched for `LookupKey::ByName`
    names: Arc<dyn CatalogClient>,
    /// Catalog queried directly for `LookupKey::ByStableId`
    stable_ids: Arc<dyn CatalogClient>,
    config: ResolverConfig,
    in_flight: Mutex<HashMap<Target, PendingResolution>>,
}

/// Removes a finished resolution from the in-flight map, even on panic
struct FlightGuard {
    inner: Arc<Inner>,
    target: Target,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.target);
    }
}

impl Resolver {
    /// Creates a resolver over a store and the two catalog clients
    pub fn new(
        store: Arc<dyn CacheStore>,
        names: Arc<dyn CatalogClient>,
        stable_ids: Arc<dyn CatalogClient>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                names,
                stable_ids,
                config,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The underlying cache store
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.inner.store
    }

    /// Timeouts, retry bound and default staleness threshold
    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Resolves `key` using the configured staleness threshold
    pub async fn resolve(
        &self,
        key: &LookupKey,
        options: &SearchOptions,
    ) -> Result<CatalogRecord, ResolveError> {
        self.resolve_with(key, options, self.inner.config.stale_after)
            .await
    }

    /// Resolves `key`, treating cache entries older than `stale_after` as stale
    ///
    /// # Behavior
    /// - Fresh cache entry: returned without any remote call
    /// - Missing or stale: resolved remotely and written back
    /// - Remote failure with a stale copy: the stale copy is returned
    /// - Remote failure without a copy: `ResolutionFailed`
    ///
    /// Dropping the returned future detaches this caller only; a remote
    /// resolution already started keeps running for the other waiters and
    /// still writes its result back.
    pub async fn resolve_with(
        &self,
        key: &LookupKey,
        options: &SearchOptions,
        stale_after: Duration,
    ) -> Result<CatalogRecord, ResolveError> {
        let cached = self.cached(key)?;
        let threshold = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);

        if let Some(record) = &cached {
            if record.is_fresh(Utc::now(), threshold) {
                debug!(%key, "cache hit");
                return Ok(record.clone());
            }
            debug!(%key, "cache entry is stale");
        } else {
            debug!(%key, "cache miss");
        }

        let (target, term) = self.target_for(key);
        match self.resolve_remote(target, term, options).await {
            Ok(record) => Ok(record),
            Err(error) => match cached {
                Some(stale) => {
                    warn!(%key, %error, "refresh failed, serving stale cache entry");
                    Ok(stale)
                }
                None => Err(ResolveError::ResolutionFailed {
                    key: key.to_string(),
                    source: error,
                }),
            },
        }
    }

    /// Returns the cached record for `key` regardless of age
    pub fn cached(&self, key: &LookupKey) -> Result<Option<CatalogRecord>, ResolveError> {
        match self.store_key(key)? {
            Some((provider, store_key)) => Ok(self.inner.store.get(provider, &store_key)?),
            None => Ok(None),
        }
    }

    /// Deletes the cached record for `key`, if any
    pub fn evict(&self, key: &LookupKey) -> Result<(), ResolveError> {
        if let Some((provider, store_key)) = self.store_key(key)? {
            self.inner.store.delete(provider, &store_key)?;
            info!(%key, %provider, store_key = %store_key, "evicted cache entry");
        }
        Ok(())
    }

    /// Re-fetches a cached record from the provider that produced it
    ///
    /// Uses the language and region the record was resolved with, or the
    /// defaults for records that carry none. No stale fallback: the caller
    /// decides what a failure means.
    pub async fn refresh(&self, record: &CatalogRecord) -> Result<CatalogRecord, ResolveError> {
        let target = Target::Record {
            provider: record.provider,
            key: record.key.clone(),
        };
        let options = record
            .locale
            .as_ref()
            .map(SearchOptions::for_locale)
            .unwrap_or_default();
        self.resolve_remote(target, record.key.clone(), &options)
            .await
            .map_err(|source| ResolveError::ResolutionFailed {
                key: record.stable_key().to_string(),
                source,
            })
    }

    /// Provider and cache key a lookup maps to, if known without a remote
    /// call
    ///
    /// Stable ids live in the stable-id provider's key space. Names map
    /// through the alias recorded by an earlier resolution into the name
    /// provider's key space.
    fn store_key(&self, key: &LookupKey) -> Result<Option<(Provider, String)>, StoreError> {
        match key {
            LookupKey::ByStableId(id) => Ok(Some((self.inner.stable_ids.provider(), id.clone()))),
            LookupKey::ByName(name) => Ok(self
                .inner
                .store
                .alias(name)?
                .map(|resolved| (self.inner.names.provider(), resolved))),
        }
    }

    fn target_for(&self, key: &LookupKey) -> (Target, String) {
        match key {
            LookupKey::ByName(name) => (Target::Name(normalize_name(name)), name.trim().to_string()),
            LookupKey::ByStableId(id) => (
                Target::Record {
                    provider: self.inner.stable_ids.provider(),
                    key: id.clone(),
                },
                id.clone(),
            ),
        }
    }

    /// Joins the in-flight resolution for `target` or starts a new one
    async fn resolve_remote(
        &self,
        target: Target,
        term: String,
        options: &SearchOptions,
    ) -> Result<CatalogRecord, CatalogError> {
        let pending = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(pending) = in_flight.get(&target) {
                debug!(?target, "joining in-flight resolution");
                pending.clone()
            } else {
                let guard = FlightGuard {
                    inner: Arc::clone(&self.inner),
                    target: target.clone(),
                };
                let options = options.clone();
                let task_target = target.clone();
                let handle = tokio::spawn(async move {
                    let result = guard
                        .inner
                        .fetch_and_store(&task_target, &term, &options)
                        .await;
                    drop(guard);
                    result
                });

                let pending = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(CatalogError::Transport(format!(
                            "resolution task failed: {}",
                            e
                        )))
                    })
                }
                .boxed()
                .shared();

                in_flight.insert(target, pending.clone());
                pending
            }
        };

        pending.await
    }
}

impl Inner {
    /// Runs the remote protocol for `target` and writes the result back
    async fn fetch_and_store(
        &self,
        target: &Target,
        term: &str,
        options: &SearchOptions,
    ) -> Result<CatalogRecord, CatalogError> {
        let mut record = match target {
            Target::Name(_) => {
                let candidates = self
                    .call("search", || self.names.search(term, options))
                    .await?;
                // Provider ranking is trusted as-is
                let candidate = candidates
                    .into_iter()
                    .next()
                    .ok_or_else(|| CatalogError::NotFound(format!("no results for '{}'", term)))?;
                debug!(term, candidate = %candidate.key, "selected top search candidate");

                self.call("detail", || self.names.fetch_detail(&candidate.key, options))
                    .await?
            }
            Target::Record { provider, key } => {
                let client = self.client_for(*provider)?;
                let mut record = self
                    .call("detail", || client.fetch_detail(key, options))
                    .await?;
                if record.key != *key {
                    warn!(requested = %key, returned = %record.key, "provider returned a different key, keeping requested key");
                    record.key = key.clone();
                }
                record
            }
        };
        record.locale = Some(options.locale());

        Ok(self.write_back(target, term, record))
    }

    /// Stores a freshly resolved record; storage faults are logged only
    fn write_back(&self, target: &Target, term: &str, record: CatalogRecord) -> CatalogRecord {
        let stored = match self.store.put(record.clone()) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %record.key, error = %e, "failed to cache resolved record");
                return record;
            }
        };

        if let Target::Name(_) = target {
            if let Err(e) = self.store.set_alias(term, &stored.key) {
                warn!(term, key = %stored.key, error = %e, "failed to record name alias");
            }
        }

        info!(key = %stored.key, title = %stored.title, "resolved catalog record");
        stored
    }

    fn client_for(&self, provider: Provider) -> Result<&Arc<dyn CatalogClient>, CatalogError> {
        if self.stable_ids.provider() == provider {
            Ok(&self.stable_ids)
        } else if self.names.provider() == provider {
            Ok(&self.names)
        } else {
            Err(CatalogError::NotFound(format!(
                "no catalog client configured for {:?}",
                provider
            )))
        }
    }

    /// Runs one remote step with a timeout and bounded retries
    ///
    /// A timeout counts as a transport error. `NotFound` is never retried.
    async fn call<T, F, Fut>(&self, step: &'static str, mut op: F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let timeout = self.config.request_timeout;
        let attempts = self.config.attempts();
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(CatalogError::Transport(format!(
                    "{} timed out after {:?}",
                    step, timeout
                ))),
            };

            match result {
                Err(error) if error.is_retryable() && attempt < attempts => {
                    warn!(step, attempt, %error, "remote call failed, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
