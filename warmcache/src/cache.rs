// Copyright 2026 warmcache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{fmt::Debug, hash::Hash, sync::Arc};

use equivalent::Equivalent;
use parking_lot::Mutex;
use warmcache_common::{
    clock::{Clock, SystemClock},
    code::{HashBuilder, Key, Value},
    error::{Error, ErrorKind, Result},
    event::EventListener,
    lifecycle::{CancelSignal, Lifecycle, StartupPhase, StopReason},
    metrics::{model::Metrics, registry::noop::NoopMetricsRegistry, BoxedRegistry, RegistryOps},
    spawn::{SpawnHandle, Spawner},
};
use warmcache_memory::{EntryPolicy, Store, StoreConfig};

use crate::{
    handler::RequestHandler,
    hydrator::{Hydration, Hydrator},
    loader::{KeyFactory, MissLoader, NoopStartupLoader, RefreshLoader, StartupLoader},
    options::CacheOptions,
    refresher::Refresher,
};

/// Builder of a [`WarmCache`].
pub struct WarmCacheBuilder<K, V, S = ahash::RandomState>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    options: CacheOptions,
    hash_builder: S,
    clock: Arc<dyn Clock>,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
    registry: BoxedRegistry,
    spawner: Option<Spawner>,
    miss_loader: Option<Arc<dyn MissLoader<K, V>>>,
    refresh_loader: Option<Arc<dyn RefreshLoader<K, V>>>,
    startup_loader: Arc<dyn StartupLoader<V>>,
    key_factory: Option<Arc<dyn KeyFactory<K, V>>>,
    policy: Option<Arc<dyn EntryPolicy<K, V>>>,
}

impl<K, V> WarmCacheBuilder<K, V>
where
    K: Key,
    V: Value,
{
    /// Create a builder with the given options.
    pub fn new(options: CacheOptions) -> Self {
        Self {
            options,
            hash_builder: ahash::RandomState::default(),
            clock: Arc::new(SystemClock),
            event_listener: None,
            registry: Box::new(NoopMetricsRegistry),
            spawner: None,
            miss_loader: None,
            refresh_loader: None,
            startup_loader: Arc::new(NoopStartupLoader),
            key_factory: None,
            policy: None,
        }
    }
}

impl<K, V, S> WarmCacheBuilder<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Set the hash builder of the store.
    pub fn with_hash_builder<OS>(self, hash_builder: OS) -> WarmCacheBuilder<K, V, OS>
    where
        OS: HashBuilder,
    {
        WarmCacheBuilder {
            options: self.options,
            hash_builder,
            clock: self.clock,
            event_listener: self.event_listener,
            registry: self.registry,
            spawner: self.spawner,
            miss_loader: self.miss_loader,
            refresh_loader: self.refresh_loader,
            startup_loader: self.startup_loader,
            key_factory: self.key_factory,
            policy: self.policy,
        }
    }

    /// Set the clock that drives entry deadlines.
    ///
    /// Default: [`SystemClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the listener of entries leaving the store.
    pub fn with_event_listener(mut self, event_listener: Arc<dyn EventListener<Key = K, Value = V>>) -> Self {
        self.event_listener = Some(event_listener);
        self
    }

    /// Set the metrics registry.
    ///
    /// Default: [`NoopMetricsRegistry`].
    pub fn with_metrics_registry(mut self, registry: impl RegistryOps) -> Self {
        self.registry = Box::new(registry);
        self
    }

    /// Set the spawner of the background jobs.
    ///
    /// Default: the runtime `build()` is awaited on.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Set the loader of missed keys. Required.
    pub fn with_miss_loader(mut self, loader: impl MissLoader<K, V>) -> Self {
        self.miss_loader = Some(Arc::new(loader));
        self
    }

    /// Set the loader of stale keys. Required.
    pub fn with_refresh_loader(mut self, loader: impl RefreshLoader<K, V>) -> Self {
        self.refresh_loader = Some(Arc::new(loader));
        self
    }

    /// Set the startup bulk loader.
    ///
    /// Default: [`NoopStartupLoader`].
    pub fn with_startup_loader(mut self, loader: impl StartupLoader<V>) -> Self {
        self.startup_loader = Arc::new(loader);
        self
    }

    /// Set the function deriving keys from loaded values. Required.
    pub fn with_key_factory(mut self, key_factory: impl KeyFactory<K, V>) -> Self {
        self.key_factory = Some(Arc::new(key_factory));
        self
    }

    /// Set the per-entry policy. Required.
    pub fn with_entry_policy(mut self, policy: impl EntryPolicy<K, V>) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Build the cache.
    ///
    /// Runs the blocking hydration phase, then spawns the background hydration phase and the refresh job.
    ///
    /// Fails with [`ErrorKind::Config`] on invalid options or missing collaborators. A failed blocking phase fails
    /// the build only if a startup abort threshold is set, otherwise the cache starts cold.
    pub async fn build(self) -> Result<WarmCache<K, V, S>> {
        self.options.validate()?;

        let miss_loader = self.miss_loader.ok_or_else(|| Error::config("miss loader is required"))?;
        let refresh_loader = self
            .refresh_loader
            .ok_or_else(|| Error::config("refresh loader is required"))?;
        let key_factory = self.key_factory.ok_or_else(|| Error::config("key factory is required"))?;
        let policy = self.policy.ok_or_else(|| Error::config("entry policy is required"))?;

        let options = self.options;
        let spawner = self.spawner.unwrap_or_else(Spawner::current);
        let metrics = Arc::new(Metrics::new(options.name.clone(), &*self.registry));
        let lifecycle = Arc::new(Lifecycle::new());

        let store = Store::new(StoreConfig {
            capacity: options.size_limit,
            shards: options.shards,
            compaction_fraction: options.compaction_fraction,
            eviction_scan_interval: options.eviction_scan_interval,
            hash_builder: self.hash_builder,
            policy,
            clock: self.clock,
            event_listener: self.event_listener,
            metrics,
        });

        let handler = RequestHandler::new(store.clone(), miss_loader, key_factory.clone(), lifecycle.clone());
        let hydrator = Arc::new(
            Hydrator::new(store.clone(), self.startup_loader, key_factory.clone(), lifecycle.clone())
                .with_abort_threshold(options.startup_abort_threshold)
                .with_retry_delay(options.startup_retry_delay),
        );
        let refresher = Refresher::new(store.clone(), refresh_loader, key_factory, lifecycle.clone())
            .with_interval(options.refresh_interval)
            .with_abort_threshold(options.refresh_abort_threshold);

        if let Err(e) = hydrator.hydrate(StartupPhase::Blocking).await {
            if options.startup_abort_threshold.is_some() {
                lifecycle.cancel();
                return Err(e);
            }
            tracing::warn!("[warmcache]: {} starts cold, blocking hydration failed: {e}", options.name);
        }

        let background = {
            let hydrator = hydrator.clone();
            spawner.spawn(async move {
                if let Err(e) = hydrator.hydrate(StartupPhase::Background).await {
                    tracing::debug!("[warmcache]: background hydration ended without loading: {e}");
                }
            })
        };
        let refresh = spawner.spawn(refresher.run());

        tracing::info!("[warmcache]: {} is ready, entries: {}", options.name, store.len());

        Ok(WarmCache {
            inner: Arc::new(WarmCacheInner {
                store,
                handler,
                hydrator,
                options,
                lifecycle,
                tasks: Mutex::new(vec![background, refresh]),
            }),
        })
    }
}

struct WarmCacheInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    store: Store<K, V, S>,
    handler: RequestHandler<K, V, S>,
    hydrator: Arc<Hydrator<K, V, S>>,
    options: CacheOptions,
    lifecycle: Arc<Lifecycle>,
    tasks: Mutex<Vec<SpawnHandle<()>>>,
}

impl<K, V, S> Drop for WarmCacheInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn drop(&mut self) {
        self.lifecycle.cancel();
    }
}

/// A self-refreshing read-through cache.
///
/// Values are served from memory and loaded from the backing source on miss. A background job reloads entries
/// whose refresh deadline passed and removes entries that were not read within their idle period.
///
/// Cloning is cheap, every clone shares the same cache. Dropping the last clone cancels the background jobs.
pub struct WarmCache<K, V, S = ahash::RandomState>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    inner: Arc<WarmCacheInner<K, V, S>>,
}

impl<K, V, S> Clone for WarmCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, S> Debug for WarmCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmCache")
            .field("name", &self.inner.options.name)
            .field("entries", &self.inner.store.len())
            .field("usage", &self.inner.store.usage())
            .field("hydration", &self.inner.hydrator.status())
            .finish()
    }
}

impl<K, V, S> WarmCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Resolve `keys`, loading every missed key with a single miss loader call.
    ///
    /// See [`RequestHandler::get_many`].
    pub async fn get_many<I>(&self, keys: I) -> Result<Vec<V>>
    where
        I: IntoIterator<Item = K>,
    {
        self.inner.handler.get_many(keys).await
    }

    /// Resolve a single key.
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        self.inner.handler.get(key).await
    }

    /// Look up `key` in memory only.
    ///
    /// Neither loads nor slides the idle deadline.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.inner.store.peek(key)
    }

    /// Remove `key` from memory.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.inner.store.remove(key)
    }

    /// The underlying store.
    pub fn store(&self) -> &Store<K, V, S> {
        &self.inner.store
    }

    /// The options the cache was built with.
    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// Status of the startup hydration phases.
    pub fn hydration(&self) -> Hydration {
        self.inner.hydrator.status()
    }

    /// Wait until the cache asks its host to stop.
    pub async fn stop_requested(&self) -> StopReason {
        self.inner.lifecycle.stop_requested().await
    }

    /// The stop request raised by the cache, if any.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.inner.lifecycle.stop_reason()
    }

    /// A signal that fires when the cache is closed.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.inner.lifecycle.signal()
    }

    /// Cancel the background jobs and in-flight loads, and wait for the background jobs to exit.
    ///
    /// The cache keeps serving resident entries, misses fail with [`ErrorKind::Closed`].
    pub async fn close(&self) -> Result<()> {
        self.inner.lifecycle.cancel();
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::TaskCancelled => {}
                Err(e) => return Err(e),
            }
        }
        tracing::debug!("[warmcache]: {} closed", self.inner.options.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use warmcache_common::clock::ManualClock;
    use warmcache_memory::DurationPolicy;

    use super::*;
    use crate::{
        hydrator::HydrationStatus,
        test_utils::{idle_period, key_of, refresh_period, row, Backing, Bulk, Row},
    };

    fn builder(backing: &Backing) -> WarmCacheBuilder<u64, Row> {
        WarmCacheBuilder::new(CacheOptions::default().with_startup_retry_delay(Duration::from_millis(1)))
            .with_clock(Arc::new(ManualClock::default()))
            .with_miss_loader(backing.clone())
            .with_refresh_loader(backing.clone())
            .with_key_factory(key_of)
            .with_entry_policy(DurationPolicy::new(refresh_period(), idle_period()))
    }

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<WarmCache<u64, Row>>();
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_collaborators() {
        let backing = Backing::default();

        let err = WarmCacheBuilder::<u64, Row>::new(CacheOptions::default())
            .with_refresh_loader(backing.clone())
            .with_key_factory(key_of)
            .with_entry_policy(DurationPolicy::new(refresh_period(), idle_period()))
            .build()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = WarmCacheBuilder::<u64, Row>::new(CacheOptions::default())
            .with_miss_loader(backing.clone())
            .with_refresh_loader(backing.clone())
            .with_key_factory(key_of)
            .build()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test_log::test(tokio::test)]
    async fn test_invalid_options() {
        let backing = Backing::default();
        let mut builder = builder(&backing);
        builder.options = builder.options.with_compaction_fraction(0.0);
        let err = builder.build().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test_log::test(tokio::test)]
    async fn test_read_through() {
        let backing = Backing::with_rows([row(1, 0), row(2, 0)]);
        let cache = builder(&backing).build().await.unwrap();

        assert_eq!(cache.peek(&1), None);
        assert_eq!(cache.get(&1).await.unwrap(), Some(row(1, 0)));
        assert_eq!(cache.peek(&1), Some(row(1, 0)));
        assert_eq!(cache.get_many([1, 2, 3]).await.unwrap(), vec![row(1, 0), row(2, 0)]);
        assert_eq!(backing.calls(), vec![vec![1], vec![2, 3]]);

        assert_eq!(cache.remove(&1), Some(row(1, 0)));
        assert_eq!(cache.store().len(), 1);
        cache.close().await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_cold_start_without_threshold() {
        let backing = Backing::with_rows([row(1, 0)]);
        let bulk = Bulk::new(vec![row(1, 0)], vec![]).with_blocking_failures(1);
        let cache = builder(&backing).with_startup_loader(bulk.clone()).build().await.unwrap();

        assert_eq!(cache.hydration().blocking, HydrationStatus::Failed { failures: 1 });
        assert!(cache.store().is_empty());
        assert_eq!(cache.stop_reason(), None);
        assert_eq!(cache.get(&1).await.unwrap(), Some(row(1, 0)));
        cache.close().await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_background_failure_is_recorded() {
        let backing = Backing::default();
        let bulk = Bulk::new(vec![row(1, 0)], vec![row(2, 0)]).with_background_failures(1);
        let cache = builder(&backing).with_startup_loader(bulk.clone()).build().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.hydration().background != (HydrationStatus::Failed { failures: 1 }) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(cache.hydration().blocking, HydrationStatus::Completed { loaded: 1 });
        assert_eq!(bulk.background_calls(), 1);
        assert_eq!(cache.stop_reason(), None);
        assert!(!cache.store().contains(&2));
        cache.close().await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_close() {
        let backing = Backing::with_rows([row(1, 0), row(2, 0)]);
        let cache = builder(&backing).build().await.unwrap();
        let signal = cache.cancel_signal();
        cache.get(&1).await.unwrap();

        cache.close().await.unwrap();
        assert!(signal.is_cancelled());
        assert_eq!(cache.get(&1).await.unwrap(), Some(row(1, 0)));
        assert_eq!(cache.get(&2).await.unwrap_err().kind(), ErrorKind::Closed);
        // Closing twice is fine.
        cache.close().await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_drop_cancels() {
        let backing = Backing::default();
        let cache = builder(&backing).build().await.unwrap();
        let signal = cache.cancel_signal();
        let clone = cache.clone();

        drop(cache);
        assert!(!signal.is_cancelled());
        drop(clone);
        tokio::time::timeout(Duration::from_secs(5), signal.cancelled())
            .await
            .unwrap();
    }
}
