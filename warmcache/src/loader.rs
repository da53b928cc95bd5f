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

use std::future::Future;

use futures_util::{
    future::{ready, BoxFuture},
    FutureExt,
};
use warmcache_common::{
    code::{Key, Value},
    lifecycle::CancelSignal,
};

/// Loads the values of keys missing from the cache.
///
/// Called at most once per [`WarmCache::get_many`](crate::WarmCache::get_many) call with every missed key. The
/// loader may omit keys it cannot resolve. Values for keys that were not requested are discarded.
///
/// Any async closure of the right shape is a miss loader:
///
/// ```rust
/// # use warmcache::{CancelSignal, MissLoader};
/// fn assert_loader<L: MissLoader<u64, String>>(_: L) {}
/// assert_loader(|keys: Vec<u64>, _: CancelSignal| async move {
///     anyhow::Ok(keys.into_iter().map(|k| k.to_string()).collect())
/// });
/// ```
pub trait MissLoader<K, V>: Send + Sync + 'static
where
    K: Key,
    V: Value,
{
    /// Load the values of `keys`.
    fn load_on_miss(&self, keys: Vec<K>, signal: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<V>>>;
}

impl<K, V, F, FU> MissLoader<K, V> for F
where
    K: Key,
    V: Value,
    F: Fn(Vec<K>, CancelSignal) -> FU + Send + Sync + 'static,
    FU: Future<Output = anyhow::Result<Vec<V>>> + Send + 'static,
{
    fn load_on_miss(&self, keys: Vec<K>, signal: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<V>>> {
        self(keys, signal).boxed()
    }
}

/// Reloads resident keys whose refresh deadline passed.
///
/// Keys the loader omits keep their stale value and are offered again on the next refresh run.
pub trait RefreshLoader<K, V>: Send + Sync + 'static
where
    K: Key,
    V: Value,
{
    /// Load fresh values of `keys`.
    fn load_on_refresh(&self, keys: Vec<K>, signal: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<V>>>;
}

impl<K, V, F, FU> RefreshLoader<K, V> for F
where
    K: Key,
    V: Value,
    F: Fn(Vec<K>, CancelSignal) -> FU + Send + Sync + 'static,
    FU: Future<Output = anyhow::Result<Vec<V>>> + Send + 'static,
{
    fn load_on_refresh(&self, keys: Vec<K>, signal: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<V>>> {
        self(keys, signal).boxed()
    }
}

/// Bulk loads values at startup.
///
/// Both phases load nothing by default.
pub trait StartupLoader<V>: Send + Sync + 'static
where
    V: Value,
{
    /// Values the cache must hold before it is handed to the host.
    fn load_blocking(&self, signal: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<V>>> {
        let _ = signal;
        ready(Ok(vec![])).boxed()
    }

    /// Values loaded while the cache already serves requests.
    fn load_background(&self, signal: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<V>>> {
        let _ = signal;
        ready(Ok(vec![])).boxed()
    }
}

/// A startup loader that loads nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStartupLoader;

impl<V> StartupLoader<V> for NoopStartupLoader where V: Value {}

/// Derives the cache key of a value.
///
/// Must be deterministic, and injective over the values a loader can return.
pub trait KeyFactory<K, V>: Send + Sync + 'static {
    /// The key of `value`.
    fn key_of(&self, value: &V) -> K;
}

impl<K, V, F> KeyFactory<K, V> for F
where
    F: Fn(&V) -> K + Send + Sync + 'static,
{
    fn key_of(&self, value: &V) -> K {
        self(value)
    }
}

#[cfg(test)]
mod tests {
    use warmcache_common::lifecycle::Lifecycle;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_closure_loaders() {
        let lifecycle = Lifecycle::new();

        let miss =
            |keys: Vec<u64>, _: CancelSignal| async move { anyhow::Ok(keys.iter().map(|k| k * 10).collect()) };
        let values = MissLoader::<u64, u64>::load_on_miss(&miss, vec![1, 2], lifecycle.signal())
            .await
            .unwrap();
        assert_eq!(values, vec![10, 20]);

        let refresh = |keys: Vec<u64>, _: CancelSignal| async move { anyhow::Ok(keys) };
        let values = RefreshLoader::<u64, u64>::load_on_refresh(&refresh, vec![3], lifecycle.signal())
            .await
            .unwrap();
        assert_eq!(values, vec![3]);

        let derive = |v: &u64| v / 10;
        assert_eq!(derive.key_of(&20), 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_noop_startup_loader() {
        let lifecycle = Lifecycle::new();
        let loader = NoopStartupLoader;
        let blocking: Vec<u64> = loader.load_blocking(lifecycle.signal()).await.unwrap();
        let background: Vec<u64> = loader.load_background(lifecycle.signal()).await.unwrap();
        assert!(blocking.is_empty());
        assert!(background.is_empty());
    }
}
