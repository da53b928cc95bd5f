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

use std::{sync::Arc, time::Instant};

use hashbrown::HashMap;
use itertools::Itertools;
use warmcache_common::{
    code::{HashBuilder, Key, Value},
    error::{Error, ErrorKind, Result},
    lifecycle::Lifecycle,
};
use warmcache_memory::Store;

use crate::loader::{KeyFactory, MissLoader};

/// Serves batches of keys from the store, loading all misses of a batch with one miss loader call.
pub struct RequestHandler<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    store: Store<K, V, S>,
    loader: Arc<dyn MissLoader<K, V>>,
    key_factory: Arc<dyn KeyFactory<K, V>>,
    lifecycle: Arc<Lifecycle>,
}

impl<K, V, S> RequestHandler<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Create a request handler over `store`.
    pub fn new(
        store: Store<K, V, S>,
        loader: Arc<dyn MissLoader<K, V>>,
        key_factory: Arc<dyn KeyFactory<K, V>>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            store,
            loader,
            key_factory,
            lifecycle,
        }
    }

    /// Resolve `keys` from the store, or from the miss loader for the keys the store does not hold.
    ///
    /// Duplicated keys resolve once. Keys resolvable by neither source are omitted. Values are returned in the
    /// order their keys first appear in `keys`, callers should still associate them by key.
    ///
    /// A miss loader failure is returned as [`ErrorKind::External`], a load interrupted by cache shutdown as
    /// [`ErrorKind::TaskCancelled`]. Nothing is retried.
    pub async fn get_many<I>(&self, keys: I) -> Result<Vec<V>>
    where
        I: IntoIterator<Item = K>,
    {
        let requested = keys.into_iter().unique().collect_vec();

        let mut slots = Vec::with_capacity(requested.len());
        let mut misses = vec![];
        for key in requested.iter() {
            let value = self.store.try_get(key);
            if value.is_none() {
                misses.push(key.clone());
            }
            slots.push(value);
        }

        tracing::debug!(
            "[request handler]: found {} of {} requested keys, missed {}",
            requested.len() - misses.len(),
            requested.len(),
            misses.len()
        );

        if misses.is_empty() {
            return Ok(slots.into_iter().flatten().collect());
        }

        let pending: HashMap<K, usize> = requested
            .into_iter()
            .enumerate()
            .filter(|(i, _)| slots[*i].is_none())
            .map(|(i, key)| (key, i))
            .collect();

        let loaded = self.load(misses).await?;

        let mut discarded = 0;
        for value in loaded {
            let key = self.key_factory.key_of(&value);
            match pending.get(&key) {
                Some(&slot) => {
                    self.store.upsert(key, value.clone());
                    slots[slot] = Some(value);
                }
                None => {
                    tracing::debug!("[request handler]: discard loaded value of unrequested key: {key:?}");
                    discarded += 1;
                }
            }
        }
        if discarded > 0 {
            self.store.metrics().miss_load_discard.increase(discarded);
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Resolve a single key.
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        let mut values = self.get_many([key.clone()]).await?;
        Ok(values.pop())
    }

    async fn load(&self, keys: Vec<K>) -> Result<Vec<V>> {
        let metrics = self.store.metrics();
        let signal = self.lifecycle.signal();
        if signal.is_cancelled() {
            return Err(Error::new(ErrorKind::Closed, "cache is closed"));
        }

        let count = keys.len();
        let start = Instant::now();
        metrics.miss_load.increase(1);

        let res = tokio::select! {
            biased;
            _ = signal.cancelled() => {
                return Err(Error::cancelled("miss load cancelled by cache shutdown").with_context("keys", count));
            }
            res = self.loader.load_on_miss(keys, signal.clone()) => res,
        };

        metrics.miss_load_duration.record(start.elapsed().as_secs_f64());

        res.map_err(|e| {
            metrics.miss_load_error.increase(1);
            tracing::warn!("[request handler]: miss load of {count} keys failed: {e:#}");
            Error::external("miss load failed", e).with_context("keys", count)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use warmcache_common::clock::ManualClock;

    use super::*;
    use crate::test_utils::{key_of, row, store, Backing, Row};

    fn handler(backing: &Backing) -> (RequestHandler<u64, Row, ahash::RandomState>, Arc<Lifecycle>) {
        let lifecycle = Arc::new(Lifecycle::new());
        let handler = RequestHandler::new(
            store(Arc::new(ManualClock::default())),
            Arc::new(backing.clone()),
            Arc::new(key_of),
            lifecycle.clone(),
        );
        (handler, lifecycle)
    }

    #[test_log::test(tokio::test)]
    async fn test_batch_coalescing() {
        let backing = Backing::with_rows((1..=3).map(|id| row(id, 0)));
        let (handler, _) = handler(&backing);
        handler.store.upsert(1, row(1, 0));
        handler.store.upsert(2, row(2, 0));

        let values = handler.get_many([1, 2, 3]).await.unwrap();
        assert_eq!(values, vec![row(1, 0), row(2, 0), row(3, 0)]);
        assert_eq!(backing.calls(), vec![vec![3]]);

        // The loaded value is resident now.
        assert!(handler.store.contains(&3));
        handler.get_many([1, 2, 3]).await.unwrap();
        assert_eq!(backing.calls().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_absent_key_is_idempotent() {
        let backing = Backing::default();
        let (handler, _) = handler(&backing);

        assert_eq!(handler.get(&42).await.unwrap(), None);
        assert_eq!(handler.get(&42).await.unwrap(), None);
        assert_eq!(backing.calls(), vec![vec![42], vec![42]]);
        assert!(handler.store.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_duplicated_keys_collapse() {
        let backing = Backing::with_rows([row(3, 0), row(4, 0)]);
        let (handler, _) = handler(&backing);

        let values = handler.get_many([3, 3, 4, 3, 5]).await.unwrap();
        assert_eq!(values, vec![row(3, 0), row(4, 0)]);
        assert_eq!(backing.calls(), vec![vec![3, 4, 5]]);
    }

    #[test_log::test(tokio::test)]
    async fn test_unrequested_values_are_discarded() {
        let backing = Backing::with_rows([row(3, 0)]);
        backing.add_stray(row(99, 0));
        let (handler, _) = handler(&backing);

        let values = handler.get_many([3]).await.unwrap();
        assert_eq!(values, vec![row(3, 0)]);
        assert!(!handler.store.contains(&99));
    }

    #[test_log::test(tokio::test)]
    async fn test_loader_failure_propagates() {
        let backing = Backing::with_rows([row(1, 0)]);
        backing.fail_next(1);
        let (handler, _) = handler(&backing);

        let err = handler.get(&1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::External);
        assert!(!handler.store.contains(&1));

        // No retry within a call, the next call loads again.
        assert_eq!(handler.get(&1).await.unwrap(), Some(row(1, 0)));
        assert_eq!(backing.calls().len(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_shutdown_cancels_inflight_load() {
        let backing = Backing::with_rows([row(1, 0)]);
        backing.set_delay(Duration::from_secs(3600));
        let (handler, lifecycle) = handler(&backing);
        let handler = Arc::new(handler);

        let task = {
            let handler = handler.clone();
            tokio::spawn(async move { handler.get(&1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        lifecycle.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskCancelled);
    }

    #[test_log::test(tokio::test)]
    async fn test_closed_cache_serves_hits_only() {
        let backing = Backing::with_rows([row(1, 0), row(2, 0)]);
        let (handler, lifecycle) = handler(&backing);
        handler.store.upsert(1, row(1, 0));
        lifecycle.cancel();

        assert_eq!(handler.get(&1).await.unwrap(), Some(row(1, 0)));
        let err = handler.get(&2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
        assert!(backing.calls().is_empty());
    }
}
