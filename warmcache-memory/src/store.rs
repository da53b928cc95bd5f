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

use std::{
    fmt::Debug,
    hash::Hash,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use equivalent::Equivalent;
use hashbrown::hash_table::{Entry as HashTableEntry, HashTable};
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use warmcache_common::{
    clock::Clock,
    code::{HashBuilder, Key, Value},
    event::{Event, EventListener},
    metrics::model::Metrics,
    properties::Priority,
    scope::Scope,
    strict_assert,
};

use crate::{
    policy::EntryPolicy,
    record::{Record, Tracking},
};

/// Configuration of a [`Store`].
pub struct StoreConfig<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Size budget, in the unit of the policy weights.
    pub capacity: usize,
    /// Count of shards. Treated as `1` if zero.
    pub shards: usize,
    /// Fraction of the capacity to free below the capacity when the budget is exceeded.
    pub compaction_fraction: f64,
    /// Minimum interval between full eviction scans after a scan could not reach its target.
    pub eviction_scan_interval: Duration,
    /// Hash builder for keys.
    pub hash_builder: S,
    /// Per-entry policy.
    pub policy: Arc<dyn EntryPolicy<K, V>>,
    /// Time source for deadlines.
    pub clock: Arc<dyn Clock>,
    /// Optional listener of records leaving the store.
    pub event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
    /// Metrics.
    pub metrics: Arc<Metrics>,
}

type Garbages<K, V> = Vec<(Event, Arc<Record<K, V>>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Upsert,
    Replace,
}

struct Shard<K, V> {
    table: HashTable<Arc<Record<K, V>>>,
}

impl<K, V> Default for Shard<K, V> {
    fn default() -> Self {
        Self {
            table: HashTable::new(),
        }
    }
}

impl<K, V> Shard<K, V>
where
    K: Key,
    V: Value,
{
    /// Insert or replace. A replacement inherits the idle deadline of the record it replaces.
    fn insert(&mut self, mut record: Arc<Record<K, V>>) -> Option<Arc<Record<K, V>>> {
        match self
            .table
            .entry(record.hash(), |r| r.key() == record.key(), |r| r.hash())
        {
            HashTableEntry::Occupied(mut o) => {
                record.set_remove_after(o.get().remove_after());
                std::mem::swap(o.get_mut(), &mut record);
                Some(record)
            }
            HashTableEntry::Vacant(v) => {
                v.insert(record);
                None
            }
        }
    }

    fn get<Q>(&self, hash: u64, key: &Q) -> Option<&Arc<Record<K, V>>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.table.find(hash, |r| key.equivalent(r.key()))
    }

    /// Remove the record of `key` if `predicate` holds for it.
    fn remove_if<Q, F>(&mut self, hash: u64, key: &Q, predicate: F) -> Option<Arc<Record<K, V>>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
        F: FnOnce(&Arc<Record<K, V>>) -> bool,
    {
        match self.table.find_entry(hash, |r| key.equivalent(r.key())) {
            Ok(o) if predicate(o.get()) => {
                let (r, _) = o.remove();
                Some(r)
            }
            _ => None,
        }
    }
}

struct Compaction {
    rng: SmallRng,
    /// Set when the last full scan could not reach the low watermark.
    saturated_at: Option<DateTime<Utc>>,
}

struct StoreInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    shards: Vec<RwLock<Shard<K, V>>>,

    usage: AtomicUsize,
    capacity: usize,
    low_watermark: usize,

    eviction_scan_interval: TimeDelta,
    compaction: Mutex<Compaction>,

    hash_builder: S,
    policy: Arc<dyn EntryPolicy<K, V>>,
    clock: Arc<dyn Clock>,

    metrics: Arc<Metrics>,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
}

impl<K, V, S> StoreInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn clear(&self) {
        let mut garbages = vec![];

        self.shards
            .iter()
            .map(|shard| shard.write())
            .for_each(|mut shard| garbages.extend(shard.table.drain()));

        let weight: usize = garbages.iter().map(|r| r.weight()).sum();
        self.usage.fetch_sub(weight, Ordering::Relaxed);
        self.metrics.usage.absolute(self.usage.load(Ordering::Relaxed) as _);

        // Do not call the listener within the lock section.
        if let Some(listener) = self.event_listener.as_ref() {
            for record in garbages {
                listener.on_leave(Event::Clear, record.key(), record.value());
            }
        }
    }
}

impl<K, V, S> Drop for StoreInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn drop(&mut self) {
        self.clear();
    }
}

/// The sharded store of a warmcache.
///
/// Each resident key maps to one [`Record`] holding the value and its deadlines, so the tracking of a key is
/// removed in the same step as its value, whatever removes it.
///
/// When a write pushes the total weight over the capacity, the writer compacts the store before returning: victims
/// are taken from the lowest [`Priority`] tier first, at random within a tier, until the usage drops to
/// `capacity - capacity * compaction_fraction`. [`Priority::NeverRemove`] records are never victims. If the store is
/// still over capacity after compaction, the written record itself is evicted.
pub struct Store<K, V, S = ahash::RandomState>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    inner: Arc<StoreInner<K, V, S>>,
}

impl<K, V, S> Clone for Store<K, V, S>
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

impl<K, V, S> Debug for Store<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("shards", &self.inner.shards.len())
            .field("capacity", &self.inner.capacity)
            .field("usage", &self.usage())
            .finish()
    }
}

impl<K, V, S> Store<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Create a store with the given config.
    pub fn new(config: StoreConfig<K, V, S>) -> Self {
        let shards = (0..config.shards.max(1))
            .map(|_| RwLock::new(Shard::default()))
            .collect_vec();

        let fraction = config.compaction_fraction.clamp(0.0, 1.0);
        let compaction_target = (config.capacity as f64 * fraction).floor() as usize;
        let low_watermark = config.capacity.saturating_sub(compaction_target);

        let inner = StoreInner {
            shards,
            usage: AtomicUsize::new(0),
            capacity: config.capacity,
            low_watermark,
            eviction_scan_interval: TimeDelta::from_std(config.eviction_scan_interval)
                .unwrap_or(TimeDelta::days(36_500_000)),
            compaction: Mutex::new(Compaction {
                rng: SmallRng::from_os_rng(),
                saturated_at: None,
            }),
            hash_builder: config.hash_builder,
            policy: config.policy,
            clock: config.clock,
            metrics: config.metrics,
            event_listener: config.event_listener,
        };

        Self { inner: Arc::new(inner) }
    }

    /// Get the value of `key`, sliding its idle deadline forward from now.
    ///
    /// The refresh deadline is left as is.
    pub fn try_get<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);

        // Slide within the read lock, so that an expiry racing with this read observes the new deadline.
        let value = self.inner.shards[self.shard(hash)].read().with(|shard| {
            shard.get(hash, key).map(|record| {
                let now = self.inner.clock.now();
                record.set_remove_after(
                    self.inner
                        .policy
                        .sliding_expiration(record.key(), record.value(), now),
                );
                record.value().clone()
            })
        });

        match value {
            Some(_) => self.inner.metrics.hit.increase(1),
            None => self.inner.metrics.miss.increase(1),
        }

        value
    }

    /// Get the value of `key` without touching its deadlines.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);

        self.inner.shards[self.shard(hash)]
            .read()
            .with(|shard| shard.get(hash, key).map(|record| record.value().clone()))
    }

    /// Insert or wholesale replace the value of `key`.
    ///
    /// Weight, priority and refresh deadline are taken from the policy. A fresh key also gets its idle deadline from
    /// the policy, a replaced key keeps the idle deadline it had.
    ///
    /// Returns `false` if the size budget rejected the written entry.
    pub fn upsert(&self, key: K, value: V) -> bool {
        self.write(key, value, WriteMode::Upsert)
    }

    /// Wholesale replace the value of `key` only if it is resident.
    ///
    /// Used to apply refreshed values without resurrecting keys that expired or were evicted while they were being
    /// loaded. Returns `false` if the key was not resident or the size budget rejected the written entry.
    pub fn replace(&self, key: K, value: V) -> bool {
        self.write(key, value, WriteMode::Replace)
    }

    fn write(&self, key: K, value: V, mode: WriteMode) -> bool {
        let now = self.inner.clock.now();
        let policy = &self.inner.policy;

        let weight = policy.weight(&key, &value);
        let priority = policy.priority(&key, &value);
        let refresh_after = policy.refresh_after(&key, &value, now);
        let remove_after = policy.sliding_expiration(&key, &value, now);

        let hash = self.inner.hash_builder.hash_one(&key);
        let record = Arc::new(Record::new(
            key,
            value,
            hash,
            priority,
            weight,
            refresh_after,
            remove_after,
        ));

        let mut garbages = vec![];

        if weight > self.inner.capacity {
            if mode == WriteMode::Replace && !self.contains(record.key()) {
                return false;
            }
            tracing::warn!(
                "[store]: reject entry heavier than the capacity, key: {:?}, weight: {}, capacity: {}",
                record.key(),
                weight,
                self.inner.capacity
            );
            // The stale value must not outlive a rejected replacement. The rejected record was never resident, so
            // only the record it would have replaced is reported.
            if let Some(old) = self.remove_record(hash, record.key(), |_| true) {
                self.inner.metrics.evict.increase(1);
                self.inner
                    .metrics
                    .usage
                    .absolute(self.inner.usage.load(Ordering::Relaxed) as _);
                garbages.push((Event::Evict, old));
            }
            self.inner.metrics.reject.increase(1);
            self.notify(garbages);
            return false;
        }

        let written = self.inner.shards[self.shard(hash)].write().with(|mut shard| {
            if mode == WriteMode::Replace && shard.get(hash, record.key()).is_none() {
                return false;
            }
            self.inner.usage.fetch_add(weight, Ordering::Relaxed);
            match shard.insert(record.clone()) {
                Some(old) => {
                    self.inner.usage.fetch_sub(old.weight(), Ordering::Relaxed);
                    self.inner.metrics.replace.increase(1);
                    garbages.push((Event::Replace, old));
                }
                None => self.inner.metrics.insert.increase(1),
            }
            true
        });
        if !written {
            return false;
        }

        if self.inner.usage.load(Ordering::Relaxed) > self.inner.capacity {
            self.compact(&record, &mut garbages);
        }
        self.inner
            .metrics
            .usage
            .absolute(self.inner.usage.load(Ordering::Relaxed) as _);

        let resident = !garbages
            .iter()
            .any(|(event, r)| *event == Event::Evict && Arc::ptr_eq(r, &record));

        self.notify(garbages);

        resident
    }

    /// Remove `key` and its tracking.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);
        let record = self.remove_record(hash, key, |_| true)?;

        self.inner.metrics.remove.increase(1);
        self.inner
            .metrics
            .usage
            .absolute(self.inner.usage.load(Ordering::Relaxed) as _);

        let value = record.value().clone();
        self.notify(vec![(Event::Remove, record)]);
        Some(value)
    }

    /// Remove every key in `keys` together with its tracking.
    ///
    /// Returns the count of removed entries.
    pub fn remove_many<'a, Q, I>(&self, keys: I) -> usize
    where
        Q: Hash + Equivalent<K> + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        let removed = self.remove_batch(keys, Event::Remove, |_| true);
        self.inner.metrics.remove.increase(removed as _);
        removed
    }

    /// Remove the keys in `keys` whose idle deadline is not after `now`.
    ///
    /// The deadline is checked against the resident record, so a key read since the caller decided to expire it
    /// survives.
    ///
    /// Returns the count of expired entries.
    pub fn expire<'a, Q, I>(&self, keys: I, now: DateTime<Utc>) -> usize
    where
        Q: Hash + Equivalent<K> + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        let expired = self.remove_batch(keys, Event::Expire, |record| record.remove_after() <= now);
        self.inner.metrics.expire.increase(expired as _);
        expired
    }

    /// A point-in-time copy of the deadlines of every resident key.
    ///
    /// Shards are copied one at a time under their read locks.
    pub fn snapshot(&self) -> Vec<Tracking<K>> {
        let mut snapshot = Vec::with_capacity(self.len());
        for shard in self.inner.shards.iter() {
            shard
                .read()
                .with(|shard| snapshot.extend(shard.table.iter().map(|r| Tracking::from(r.as_ref()))));
        }
        snapshot
    }

    /// The deadlines of `key`, if resident.
    pub fn tracking<Q>(&self, key: &Q) -> Option<Tracking<K>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);

        self.inner.shards[self.shard(hash)]
            .read()
            .with(|shard| shard.get(hash, key).map(|r| Tracking::from(r.as_ref())))
    }

    /// Whether `key` is resident.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);

        self.inner.shards[self.shard(hash)]
            .read()
            .with(|shard| shard.get(hash, key).is_some())
    }

    /// Count of resident entries.
    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.read().table.len()).sum()
    }

    /// Whether no entry is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Size budget.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Total weight of resident entries.
    pub fn usage(&self) -> usize {
        self.inner.usage.load(Ordering::Relaxed)
    }

    /// Current time of the store clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Store metrics.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    fn shard(&self, hash: u64) -> usize {
        hash as usize % self.inner.shards.len()
    }

    fn remove_record<Q, F>(&self, hash: u64, key: &Q, predicate: F) -> Option<Arc<Record<K, V>>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
        F: FnOnce(&Arc<Record<K, V>>) -> bool,
    {
        let record = self.inner.shards[self.shard(hash)]
            .write()
            .remove_if(hash, key, predicate)?;
        self.inner.usage.fetch_sub(record.weight(), Ordering::Relaxed);
        Some(record)
    }

    fn remove_batch<'a, Q, I, F>(&self, keys: I, event: Event, predicate: F) -> usize
    where
        Q: Hash + Equivalent<K> + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
        F: Fn(&Arc<Record<K, V>>) -> bool,
    {
        let groups = keys
            .into_iter()
            .map(|key| (self.inner.hash_builder.hash_one(key), key))
            .into_group_map_by(|(hash, _)| self.shard(*hash));

        let mut garbages = vec![];
        for (shard, keys) in groups {
            self.inner.shards[shard].write().with(|mut shard| {
                for (hash, key) in keys {
                    if let Some(record) = shard.remove_if(hash, key, &predicate) {
                        self.inner.usage.fetch_sub(record.weight(), Ordering::Relaxed);
                        garbages.push((event, record));
                    }
                }
            });
        }

        let removed = garbages.len();
        if removed > 0 {
            self.inner
                .metrics
                .usage
                .absolute(self.inner.usage.load(Ordering::Relaxed) as _);
        }
        self.notify(garbages);
        removed
    }

    /// Bring the usage back under the size budget after `written` pushed it over.
    ///
    /// A full scan frees down to the low watermark. Within `eviction_scan_interval` of a full scan that could not
    /// reach the low watermark, only records ranked below `written` are victims, and only until `written` fits.
    fn compact(&self, written: &Arc<Record<K, V>>, garbages: &mut Garbages<K, V>) {
        let mut compaction = self.inner.compaction.lock();

        // Another writer may have compacted while we waited.
        if self.usage() <= self.inner.capacity {
            return;
        }

        let now = self.inner.clock.now();
        let full = match compaction.saturated_at {
            Some(at) => now.signed_duration_since(at) >= self.inner.eviction_scan_interval,
            None => true,
        };
        let (priorities, target) = if full {
            (Priority::EVICTABLE.to_vec(), self.inner.low_watermark)
        } else {
            let below = Priority::EVICTABLE
                .into_iter()
                .filter(|p| *p < written.priority())
                .collect_vec();
            (below, self.inner.capacity)
        };

        if !priorities.is_empty() {
            let mut tiers = self
                .inner
                .shards
                .iter()
                .flat_map(|shard| {
                    shard
                        .read()
                        .table
                        .iter()
                        .filter(|r| priorities.contains(&r.priority()))
                        .cloned()
                        .collect_vec()
                })
                .into_group_map_by(|r| r.priority());

            let before = self.usage();
            let mut evicted = 0;

            'tiers: for priority in priorities {
                let Some(mut tier) = tiers.remove(&priority) else {
                    continue;
                };
                tier.shuffle(&mut compaction.rng);
                for victim in tier {
                    if self.usage() <= target {
                        break 'tiers;
                    }
                    if let Some(record) = self.evict(&victim) {
                        evicted += 1;
                        garbages.push((Event::Evict, record));
                    }
                }
            }

            tracing::debug!(
                "[store]: {} compaction evicted {} entries, usage: {} => {}",
                if full { "full" } else { "partial" },
                evicted,
                before,
                self.usage()
            );
        }

        if full {
            if self.usage() > self.inner.low_watermark {
                tracing::warn!(
                    "[store]: compaction could not reach the low watermark, usage: {}, low watermark: {}, next full scan in {}",
                    self.usage(),
                    self.inner.low_watermark,
                    self.inner.eviction_scan_interval
                );
                compaction.saturated_at = Some(now);
            } else {
                compaction.saturated_at = None;
            }
        }

        if self.usage() > self.inner.capacity {
            if let Some(record) = self.evict(written) {
                tracing::debug!("[store]: reject entry over the size budget, key: {:?}", record.key());
                self.inner.metrics.reject.increase(1);
                garbages.push((Event::Evict, record));
            }
        }
    }

    /// Evict `victim` if it is still the resident record of its key.
    fn evict(&self, victim: &Arc<Record<K, V>>) -> Option<Arc<Record<K, V>>> {
        let record = self.remove_record(victim.hash(), victim.key(), |r| Arc::ptr_eq(r, victim))?;
        strict_assert!(Arc::ptr_eq(&record, victim));
        self.inner.metrics.evict.increase(1);
        Some(record)
    }

    fn notify(&self, garbages: Garbages<K, V>) {
        // Do not call the listener within the lock section.
        if let Some(listener) = self.inner.event_listener.as_ref() {
            for (event, record) in garbages {
                listener.on_leave(event, record.key(), record.value());
            }
        }
    }
}
