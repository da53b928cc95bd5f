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

//! Fixtures shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::TimeDelta;
use futures_util::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use warmcache_common::{
    clock::ManualClock,
    lifecycle::CancelSignal,
    metrics::{model::Metrics, registry::noop::NoopMetricsRegistry},
};
use warmcache_memory::{DurationPolicy, Store, StoreConfig};

use crate::loader::{MissLoader, RefreshLoader, StartupLoader};

pub fn refresh_period() -> TimeDelta {
    TimeDelta::minutes(1)
}

pub fn idle_period() -> TimeDelta {
    TimeDelta::minutes(10)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u64,
    pub version: u64,
}

pub fn row(id: u64, version: u64) -> Row {
    Row { id, version }
}

pub fn key_of(row: &Row) -> u64 {
    row.id
}

pub fn store(clock: Arc<ManualClock>) -> Store<u64, Row> {
    Store::new(StoreConfig {
        capacity: usize::MAX,
        shards: 4,
        compaction_fraction: 0.05,
        eviction_scan_interval: Duration::from_secs(60),
        hash_builder: ahash::RandomState::default(),
        policy: Arc::new(DurationPolicy::new(refresh_period(), idle_period())),
        clock,
        event_listener: None,
        metrics: Arc::new(Metrics::new("test", &NoopMetricsRegistry)),
    })
}

#[derive(Debug, Default)]
struct BackingInner {
    rows: Mutex<HashMap<u64, Row>>,
    strays: Mutex<Vec<Row>>,
    calls: Mutex<Vec<Vec<u64>>>,
    failures: AtomicUsize,
    delay: Mutex<Duration>,
}

/// An in-memory backing table that records every load.
#[derive(Debug, Default, Clone)]
pub struct Backing {
    inner: Arc<BackingInner>,
}

impl Backing {
    pub fn with_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        let backing = Self::default();
        for row in rows {
            backing.put(row);
        }
        backing
    }

    pub fn put(&self, row: Row) {
        self.inner.rows.lock().insert(row.id, row);
    }

    /// Rows returned by every load whether requested or not.
    pub fn add_stray(&self, row: Row) {
        self.inner.strays.lock().push(row);
    }

    /// Fail the next `n` loads.
    pub fn fail_next(&self, n: usize) {
        self.inner.failures.store(n, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = delay;
    }

    /// Keys of every load so far, sorted within each load.
    pub fn calls(&self) -> Vec<Vec<u64>> {
        self.inner.calls.lock().clone()
    }

    async fn load(self, mut keys: Vec<u64>) -> anyhow::Result<Vec<Row>> {
        keys.sort();
        self.inner.calls.lock().push(keys.clone());

        let delay = *self.inner.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .inner
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("backing store unavailable");
        }

        let rows = self.inner.rows.lock();
        let mut loaded = keys.iter().filter_map(|k| rows.get(k).cloned()).collect::<Vec<_>>();
        loaded.extend(self.inner.strays.lock().iter().cloned());
        Ok(loaded)
    }
}

impl MissLoader<u64, Row> for Backing {
    fn load_on_miss(&self, keys: Vec<u64>, _: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<Row>>> {
        self.clone().load(keys).boxed()
    }
}

impl RefreshLoader<u64, Row> for Backing {
    fn load_on_refresh(&self, keys: Vec<u64>, _: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<Row>>> {
        self.clone().load(keys).boxed()
    }
}

#[derive(Debug, Default)]
struct PhaseInner {
    rows: Vec<Row>,
    failures: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
}

impl PhaseInner {
    async fn load(&self) -> anyhow::Result<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("bulk source unavailable");
        }
        Ok(self.rows.clone())
    }
}

/// A startup loader with fixed rows per phase.
#[derive(Debug, Default, Clone)]
pub struct Bulk {
    blocking: Arc<PhaseInner>,
    background: Arc<PhaseInner>,
}

impl Bulk {
    pub fn new(blocking: Vec<Row>, background: Vec<Row>) -> Self {
        Self {
            blocking: Arc::new(PhaseInner {
                rows: blocking,
                ..Default::default()
            }),
            background: Arc::new(PhaseInner {
                rows: background,
                ..Default::default()
            }),
        }
    }

    /// Fail the first `n` blocking loads.
    pub fn with_blocking_failures(self, n: usize) -> Self {
        self.blocking.failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail the first `n` background loads.
    pub fn with_background_failures(self, n: usize) -> Self {
        self.background.failures.store(n, Ordering::SeqCst);
        self
    }

    /// Delay every background load.
    pub fn with_background_delay(self, delay: Duration) -> Self {
        Self {
            blocking: self.blocking,
            background: Arc::new(PhaseInner {
                rows: self.background.rows.clone(),
                failures: AtomicUsize::new(self.background.failures.load(Ordering::SeqCst)),
                calls: AtomicUsize::new(0),
                delay,
            }),
        }
    }

    pub fn blocking_calls(&self) -> usize {
        self.blocking.calls.load(Ordering::SeqCst)
    }

    pub fn background_calls(&self) -> usize {
        self.background.calls.load(Ordering::SeqCst)
    }
}

impl StartupLoader<Row> for Bulk {
    fn load_blocking(&self, _: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<Row>>> {
        self.blocking.load().boxed()
    }

    fn load_background(&self, _: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<Row>>> {
        self.background.load().boxed()
    }
}
