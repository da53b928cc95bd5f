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

use std::{sync::Arc, time::Duration};

use itertools::Itertools;
use warmcache_common::{
    code::{HashBuilder, Key, Value},
    error::{Error, ErrorKind, Result},
    lifecycle::{Lifecycle, StopReason},
};
use warmcache_memory::Store;

use crate::loader::{KeyFactory, RefreshLoader};

/// Outcome of a successful refresh run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Entries removed because their idle deadline passed.
    pub expired: usize,
    /// Resident keys whose refresh deadline passed.
    pub candidates: usize,
    /// Entries replaced with a fresh value.
    pub refreshed: usize,
}

/// Periodically expires idle entries and reloads stale ones.
pub struct Refresher<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    store: Store<K, V, S>,
    loader: Arc<dyn RefreshLoader<K, V>>,
    key_factory: Arc<dyn KeyFactory<K, V>>,
    lifecycle: Arc<Lifecycle>,
    interval: Duration,
    abort_threshold: Option<usize>,
}

impl<K, V, S> Refresher<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Create a refresher over `store`.
    pub fn new(
        store: Store<K, V, S>,
        loader: Arc<dyn RefreshLoader<K, V>>,
        key_factory: Arc<dyn KeyFactory<K, V>>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            store,
            loader,
            key_factory,
            lifecycle,
            interval: Duration::from_secs(60),
            abort_threshold: None,
        }
    }

    /// Set the delay between the end of a run and the start of the next.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the count of consecutive failed runs that raises a stop request.
    pub fn with_abort_threshold(mut self, threshold: Option<usize>) -> Self {
        self.abort_threshold = threshold;
        self
    }

    /// Run until the lifecycle is cancelled.
    ///
    /// A failed run is logged and counted. Once the consecutive failures reach the abort threshold a stop request
    /// is raised, and the loop keeps running.
    pub async fn run(self) {
        let signal = self.lifecycle.signal();
        let mut failures = 0usize;

        tracing::debug!("[refresher]: start, interval: {:?}", self.interval);

        loop {
            match self.run_once().await {
                Ok(report) => {
                    if failures > 0 {
                        tracing::info!("[refresher]: recovered after {failures} failed runs");
                    }
                    failures = 0;
                    tracing::trace!("[refresher]: run finished: {report:?}");
                }
                Err(e) if e.kind() == ErrorKind::TaskCancelled => break,
                Err(e) => {
                    failures += 1;
                    tracing::error!("[refresher]: run failed, consecutive failures: {failures}, error: {e}");
                    if let Some(threshold) = self.abort_threshold {
                        if failures >= threshold.max(1) {
                            self.lifecycle.request_stop(StopReason::RefreshFailed { failures });
                        }
                    }
                }
            }

            tokio::select! {
                biased;
                _ = signal.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::debug!("[refresher]: exit");
    }

    /// Expire idle entries, then reload the entries whose refresh deadline passed with one loader call.
    pub async fn run_once(&self) -> Result<RefreshReport> {
        let metrics = self.store.metrics();
        let mut report = RefreshReport::default();

        let now = self.store.now();
        let idle = self
            .store
            .snapshot()
            .into_iter()
            .filter(|tracking| tracking.remove_after <= now)
            .map(|tracking| tracking.key)
            .collect_vec();
        if !idle.is_empty() {
            report.expired = self.store.expire(idle.iter(), now);
            tracing::debug!("[refresher]: expired {} of {} idle entries", report.expired, idle.len());
        }

        let now = self.store.now();
        let stale = self
            .store
            .snapshot()
            .into_iter()
            .filter(|tracking| tracking.refresh_after <= now)
            .map(|tracking| tracking.key)
            .collect_vec();
        report.candidates = stale.len();
        if stale.is_empty() {
            return Ok(report);
        }

        let signal = self.lifecycle.signal();
        let start = std::time::Instant::now();
        metrics.refresh.increase(1);

        let res = tokio::select! {
            biased;
            _ = signal.cancelled() => {
                return Err(Error::cancelled("refresh cancelled by cache shutdown").with_context("keys", report.candidates));
            }
            res = self.loader.load_on_refresh(stale, signal.clone()) => res,
        };
        metrics.refresh_duration.record(start.elapsed().as_secs_f64());

        let values = res.map_err(|e| {
            metrics.refresh_error.increase(1);
            Error::external("refresh load failed", e).with_context("keys", report.candidates)
        })?;

        for value in values {
            let key = self.key_factory.key_of(&value);
            if self.store.replace(key, value) {
                report.refreshed += 1;
            }
        }
        metrics.refresh_entry.increase(report.refreshed as _);

        tracing::debug!(
            "[refresher]: refreshed {} of {} stale entries",
            report.refreshed,
            report.candidates
        );

        Ok(report)
    }
}
