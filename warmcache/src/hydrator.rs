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

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use warmcache_common::{
    code::{HashBuilder, Key, Value},
    error::{Error, Result},
    lifecycle::{Lifecycle, StartupPhase, StopReason},
};
use warmcache_memory::Store;

use crate::loader::{KeyFactory, StartupLoader};

/// Status of one startup hydration phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HydrationStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Loading.
    Running,
    /// Loaded and stored `loaded` values.
    Completed {
        /// Count of stored values.
        loaded: usize,
    },
    /// Gave up after `failures` failed attempts.
    Failed {
        /// Count of failed attempts.
        failures: usize,
    },
    /// Interrupted by cache shutdown.
    Cancelled,
}

/// Status of both startup hydration phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hydration {
    /// Status of the blocking phase.
    pub blocking: HydrationStatus,
    /// Status of the background phase.
    pub background: HydrationStatus,
}

impl Hydration {
    /// Status of `phase`.
    pub fn phase(&self, phase: StartupPhase) -> HydrationStatus {
        match phase {
            StartupPhase::Blocking => self.blocking,
            StartupPhase::Background => self.background,
        }
    }

    fn phase_mut(&mut self, phase: StartupPhase) -> &mut HydrationStatus {
        match phase {
            StartupPhase::Blocking => &mut self.blocking,
            StartupPhase::Background => &mut self.background,
        }
    }
}

/// Bulk loads the store at startup, retrying each phase up to the abort threshold.
pub struct Hydrator<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    store: Store<K, V, S>,
    loader: Arc<dyn StartupLoader<V>>,
    key_factory: Arc<dyn KeyFactory<K, V>>,
    lifecycle: Arc<Lifecycle>,
    abort_threshold: Option<usize>,
    retry_delay: Duration,
    status: Arc<Mutex<Hydration>>,
}

impl<K, V, S> Hydrator<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Create a hydrator over `store`.
    pub fn new(
        store: Store<K, V, S>,
        loader: Arc<dyn StartupLoader<V>>,
        key_factory: Arc<dyn KeyFactory<K, V>>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            store,
            loader,
            key_factory,
            lifecycle,
            abort_threshold: None,
            retry_delay: Duration::from_secs(1),
            status: Arc::default(),
        }
    }

    /// Set the attempts per phase before a stop request is raised.
    ///
    /// `None` attempts each phase once and never raises a stop request.
    pub fn with_abort_threshold(mut self, threshold: Option<usize>) -> Self {
        self.abort_threshold = threshold;
        self
    }

    /// Set the delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Current status of both phases.
    pub fn status(&self) -> Hydration {
        *self.status.lock()
    }

    /// Run `phase` to completion.
    ///
    /// Returns the count of stored values, or the error of the last failed attempt.
    pub async fn hydrate(&self, phase: StartupPhase) -> Result<usize> {
        let metrics = self.store.metrics();
        let signal = self.lifecycle.signal();
        let attempts = self.abort_threshold.map(|n| n.max(1)).unwrap_or(1);

        self.set_status(phase, HydrationStatus::Running);
        tracing::debug!("[hydrator]: start {phase} phase, attempts: {attempts}");

        let mut failures = 0;
        loop {
            if failures > 0 {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => return Err(self.cancelled(phase)),
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
            }

            let start = std::time::Instant::now();
            metrics.startup_load.increase(1);

            let load = match phase {
                StartupPhase::Blocking => self.loader.load_blocking(signal.clone()),
                StartupPhase::Background => self.loader.load_background(signal.clone()),
            };
            let res = tokio::select! {
                biased;
                _ = signal.cancelled() => return Err(self.cancelled(phase)),
                res = load => res,
            };
            metrics.startup_load_duration.record(start.elapsed().as_secs_f64());

            let e = match res {
                Ok(values) => {
                    let total = values.len();
                    let loaded = values
                        .into_iter()
                        .filter(|value| self.store.upsert(self.key_factory.key_of(value), value.clone()))
                        .count();
                    self.set_status(phase, HydrationStatus::Completed { loaded });
                    tracing::info!("[hydrator]: {phase} phase stored {loaded} of {total} values");
                    return Ok(loaded);
                }
                Err(e) => e,
            };

            failures += 1;
            metrics.startup_error.increase(1);
            let e = Error::external("startup load failed", e)
                .with_context("phase", phase)
                .with_context("attempt", failures);

            if failures < attempts {
                tracing::warn!("[hydrator]: {phase} phase attempt {failures}/{attempts} failed, retry: {e}");
                continue;
            }

            tracing::error!("[hydrator]: {phase} phase failed after {failures} attempts: {e}");
            self.set_status(phase, HydrationStatus::Failed { failures });
            if self.abort_threshold.is_some() {
                self.lifecycle.request_stop(StopReason::StartupFailed { phase, failures });
            }
            return Err(e);
        }
    }

    fn cancelled(&self, phase: StartupPhase) -> Error {
        tracing::debug!("[hydrator]: {phase} phase cancelled by cache shutdown");
        self.set_status(phase, HydrationStatus::Cancelled);
        Error::cancelled("startup load cancelled by cache shutdown").with_context("phase", phase)
    }

    fn set_status(&self, phase: StartupPhase, status: HydrationStatus) {
        *self.status.lock().phase_mut(phase) = status;
    }
}
