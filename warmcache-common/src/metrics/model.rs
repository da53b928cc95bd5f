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

use std::borrow::Cow;

use super::{BoxedCounter, BoxedGauge, BoxedHistogram, RegistryOps};

/// Metrics of a warmcache instance.
///
/// Registered series:
///
/// - `warmcache_op_total{name, op}`: operation counters;
/// - `warmcache_usage{name}`: total weight of resident entries;
/// - `warmcache_load_duration{name, op}`: loader call latency in seconds.
#[derive(Debug)]
pub struct Metrics {
    /* store metrics */
    /// Lookups served from the store.
    pub hit: BoxedCounter,
    /// Lookups not found in the store.
    pub miss: BoxedCounter,
    /// Fresh inserts.
    pub insert: BoxedCounter,
    /// Wholesale replacements.
    pub replace: BoxedCounter,
    /// Explicit removals.
    pub remove: BoxedCounter,
    /// Idle expirations.
    pub expire: BoxedCounter,
    /// Size-budget evictions.
    pub evict: BoxedCounter,
    /// Writes rejected by the size budget.
    pub reject: BoxedCounter,

    /// Total weight of resident entries.
    pub usage: BoxedGauge,

    /* loader metrics */
    /// Miss loader calls.
    pub miss_load: BoxedCounter,
    /// Values returned by the miss loader for keys that were not requested.
    pub miss_load_discard: BoxedCounter,
    /// Failed miss loader calls.
    pub miss_load_error: BoxedCounter,
    /// Refresh runs.
    pub refresh: BoxedCounter,
    /// Entries replaced by refresh.
    pub refresh_entry: BoxedCounter,
    /// Failed refresh runs.
    pub refresh_error: BoxedCounter,
    /// Startup loader calls.
    pub startup_load: BoxedCounter,
    /// Failed startup loader calls.
    pub startup_error: BoxedCounter,

    /// Miss loader latency.
    pub miss_load_duration: BoxedHistogram,
    /// Refresh loader latency.
    pub refresh_duration: BoxedHistogram,
    /// Startup loader latency.
    pub startup_load_duration: BoxedHistogram,
}

impl Metrics {
    /// Create a new metric with the given name.
    pub fn new<R>(name: impl Into<Cow<'static, str>>, registry: &R) -> Self
    where
        R: RegistryOps + ?Sized,
    {
        let name = name.into();

        let warmcache_op_total =
            registry.register_counter_vec("warmcache_op_total", "warmcache operations", &["name", "op"]);
        let warmcache_usage = registry.register_gauge_vec("warmcache_usage", "warmcache resident weight", &["name"]);
        let warmcache_load_duration = registry.register_histogram_vec(
            "warmcache_load_duration",
            "warmcache loader call durations",
            &["name", "op"],
        );

        let counter = |op: &'static str| warmcache_op_total.counter(&[name.clone(), op.into()]);
        let histogram = |op: &'static str| warmcache_load_duration.histogram(&[name.clone(), op.into()]);

        Self {
            hit: counter("hit"),
            miss: counter("miss"),
            insert: counter("insert"),
            replace: counter("replace"),
            remove: counter("remove"),
            expire: counter("expire"),
            evict: counter("evict"),
            reject: counter("reject"),

            usage: warmcache_usage.gauge(&[name.clone()]),

            miss_load: counter("miss_load"),
            miss_load_discard: counter("miss_load_discard"),
            miss_load_error: counter("miss_load_error"),
            refresh: counter("refresh"),
            refresh_entry: counter("refresh_entry"),
            refresh_error: counter("refresh_error"),
            startup_load: counter("startup_load"),
            startup_error: counter("startup_error"),

            miss_load_duration: histogram("miss_load"),
            refresh_duration: histogram("refresh"),
            startup_load_duration: histogram("startup_load"),
        }
    }

    /// Create metrics that record nothing.
    pub fn noop() -> Self {
        Self::new("noop", &super::registry::noop::NoopMetricsRegistry)
    }
}
