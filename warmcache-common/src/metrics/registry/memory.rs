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
    borrow::Cow,
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::{
    metrics::{
        BoxedCounter, BoxedCounterVec, BoxedGauge, BoxedGaugeVec, BoxedHistogram, BoxedHistogramVec, Boxer, CounterOps,
        CounterVecOps, GaugeOps, GaugeVecOps, HistogramOps, HistogramVecOps, RegistryOps,
    },
    scope::Scope,
};

type Series = Arc<Mutex<HashMap<String, Arc<AtomicU64>>>>;

fn series_key(name: &str, labels: &[Cow<'static, str>]) -> String {
    let mut key = name.to_string();
    key.push('{');
    for (i, label) in labels.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(label);
    }
    key.push('}');
    key
}

fn slot(series: &Series, key: String) -> Arc<AtomicU64> {
    series.lock().with(|mut map| map.entry(key).or_default().clone())
}

/// A metrics registry that keeps every series in process memory.
///
/// Counters and gauges hold their current value. Histograms hold the number of recorded samples.
///
/// Series are addressed as `name{label1,label2}` with the label values in registration order.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetricsRegistry {
    series: Series,
}

impl MemoryMetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a series, or `None` if it was never touched.
    pub fn get(&self, name: &str, labels: &[&str]) -> Option<u64> {
        let labels = labels.iter().map(|l| Cow::Owned(l.to_string())).collect::<Vec<_>>();
        let key = series_key(name, &labels);
        self.series.lock().get(&key).map(|v| v.load(Ordering::Relaxed))
    }

    /// Current value of a series, `0` if it was never touched.
    pub fn value(&self, name: &str, labels: &[&str]) -> u64 {
        self.get(name, labels).unwrap_or_default()
    }
}

#[derive(Debug)]
struct MemoryVec {
    name: &'static str,
    series: Series,
}

#[derive(Debug)]
struct MemoryMetric {
    value: Arc<AtomicU64>,
}

impl CounterOps for MemoryMetric {
    fn increase(&self, val: u64) {
        self.value.fetch_add(val, Ordering::Relaxed);
    }
}

impl GaugeOps for MemoryMetric {
    fn increase(&self, val: u64) {
        self.value.fetch_add(val, Ordering::Relaxed);
    }

    fn decrease(&self, val: u64) {
        self.value.fetch_sub(val, Ordering::Relaxed);
    }

    fn absolute(&self, val: u64) {
        self.value.store(val, Ordering::Relaxed);
    }
}

impl HistogramOps for MemoryMetric {
    fn record(&self, _: f64) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }
}

impl MemoryVec {
    fn metric(&self, labels: &[Cow<'static, str>]) -> MemoryMetric {
        MemoryMetric {
            value: slot(&self.series, series_key(self.name, labels)),
        }
    }
}

impl CounterVecOps for MemoryVec {
    fn counter(&self, labels: &[Cow<'static, str>]) -> BoxedCounter {
        self.metric(labels).boxed()
    }
}

impl GaugeVecOps for MemoryVec {
    fn gauge(&self, labels: &[Cow<'static, str>]) -> BoxedGauge {
        self.metric(labels).boxed()
    }
}

impl HistogramVecOps for MemoryVec {
    fn histogram(&self, labels: &[Cow<'static, str>]) -> BoxedHistogram {
        self.metric(labels).boxed()
    }
}

impl MemoryMetricsRegistry {
    fn vec(&self, name: &'static str) -> MemoryVec {
        MemoryVec {
            name,
            series: self.series.clone(),
        }
    }
}

impl RegistryOps for MemoryMetricsRegistry {
    fn register_counter_vec(&self, name: &'static str, _: &'static str, _: &'static [&'static str]) -> BoxedCounterVec {
        self.vec(name).boxed()
    }

    fn register_gauge_vec(&self, name: &'static str, _: &'static str, _: &'static [&'static str]) -> BoxedGaugeVec {
        self.vec(name).boxed()
    }

    fn register_histogram_vec(
        &self,
        name: &'static str,
        _: &'static str,
        _: &'static [&'static str],
    ) -> BoxedHistogramVec {
        self.vec(name).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_registry() {
        let registry = MemoryMetricsRegistry::new();

        let cv = registry.register_counter_vec("op_total", "ops", &["name", "op"]);
        cv.counter(&["c".into(), "hit".into()]).increase(2);
        cv.counter(&["c".into(), "hit".into()]).increase(3);
        cv.counter(&["c".into(), "miss".into()]).increase(1);

        let gv = registry.register_gauge_vec("usage", "usage", &["name"]);
        let g = gv.gauge(&["c".into()]);
        g.increase(10);
        g.decrease(4);

        let hv = registry.register_histogram_vec("duration", "duration", &["name"]);
        hv.histogram(&["c".into()]).record(0.5);

        assert_eq!(registry.get("op_total", &["c", "hit"]), Some(5));
        assert_eq!(registry.value("op_total", &["c", "miss"]), 1);
        assert_eq!(registry.get("op_total", &["c", "evict"]), None);
        assert_eq!(registry.value("usage", &["c"]), 6);
        assert_eq!(registry.value("duration", &["c"]), 1);
    }
}
