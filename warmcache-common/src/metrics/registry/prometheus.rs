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

use std::{borrow::Cow, collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

use crate::{
    metrics::{
        registry::noop::NoopMetricsRegistry, BoxedCounter, BoxedCounterVec, BoxedGauge, BoxedGaugeVec, BoxedHistogram,
        BoxedHistogramVec, Boxer, CounterOps, CounterVecOps, GaugeOps, GaugeVecOps, HistogramOps, HistogramVecOps,
        RegistryOps,
    },
    scope::Scope,
};

#[derive(Debug, Clone)]
enum MetricVec {
    Counter(IntCounterVec),
    Gauge(IntGaugeVec),
    Histogram(HistogramVec),
}

fn label_values(labels: &[Cow<'static, str>]) -> Vec<&str> {
    labels.iter().map(Cow::as_ref).collect()
}

impl CounterOps for IntCounter {
    fn increase(&self, val: u64) {
        self.inc_by(val);
    }
}

impl CounterVecOps for IntCounterVec {
    fn counter(&self, labels: &[Cow<'static, str>]) -> BoxedCounter {
        self.with_label_values(&label_values(labels)).boxed()
    }
}

impl GaugeOps for IntGauge {
    fn increase(&self, val: u64) {
        self.add(val as _);
    }

    fn decrease(&self, val: u64) {
        self.sub(val as _);
    }

    fn absolute(&self, val: u64) {
        self.set(val as _);
    }
}

impl GaugeVecOps for IntGaugeVec {
    fn gauge(&self, labels: &[Cow<'static, str>]) -> BoxedGauge {
        self.with_label_values(&label_values(labels)).boxed()
    }
}

impl HistogramOps for Histogram {
    fn record(&self, val: f64) {
        self.observe(val);
    }
}

impl HistogramVecOps for HistogramVec {
    fn histogram(&self, labels: &[Cow<'static, str>]) -> BoxedHistogram {
        self.with_label_values(&label_values(labels)).boxed()
    }
}

/// Metrics registry backed by lib `prometheus`.
///
/// Clones share their metric vectors, so several caches can report into one registry, told apart by their `name`
/// label. Wrapping the same [`Registry`] in two separately created instances makes the second registration of each
/// metric fail; those metrics are then logged and dropped.
#[derive(Debug, Clone)]
pub struct PrometheusMetricsRegistry {
    registry: Registry,
    vecs: Arc<Mutex<HashMap<&'static str, MetricVec>>>,
}

impl PrometheusMetricsRegistry {
    /// Report into `registry`.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            vecs: Arc::default(),
        }
    }

    /// The wrapped registry, to gather from.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn get_or_register<F>(&self, name: &'static str, create: F) -> Option<MetricVec>
    where
        F: FnOnce() -> prometheus::Result<MetricVec>,
    {
        self.vecs.lock().with(|mut vecs| {
            if let Some(vec) = vecs.get(name) {
                return Some(vec.clone());
            }
            let vec = create().and_then(|vec| {
                let collector: Box<dyn prometheus::core::Collector> = match &vec {
                    MetricVec::Counter(v) => Box::new(v.clone()),
                    MetricVec::Gauge(v) => Box::new(v.clone()),
                    MetricVec::Histogram(v) => Box::new(v.clone()),
                };
                self.registry.register(collector).map(|_| vec)
            });
            match vec {
                Ok(vec) => {
                    vecs.insert(name, vec.clone());
                    Some(vec)
                }
                Err(e) => {
                    tracing::warn!("[metrics]: drop metric {name}, prometheus registration failed: {e}");
                    None
                }
            }
        })
    }
}

impl RegistryOps for PrometheusMetricsRegistry {
    fn register_counter_vec(
        &self,
        name: &'static str,
        desc: &'static str,
        label_names: &'static [&'static str],
    ) -> BoxedCounterVec {
        match self.get_or_register(name, || IntCounterVec::new(Opts::new(name, desc), label_names).map(MetricVec::Counter)) {
            Some(MetricVec::Counter(v)) => v.boxed(),
            _ => NoopMetricsRegistry.register_counter_vec(name, desc, label_names),
        }
    }

    fn register_gauge_vec(
        &self,
        name: &'static str,
        desc: &'static str,
        label_names: &'static [&'static str],
    ) -> BoxedGaugeVec {
        match self.get_or_register(name, || IntGaugeVec::new(Opts::new(name, desc), label_names).map(MetricVec::Gauge)) {
            Some(MetricVec::Gauge(v)) => v.boxed(),
            _ => NoopMetricsRegistry.register_gauge_vec(name, desc, label_names),
        }
    }

    fn register_histogram_vec(
        &self,
        name: &'static str,
        desc: &'static str,
        label_names: &'static [&'static str],
    ) -> BoxedHistogramVec {
        match self.get_or_register(name, || {
            HistogramVec::new(HistogramOpts::new(name, desc), label_names).map(MetricVec::Histogram)
        }) {
            Some(MetricVec::Histogram(v)) => v.boxed(),
            _ => NoopMetricsRegistry.register_histogram_vec(name, desc, label_names),
        }
    }
}
