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

pub use warmcache_common::{
    clock::{Clock, ManualClock, SystemClock},
    code::{HashBuilder, Key, Value},
    error::{Error, ErrorKind, Result},
    event::{Event, EventListener},
    lifecycle::{CancelSignal, Lifecycle, StartupPhase, StopReason},
    metrics::{
        registry::{memory::MemoryMetricsRegistry, noop::NoopMetricsRegistry},
        RegistryOps,
    },
    properties::Priority,
    spawn::Spawner,
};
#[cfg(feature = "prometheus")]
pub use warmcache_common::metrics::registry::prometheus::PrometheusMetricsRegistry;
pub use warmcache_memory::{DurationPolicy, EntryPolicy, Store, Tracking, Weighter};

pub use crate::{
    cache::{WarmCache, WarmCacheBuilder},
    handler::RequestHandler,
    hydrator::{Hydration, HydrationStatus, Hydrator},
    loader::{KeyFactory, MissLoader, NoopStartupLoader, RefreshLoader, StartupLoader},
    options::CacheOptions,
    refresher::{RefreshReport, Refresher},
};
