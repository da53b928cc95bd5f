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

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warmcache_common::error::{Error, Result};

/// Options of a warmcache, immutable once the cache is built.
///
/// Every field has a default, so partial documents deserialize:
///
/// ```rust
/// # use warmcache::CacheOptions;
/// let options: CacheOptions = serde_json::from_str(r#"{ "size_limit": 1024 }"#).unwrap();
/// assert_eq!(options.size_limit, 1024);
/// assert_eq!(options.refresh_abort_threshold, None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Name of the cache, used as the metrics label.
    pub name: String,
    /// Delay between the end of a refresh run and the start of the next.
    pub refresh_interval: Duration,
    /// Size budget, in the unit of the entry policy weights.
    pub size_limit: usize,
    /// Fraction of the size limit to free below the limit when it is exceeded.
    pub compaction_fraction: f64,
    /// Minimum interval between full eviction scans after a scan could not reach its target.
    pub eviction_scan_interval: Duration,
    /// Count of store shards.
    pub shards: usize,
    /// Attempts of each startup hydration phase before the host is asked to stop.
    ///
    /// `None` attempts each phase once and never asks the host to stop.
    pub startup_abort_threshold: Option<usize>,
    /// Consecutive failed refresh runs before the host is asked to stop.
    ///
    /// `None` never asks the host to stop.
    pub refresh_abort_threshold: Option<usize>,
    /// Delay between startup hydration attempts.
    pub startup_retry_delay: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            name: "warmcache".to_string(),
            refresh_interval: Duration::from_secs(60),
            size_limit: usize::MAX,
            compaction_fraction: 0.05,
            eviction_scan_interval: Duration::from_secs(60),
            shards: 8,
            startup_abort_threshold: None,
            refresh_abort_threshold: None,
            startup_retry_delay: Duration::from_secs(1),
        }
    }
}

impl CacheOptions {
    /// Set the cache name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the refresh interval.
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Set the size limit.
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Set the compaction fraction.
    pub fn with_compaction_fraction(mut self, compaction_fraction: f64) -> Self {
        self.compaction_fraction = compaction_fraction;
        self
    }

    /// Set the eviction scan interval.
    pub fn with_eviction_scan_interval(mut self, eviction_scan_interval: Duration) -> Self {
        self.eviction_scan_interval = eviction_scan_interval;
        self
    }

    /// Set the count of store shards.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the startup abort threshold.
    pub fn with_startup_abort_threshold(mut self, threshold: Option<usize>) -> Self {
        self.startup_abort_threshold = threshold;
        self
    }

    /// Set the refresh abort threshold.
    pub fn with_refresh_abort_threshold(mut self, threshold: Option<usize>) -> Self {
        self.refresh_abort_threshold = threshold;
        self
    }

    /// Set the delay between startup hydration attempts.
    pub fn with_startup_retry_delay(mut self, delay: Duration) -> Self {
        self.startup_retry_delay = delay;
        self
    }

    /// Check the options, failing with [`ErrorKind::Config`](warmcache_common::error::ErrorKind::Config).
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval.is_zero() {
            return Err(Error::config("refresh interval must be greater than zero"));
        }
        if self.eviction_scan_interval.is_zero() {
            return Err(Error::config("eviction scan interval must be greater than zero"));
        }
        if self.size_limit == 0 {
            return Err(Error::config("size limit must be greater than zero"));
        }
        if !(self.compaction_fraction > 0.0 && self.compaction_fraction <= 1.0) {
            return Err(Error::config("compaction fraction must be within (0, 1]")
                .with_context("compaction_fraction", self.compaction_fraction));
        }
        if self.shards == 0 {
            return Err(Error::config("shards must be greater than zero"));
        }
        Ok(())
    }
}
