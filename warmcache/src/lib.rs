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

//! A self-refreshing in-memory cache.
//!
//! [`WarmCache`] serves values from memory, loads missed keys from the backing source in one batch per request,
//! and keeps resident entries fresh with a periodic refresh job. Entries not read within their idle period are
//! removed, and the size budget is enforced by priority-aware eviction. At startup the cache is bulk loaded in a
//! blocking phase and a background phase.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use chrono::TimeDelta;
//! use warmcache::{CacheOptions, CancelSignal, DurationPolicy, WarmCacheBuilder};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let load = |keys: Vec<u64>, _: CancelSignal| async move {
//!     anyhow::Ok(keys.into_iter().map(|k| (k, format!("value-{k}"))).collect::<Vec<_>>())
//! };
//!
//! let cache = WarmCacheBuilder::new(CacheOptions::default().with_refresh_interval(Duration::from_secs(30)))
//!     .with_miss_loader(load)
//!     .with_refresh_loader(load)
//!     .with_key_factory(|(k, _): &(u64, String)| *k)
//!     .with_entry_policy(DurationPolicy::new(TimeDelta::minutes(1), TimeDelta::minutes(10)))
//!     .build()
//!     .await?;
//!
//! assert_eq!(cache.get(&42).await?, Some((42, "value-42".to_string())));
//! cache.close().await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod handler;
mod hydrator;
mod loader;
mod options;
mod refresher;

#[cfg(test)]
mod test_utils;

mod prelude;
pub use prelude::*;
