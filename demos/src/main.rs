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

//! A product price cache over a slow in-process "database".

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::TimeDelta;
use futures_util::{future::BoxFuture, FutureExt};
use parking_lot::RwLock;
use warmcache::{
    CacheOptions, CancelSignal, DurationPolicy, Event, EventListener, MemoryMetricsRegistry, Priority, StartupLoader,
    WarmCacheBuilder,
};

#[derive(Debug, Clone)]
struct Price {
    sku: u64,
    cents: u64,
}

#[derive(Debug, Clone, Default)]
struct Database {
    prices: Arc<RwLock<HashMap<u64, u64>>>,
}

impl Database {
    async fn query(&self, skus: Vec<u64>) -> anyhow::Result<Vec<Price>> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let prices = self.prices.read();
        Ok(skus
            .into_iter()
            .filter_map(|sku| prices.get(&sku).map(|&cents| Price { sku, cents }))
            .collect())
    }

    async fn scan(&self, range: std::ops::Range<u64>) -> anyhow::Result<Vec<Price>> {
        self.query(range.collect()).await
    }
}

impl StartupLoader<Price> for Database {
    fn load_blocking(&self, _: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<Price>>> {
        self.scan(0..10).boxed()
    }

    fn load_background(&self, _: CancelSignal) -> BoxFuture<'_, anyhow::Result<Vec<Price>>> {
        self.scan(10..100).boxed()
    }
}

struct Echo;

impl EventListener for Echo {
    type Key = u64;
    type Value = Price;

    fn on_leave(&self, event: Event, key: &u64, value: &Price) {
        tracing::info!("entry left the cache: {event:?}, sku: {key}, cents: {}", value.cents);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::{prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_line_number(true))
        .with(EnvFilter::from_default_env())
        .init();

    let db = Database::default();
    db.prices.write().extend((0..200).map(|sku| (sku, 1_000 + sku)));

    let registry = MemoryMetricsRegistry::new();
    let miss = {
        let db = db.clone();
        move |skus: Vec<u64>, _: CancelSignal| {
            let db = db.clone();
            async move { db.query(skus).await }
        }
    };
    let refresh = miss.clone();

    let cache = WarmCacheBuilder::new(
        CacheOptions::default()
            .with_name("prices")
            .with_refresh_interval(Duration::from_secs(1))
            .with_size_limit(150)
            .with_compaction_fraction(0.1)
            .with_refresh_abort_threshold(Some(5)),
    )
    .with_miss_loader(miss)
    .with_refresh_loader(refresh)
    .with_startup_loader(db.clone())
    .with_key_factory(|price: &Price| price.sku)
    .with_entry_policy(
        DurationPolicy::new(TimeDelta::seconds(2), TimeDelta::seconds(30)).with_priority(Priority::Normal),
    )
    .with_event_listener(Arc::new(Echo))
    .with_metrics_registry(registry.clone())
    .build()
    .await?;

    let prices = cache.get_many([1, 2, 150, 151, 999]).await?;
    tracing::info!("resolved {} prices: {prices:?}", prices.len());

    // Reprice a few skus; the refresh job picks the change up.
    db.prices.write().extend([(1, 42), (2, 43)]);

    tokio::select! {
        reason = cache.stop_requested() => tracing::error!("cache asked to stop: {reason}"),
        _ = tokio::time::sleep(Duration::from_secs(4)) => {}
    }

    tracing::info!("price of sku 1 is now {:?}", cache.peek(&1u64).map(|p| p.cents));
    tracing::info!(
        "entries: {}, hits: {}, misses: {}, refreshed: {}, evicted: {}",
        cache.store().len(),
        registry.value("warmcache_op_total", &["prices", "hit"]),
        registry.value("warmcache_op_total", &["prices", "miss"]),
        registry.value("warmcache_op_total", &["prices", "refresh_entry"]),
        registry.value("warmcache_op_total", &["prices", "evict"]),
    );

    cache.close().await?;
    Ok(())
}
