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

use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use warmcache_common::properties::Priority;

/// The weighter for the store.
///
/// The weighter is used to calculate the weight of the cache entry against the size budget.
pub trait Weighter<K, V>: Fn(&K, &V) -> usize + Send + Sync + 'static {}
impl<K, V, T> Weighter<K, V> for T where T: Fn(&K, &V) -> usize + Send + Sync + 'static {}

/// Per-entry scheduling and eviction policy.
///
/// The store consults the policy on every write, and on every hit for the sliding expiration.
pub trait EntryPolicy<K, V>: Send + Sync + 'static {
    /// Time after which the entry becomes a refresh candidate. Called on insert and replace.
    fn refresh_after(&self, key: &K, value: &V, now: DateTime<Utc>) -> DateTime<Utc>;

    /// Time after which, absent further reads, the entry expires. Called on fresh insert and on every hit.
    fn sliding_expiration(&self, key: &K, value: &V, now: DateTime<Utc>) -> DateTime<Utc>;

    /// Eviction priority.
    fn priority(&self, key: &K, value: &V) -> Priority;

    /// Weight against the size budget.
    fn weight(&self, key: &K, value: &V) -> usize;
}

/// An [`EntryPolicy`] with fixed refresh and idle durations, a fixed priority and a pluggable weighter.
pub struct DurationPolicy<K, V> {
    refresh: TimeDelta,
    idle: TimeDelta,
    priority: Priority,
    weighter: Arc<dyn Weighter<K, V>>,
}

impl<K, V> Debug for DurationPolicy<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationPolicy")
            .field("refresh", &self.refresh)
            .field("idle", &self.idle)
            .field("priority", &self.priority)
            .finish()
    }
}

impl<K, V> DurationPolicy<K, V>
where
    K: 'static,
    V: 'static,
{
    /// Refresh entries `refresh` after they are written and expire them after `idle` without reads.
    ///
    /// Every entry weighs `1` and has [`Priority::Normal`] until configured otherwise.
    pub fn new(refresh: TimeDelta, idle: TimeDelta) -> Self {
        Self {
            refresh,
            idle,
            priority: Priority::Normal,
            weighter: Arc::new(|_: &K, _: &V| 1),
        }
    }

    /// Set the priority of every entry.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the weighter.
    pub fn with_weighter(mut self, weighter: impl Weighter<K, V>) -> Self {
        self.weighter = Arc::new(weighter);
        self
    }
}

fn saturating_add(now: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl<K, V> EntryPolicy<K, V> for DurationPolicy<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn refresh_after(&self, _: &K, _: &V, now: DateTime<Utc>) -> DateTime<Utc> {
        saturating_add(now, self.refresh)
    }

    fn sliding_expiration(&self, _: &K, _: &V, now: DateTime<Utc>) -> DateTime<Utc> {
        saturating_add(now, self.idle)
    }

    fn priority(&self, _: &K, _: &V) -> Priority {
        self.priority
    }

    fn weight(&self, key: &K, value: &V) -> usize {
        (self.weighter)(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_policy() {
        let policy = DurationPolicy::<u64, String>::new(TimeDelta::minutes(1), TimeDelta::hours(1))
            .with_priority(Priority::High)
            .with_weighter(|_: &u64, v: &String| v.len());
        let now = DateTime::UNIX_EPOCH;
        let v = "hello".to_string();

        assert_eq!(policy.refresh_after(&1, &v, now), now + TimeDelta::minutes(1));
        assert_eq!(policy.sliding_expiration(&1, &v, now), now + TimeDelta::hours(1));
        assert_eq!(policy.priority(&1, &v), Priority::High);
        assert_eq!(policy.weight(&1, &v), 5);
    }

    #[test]
    fn test_duration_policy_saturates() {
        let policy = DurationPolicy::<u64, u64>::new(TimeDelta::days(36_500_000), TimeDelta::days(36_500_000));
        let now = DateTime::<Utc>::MAX_UTC - TimeDelta::days(1);
        assert_eq!(policy.refresh_after(&1, &1, now), DateTime::<Utc>::MAX_UTC);
    }
}
