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

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use warmcache_common::properties::Priority;

/// A resident cache entry together with its scheduling deadlines.
///
/// The value and its tracking live in one record, so a key is tracked exactly while it is resident. A replacement
/// creates a new record. Only `remove_after` changes in place, on reads.
#[derive(Debug)]
pub struct Record<K, V> {
    key: K,
    value: V,
    hash: u64,
    priority: Priority,
    weight: usize,
    refresh_after: DateTime<Utc>,
    /// Microseconds since the unix epoch.
    remove_after: AtomicI64,
}

impl<K, V> Record<K, V> {
    pub(crate) fn new(
        key: K,
        value: V,
        hash: u64,
        priority: Priority,
        weight: usize,
        refresh_after: DateTime<Utc>,
        remove_after: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            value,
            hash,
            priority,
            weight,
            refresh_after,
            remove_after: AtomicI64::new(remove_after.timestamp_micros()),
        }
    }

    /// Get the record key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Get the record value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Get the record hash.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Get the record eviction priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Get the record weight.
    pub fn weight(&self) -> usize {
        self.weight
    }

    /// Time after which the record is a refresh candidate.
    pub fn refresh_after(&self) -> DateTime<Utc> {
        self.refresh_after
    }

    /// Time after which, absent further reads, the record is an expiry candidate.
    pub fn remove_after(&self) -> DateTime<Utc> {
        from_micros(self.remove_after.load(Ordering::Acquire))
    }

    pub(crate) fn set_remove_after(&self, remove_after: DateTime<Utc>) {
        self.remove_after
            .store(remove_after.timestamp_micros(), Ordering::Release);
    }
}

fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A point-in-time copy of the deadlines of a resident key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracking<K> {
    /// The resident key.
    pub key: K,
    /// Time after which the entry is a refresh candidate.
    pub refresh_after: DateTime<Utc>,
    /// Time after which, absent further reads, the entry is an expiry candidate.
    pub remove_after: DateTime<Utc>,
}

impl<K, V> From<&Record<K, V>> for Tracking<K>
where
    K: Clone,
{
    fn from(record: &Record<K, V>) -> Self {
        Self {
            key: record.key.clone(),
            refresh_after: record.refresh_after,
            remove_after: record.remove_after(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_remove_after_round_trips_micros() {
        let t0 = DateTime::from_timestamp(1_700_000_000, 123_456_000).unwrap();
        let record = Record::new(1u64, "v", 0, Priority::Normal, 1, t0, t0);
        assert_eq!(record.remove_after(), t0);

        record.set_remove_after(t0 + TimeDelta::minutes(5));
        assert_eq!(record.remove_after(), t0 + TimeDelta::minutes(5));
        assert_eq!(record.refresh_after(), t0);

        let tracking = Tracking::from(&record);
        assert_eq!(tracking.key, 1);
        assert_eq!(tracking.remove_after, t0 + TimeDelta::minutes(5));
    }
}
