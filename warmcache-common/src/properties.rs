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

use serde::{Deserialize, Serialize};

/// Eviction priority of a cache entry.
///
/// When the store exceeds its size budget, victims are taken from the lowest tier first and chosen at random within
/// a tier. [`Priority::NeverRemove`] entries are never chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Evicted first.
    Low,
    /// The default priority.
    #[default]
    Normal,
    /// Evicted only after all lower tiers are exhausted.
    High,
    /// Never evicted by the size budget. Still subject to idle expiry and explicit removal.
    NeverRemove,
}

impl Priority {
    /// Tiers that may be chosen as size-budget victims, lowest first.
    pub const EVICTABLE: [Priority; 3] = [Priority::Low, Priority::Normal, Priority::High];

    /// Whether the size budget may evict entries of this priority.
    pub fn is_evictable(self) -> bool {
        self != Priority::NeverRemove
    }
}
