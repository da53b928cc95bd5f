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

use std::{fmt::Debug, hash::BuildHasher};

/// Key trait for the cache.
///
/// Keys are cloned into tracking snapshots and loader batches, so cheap clones are preferred.
pub trait Key: Send + Sync + 'static + std::hash::Hash + Eq + Clone + Debug {}
impl<T: Send + Sync + 'static + std::hash::Hash + Eq + Clone + Debug> Key for T {}

/// Value trait for the cache.
///
/// Lookups return clones of the resident value. Wrap large values in an `Arc`.
pub trait Value: Send + Sync + 'static + Clone {}
impl<T: Send + Sync + 'static + Clone> Value for T {}

/// Hash builder trait.
pub trait HashBuilder: BuildHasher + Send + Sync + 'static {}
impl<T> HashBuilder for T where T: BuildHasher + Send + Sync + 'static {}
