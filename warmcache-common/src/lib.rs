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

//! Shared components and utils for warmcache.

/// Allow enable debug assertions in release profile with feature "strict_assertion".
pub mod assert;
/// The clock abstraction used for entry deadlines.
pub mod clock;
/// Trait bounds for cache keys and values.
pub mod code;
/// Error type and result alias.
pub mod error;
/// Event listener for records leaving the cache.
pub mod event;
/// Cancellation and stop request signals shared by background jobs.
pub mod lifecycle;
/// Metrics abstraction and the shared metrics model.
pub mod metrics;
/// Entry level properties.
pub mod properties;
/// Scoped functional programming extensions.
pub mod scope;
/// Tokio task spawning helpers.
pub mod spawn;
