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

//! The in-memory store of warmcache.
//!
//! The store keeps one record per resident key holding the value together with its refresh and idle deadlines,
//! and bounds the total weight of resident records with priority-aware random compaction.

mod policy;
mod record;
mod store;

mod prelude;
pub use prelude::*;
