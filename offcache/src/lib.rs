// Copyright 2026 offcache Project Authors
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

//! offcache is an embeddable key-value cache that keeps serialized values outside the heap, in manually allocated
//! byte segments.
//!
//! - [`OffHeapCache`] stores values in a segmented [`Store`](offcache_storage::Store) and compacts fragmented
//!   segments in the background.
//! - [`HeapCache`](offcache_memory::HeapCache) keeps values in the heap behind the same [`Cache`] capability.
//! - [`VersionedCache`] adds optimistic concurrency on top of any cache of [`VersionedItem`]s.
//! - [`QueuingEvictionListener`] saves evicted entries in batches on background workers.
//!
//! ```
//! use offcache::prelude::*;
//!
//! let cache: OffHeapCache<u64, String> = OffHeapCache::builder("users")
//!     .with_capacity(1000)
//!     .with_segments(4, 64 * 1024)
//!     .with_serializer(RawSerializer)
//!     .build()
//!     .unwrap();
//!
//! cache.put(1, "alice".to_string()).unwrap();
//! assert_eq!(cache.get(&1).unwrap(), Some("alice".to_string()));
//! ```

pub use offcache_common as common;
pub use offcache_memory as memory;
pub use offcache_storage as storage;

/// Off-heap cache, its builder and the compactor.
pub mod offheap;
/// Batched eviction side effects.
pub mod pipeline;
/// Commonly used types.
pub mod prelude;
/// Named cache registry.
pub mod registry;
/// Optimistic concurrency decorator.
pub mod versioned;

pub use offcache_common::cache::Cache;
pub use offheap::OffHeapCache;
pub use pipeline::QueuingEvictionListener;
pub use versioned::{VersionedCache, VersionedItem};
