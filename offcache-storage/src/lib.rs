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

//! Segmented off-heap storage for offcache.
//!
//! A [`store::Store`] owns a pool of manually allocated [`segment::Segment`]s and hands out [`pointer::Pointer`]s to
//! contiguous byte ranges. A [`indexer::PointerMap`] maps keys to their pointers.

/// Key to pointer map.
pub mod indexer;
/// Handle of a byte range.
pub mod pointer;
/// Fixed-capacity byte region with a free-range list.
pub mod segment;
/// Store counters.
pub mod statistics;
/// The segment pool.
pub mod store;

pub use indexer::PointerMap;
pub use pointer::Pointer;
pub use segment::{Segment, SegmentId};
pub use statistics::Statistics;
pub use store::{Store, StoreBuilder, StoreConfig};
