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

#[cfg(feature = "serde")]
pub use crate::common::code::BincodeSerializer;
pub use crate::{
    common::{
        cache::{Cache, CacheLoader},
        code::{RawSerializer, Serializer},
        error::{Error, ErrorKind, Result},
        event::EvictionListener,
    },
    memory::{EvictionConfig, HeapCache, HeapCacheBuilder},
    offheap::{CacheStatistics, CompactionConfig, CompactionReport, OffHeapCache, OffHeapCacheBuilder},
    pipeline::{
        CacheTask, DrainStrategy, PipelineBuilder, PipelineConfig, PipelineStatistics, QueuingEvictionListener,
        RetryPolicy, TaskSaver,
    },
    registry::CacheRegistry,
    storage::{StoreConfig, Statistics as StoreStatistics},
    versioned::{VersionedCache, VersionedItem, VersionedSerializer},
};
