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

//! [`Statistics`] are updated on every store operation and are accurate at any time, unlike sampled metrics.
//!
//! The compactor and the cache read them to sense the status of the store.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters of a [`crate::store::Store`].
#[derive(Debug, Default)]
pub struct Statistics {
    pub(crate) acquires: AtomicU64,
    pub(crate) frees: AtomicU64,
    pub(crate) acquire_failures: AtomicU64,
    pub(crate) relocations: AtomicU64,
    pub(crate) consistency_violations: AtomicU64,
    /// Bytes held by live pointers.
    pub(crate) used_bytes: AtomicUsize,
}

impl Statistics {
    /// Successful acquires.
    pub fn acquires(&self) -> u64 {
        self.acquires.load(Ordering::Relaxed)
    }

    /// Successful frees.
    pub fn frees(&self) -> u64 {
        self.frees.load(Ordering::Relaxed)
    }

    /// Acquires rejected with a capacity-exceeded error.
    pub fn acquire_failures(&self) -> u64 {
        self.acquire_failures.load(Ordering::Relaxed)
    }

    /// Regions copied into another segment.
    pub fn relocations(&self) -> u64 {
        self.relocations.load(Ordering::Relaxed)
    }

    /// Pointers rejected because they do not match their segment's allocation record.
    pub fn consistency_violations(&self) -> u64 {
        self.consistency_violations.load(Ordering::Relaxed)
    }

    /// Bytes held by live pointers.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Relaxed)
    }
}
