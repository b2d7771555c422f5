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

//! Compaction moves live entries out of fragmented segments.
//!
//! A pass visits the segments whose fragmentation, `(free - largest free range) / capacity`, exceeds the threshold,
//! most fragmented first. It moves entries out of each of them one at a time, always taking the entry next to the
//! segment's largest free range and preferring one that also touches another free range. An entry goes to another
//! existing segment when one has room, otherwise into a smaller free range of its own segment. Without concurrent
//! writers the fragmentation of a compacted segment never rises on a step, and the pass drives it down to `0.0`
//! unless no free range can take the next entry.
//!
//! Each move holds the key's stripe lock: copy the bytes, swap the map entry, then free the old range. Readers hold
//! the same lock, so they never see a freed or partially written range.

use std::{
    hash::Hash,
    sync::{atomic::Ordering, Arc},
    thread::JoinHandle,
    time::Duration,
};

use flume::RecvTimeoutError;
use hashbrown::HashMap;
use offcache_common::error::{Error, Result};
use offcache_storage::{Pointer, SegmentId};

use super::OffHeapCacheInner;

/// Compaction result of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentCompaction {
    /// Segment id.
    pub segment: SegmentId,
    /// Fragmentation before the pass.
    pub before: f64,
    /// Fragmentation after the pass.
    pub after: f64,
    /// Entries moved out of the segment.
    pub relocated: usize,
    /// `true` if the pass stopped because no free range could take the next entry.
    pub blocked: bool,
}

/// Result of a compaction pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactionReport {
    /// Visited segments, most fragmented first.
    pub segments: Vec<SegmentCompaction>,
}

impl CompactionReport {
    /// Entries moved by the pass.
    pub fn relocated(&self) -> usize {
        self.segments.iter().map(|s| s.relocated).sum()
    }
}

enum Relocation {
    Moved,
    /// The entry was rewritten or removed concurrently.
    Stale,
    NoRoom,
}

impl<K, V> OffHeapCacheInner<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn compact(&self, threshold: f64) -> Result<CompactionReport> {
        let mut report = CompactionReport::default();

        for id in self.store.compaction_candidates(threshold) {
            let Some(segment) = self.store.segment(id).cloned() else {
                continue;
            };
            let before = segment.fragmentation();
            let mut relocated = 0;
            let mut blocked = false;

            let mut owners = self.owners(id);
            // Bounds the retries caused by concurrent writers.
            let mut budget = segment.allocations().len() * 2;

            while budget > 0 && segment.fragmentation() > 0.0 {
                budget -= 1;
                let Some(ptr) = self.store.evacuation_candidate(id) else {
                    break;
                };
                let key = match owners.remove(&ptr) {
                    Some(key) => key,
                    None => {
                        owners = self.owners(id);
                        match owners.remove(&ptr) {
                            Some(key) => key,
                            // Acquired by a writer that has not published it yet.
                            None => break,
                        }
                    }
                };
                match self.relocate(&key, ptr)? {
                    Relocation::Moved => relocated += 1,
                    Relocation::Stale => {}
                    Relocation::NoRoom => {
                        blocked = true;
                        break;
                    }
                }
            }

            let after = segment.fragmentation();
            tracing::debug!(
                "[compactor]: segment {id} fragmentation {before:.3} -> {after:.3}, {relocated} entries relocated"
            );
            report.segments.push(SegmentCompaction {
                segment: id,
                before,
                after,
                relocated,
                blocked,
            });
        }

        self.statistics.compactions.fetch_add(1, Ordering::Relaxed);
        self.statistics
            .relocations
            .fetch_add(report.relocated() as u64, Ordering::Relaxed);
        Ok(report)
    }

    fn owners(&self, segment: SegmentId) -> HashMap<Pointer, K> {
        self.pointers
            .pointers_in(segment)
            .into_iter()
            .map(|(key, ptr)| (ptr, key))
            .collect()
    }

    fn relocate(&self, key: &K, ptr: Pointer) -> Result<Relocation> {
        let _guard = self.locks.lock(key);
        if self.pointers.get(key) != Some(ptr) {
            return Ok(Relocation::Stale);
        }
        let Some(new) = self.store.relocate(ptr)? else {
            return Ok(Relocation::NoRoom);
        };
        if !self.pointers.compare_and_swap(key, ptr, new) {
            self.store.free(new)?;
            return Ok(Relocation::Stale);
        }
        self.store.free(ptr)?;
        Ok(Relocation::Moved)
    }
}

/// Background thread running compaction passes periodically.
pub(crate) struct Compactor {
    stop_tx: flume::Sender<()>,
    handle: JoinHandle<()>,
}

impl Compactor {
    pub(crate) fn spawn<K, V>(inner: Arc<OffHeapCacheInner<K, V>>, period: Duration, threshold: f64) -> Result<Self>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name(format!("offcache-compactor-{}", inner.name))
            .spawn(move || {
                tracing::info!("[compactor]: {} started, period {period:?}", inner.name);
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if inner.store.compaction_candidates(threshold).is_empty() {
                        continue;
                    }
                    if let Err(e) = inner.compact(threshold) {
                        tracing::error!("[compactor]: {} compaction failed: {e}", inner.name);
                    }
                }
                tracing::info!("[compactor]: {} stopped", inner.name);
            })
            .map_err(Error::external)?;
        Ok(Self { stop_tx, handle })
    }

    pub(crate) fn stop(self) {
        drop(self.stop_tx);
        if self.handle.join().is_err() {
            tracing::warn!("[compactor]: compactor thread panicked");
        }
    }
}
