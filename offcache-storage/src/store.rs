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

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, OnceLock,
};

use offcache_common::error::{Error, ErrorKind, Result};
use parking_lot::Mutex;

use crate::{
    pointer::Pointer,
    segment::{Segment, SegmentId},
    statistics::Statistics,
};

/// Configuration of a [`Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoreConfig {
    /// Capacity of each segment in bytes.
    pub segment_capacity: usize,
    /// Segments allocated when the store is built.
    pub initial_segments: usize,
    /// Upper bound of the segment pool.
    pub max_segments: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreBuilder::default().config
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.segment_capacity == 0 || self.segment_capacity > u32::MAX as usize {
            return Err(Error::config("segment capacity must be in (0, u32::MAX]")
                .with_context("segment_capacity", self.segment_capacity));
        }
        // `SegmentId::MAX` is reserved for `Pointer::EMPTY`.
        if self.max_segments == 0 || self.max_segments >= SegmentId::MAX as usize {
            return Err(Error::config("max segments must be in (0, u32::MAX)")
                .with_context("max_segments", self.max_segments));
        }
        if self.initial_segments > self.max_segments {
            return Err(Error::config("initial segments must not exceed max segments")
                .with_context("initial_segments", self.initial_segments)
                .with_context("max_segments", self.max_segments));
        }
        Ok(())
    }
}

/// Builder for [`Store`].
#[derive(Debug, Clone)]
pub struct StoreBuilder {
    config: StoreConfig,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            config: StoreConfig {
                segment_capacity: 1024 * 1024,
                initial_segments: 1,
                max_segments: 64,
            },
        }
    }
}

impl StoreBuilder {
    /// Create a store builder with the default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store builder from a config.
    pub fn from_config(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Set the capacity of each segment in bytes.
    ///
    /// A value larger than a segment can never be stored.
    ///
    /// Default: 1 MiB.
    pub fn with_segment_capacity(mut self, segment_capacity: usize) -> Self {
        self.config.segment_capacity = segment_capacity;
        self
    }

    /// Set the count of segments allocated when the store is built.
    ///
    /// Default: 1.
    pub fn with_initial_segments(mut self, initial_segments: usize) -> Self {
        self.config.initial_segments = initial_segments;
        self
    }

    /// Set the upper bound of the segment pool. The pool grows lazily up to it.
    ///
    /// Default: 64.
    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.config.max_segments = max_segments;
        self
    }

    /// Allocate exactly `segments` segments up front and never grow.
    pub fn with_fixed_segments(self, segments: usize) -> Self {
        self.with_initial_segments(segments).with_max_segments(segments)
    }

    /// Validate the config and allocate the initial segments.
    pub fn build(self) -> Result<Store> {
        self.config.validate()?;

        let slots = (0..self.config.max_segments).map(|_| OnceLock::new()).collect::<Box<[_]>>();
        for (id, slot) in slots.iter().take(self.config.initial_segments).enumerate() {
            let segment = Segment::new(id as SegmentId, self.config.segment_capacity)?;
            let _ = slot.set(Arc::new(segment));
        }

        tracing::debug!(
            "[store]: build with {} segments of {} bytes, up to {} segments",
            self.config.initial_segments,
            self.config.segment_capacity,
            self.config.max_segments
        );

        let inner = StoreInner {
            segments: slots,
            count: AtomicUsize::new(self.config.initial_segments),
            growth: Mutex::new(()),
            config: self.config,
            statistics: Arc::default(),
        };
        Ok(Store { inner: Arc::new(inner) })
    }
}

struct StoreInner {
    /// Slots of the segment pool. Slots below `count` are always set.
    segments: Box<[OnceLock<Arc<Segment>>]>,
    count: AtomicUsize,
    /// Serializes pool growth.
    growth: Mutex<()>,
    config: StoreConfig,
    statistics: Arc<Statistics>,
}

/// A pool of segments that hands out [`Pointer`]s to contiguous byte ranges.
///
/// Each segment carries its own lock, so operations on different segments never contend.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("segments", &self.segment_count())
            .field("statistics", &self.inner.statistics)
            .finish()
    }
}

impl Store {
    /// Get the store config.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Get the store statistics.
    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.inner.statistics
    }

    /// Count of allocated segments.
    pub fn segment_count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Total capacity of the allocated segments in bytes.
    pub fn capacity(&self) -> usize {
        self.segment_count() * self.inner.config.segment_capacity
    }

    /// Capacity of the store when the pool is fully grown.
    pub fn max_capacity(&self) -> usize {
        self.inner.config.max_segments * self.inner.config.segment_capacity
    }

    /// Free bytes across the allocated segments.
    pub fn free_bytes(&self) -> usize {
        self.segments().map(|s| s.free_bytes()).sum()
    }

    /// Bytes held by live pointers.
    pub fn used_bytes(&self) -> usize {
        self.inner.statistics.used_bytes()
    }

    /// Get an allocated segment.
    pub fn segment(&self, id: SegmentId) -> Option<&Arc<Segment>> {
        if id as usize >= self.segment_count() {
            return None;
        }
        self.inner.segments.get(id as usize).and_then(|slot| slot.get())
    }

    /// Iterate the allocated segments in id order.
    pub fn segments(&self) -> impl Iterator<Item = &Arc<Segment>> + '_ {
        self.inner.segments[..self.segment_count()].iter().filter_map(|slot| slot.get())
    }

    /// Reserve `size` contiguous bytes.
    ///
    /// Segments are scanned in ascending id order and the first fit wins. If no segment fits, the pool grows by one
    /// segment when allowed. A value never spans segments. An empty range is [`Pointer::EMPTY`] and takes no space.
    pub fn acquire(&self, size: usize) -> Result<Pointer> {
        self.check_size(size)?;
        if size == 0 {
            return Ok(self.on_acquired(Pointer::EMPTY));
        }
        let len = size as u32;

        let scanned = self.segment_count();
        if let Some(ptr) = self.acquire_in(0..scanned, len, None) {
            return Ok(self.on_acquired(ptr));
        }

        let _guard = self.inner.growth.lock();

        // Segments added while waiting for the growth lock.
        let count = self.segment_count();
        if let Some(ptr) = self.acquire_in(scanned..count, len, None) {
            return Ok(self.on_acquired(ptr));
        }

        if count >= self.inner.config.max_segments {
            self.inner.statistics.acquire_failures.fetch_add(1, Ordering::Relaxed);
            return Err(Error::capacity_exceeded(self.max_capacity(), self.used_bytes(), size));
        }

        let segment = Arc::new(Segment::new(count as SegmentId, self.inner.config.segment_capacity)?);
        let offset = segment.allocate(len);
        let _ = self.inner.segments[count].set(segment);
        self.inner.count.store(count + 1, Ordering::Release);
        tracing::debug!("[store]: grow to {} segments", count + 1);

        match offset {
            Some(offset) => Ok(self.on_acquired(Pointer {
                segment: count as SegmentId,
                offset,
                len,
            })),
            None => Err(Error::capacity_exceeded(self.max_capacity(), self.used_bytes(), size)),
        }
    }

    /// Fails with [`ErrorKind::CapacityExceeded`] if a value of `size` bytes can never be stored, because it does
    /// not fit in one segment.
    pub fn check_size(&self, size: usize) -> Result<()> {
        if size > self.inner.config.segment_capacity {
            self.inner.statistics.acquire_failures.fetch_add(1, Ordering::Relaxed);
            return Err(
                Error::capacity_exceeded(self.max_capacity(), self.used_bytes(), size).with_context(
                    "segment_capacity",
                    self.inner.config.segment_capacity,
                ),
            );
        }
        Ok(())
    }

    /// Return the range of `ptr` to its segment.
    pub fn free(&self, ptr: Pointer) -> Result<()> {
        if ptr.is_empty() {
            self.check_empty(&ptr)?;
        } else {
            let segment = self.segment_of(&ptr)?;
            segment
                .release(ptr.offset, ptr.len)
                .inspect_err(|_| self.on_violation())?;
        }
        self.inner.statistics.frees.fetch_add(1, Ordering::Relaxed);
        self.inner.statistics.used_bytes.fetch_sub(ptr.len(), Ordering::Relaxed);
        Ok(())
    }

    /// Copy the bytes of `ptr` out of the store.
    pub fn read(&self, ptr: Pointer) -> Result<Vec<u8>> {
        if ptr.is_empty() {
            return self.check_empty(&ptr).map(|_| vec![]);
        }
        let segment = self.segment_of(&ptr)?;
        segment.read(ptr.offset, ptr.len).inspect_err(|e| {
            if e.kind() == ErrorKind::ConsistencyViolation {
                self.on_violation();
            }
        })
    }

    /// Write `buf` into the range of `ptr`.
    ///
    /// `buf` longer than the range fails with [`ErrorKind::OutOfRange`]. Use [`Store::replace`] to resize.
    pub fn write(&self, ptr: Pointer, buf: &[u8]) -> Result<()> {
        if ptr.is_empty() {
            self.check_empty(&ptr)?;
            if !buf.is_empty() {
                return Err(Error::new(ErrorKind::OutOfRange, "buffer is longer than the pointer range")
                    .with_context("len", 0)
                    .with_context("buffer", buf.len()));
            }
            return Ok(());
        }
        let segment = self.segment_of(&ptr)?;
        segment.write(ptr.offset, ptr.len, buf).inspect_err(|e| {
            if e.kind() == ErrorKind::ConsistencyViolation {
                self.on_violation();
            }
        })
    }

    /// Store `buf` in a freshly acquired range, then free `ptr`.
    ///
    /// On failure `ptr` stays valid and untouched.
    pub fn replace(&self, ptr: Pointer, buf: &[u8]) -> Result<Pointer> {
        let new = self.acquire(buf.len())?;
        if let Err(e) = self.write(new, buf) {
            let _ = self.free(new);
            return Err(e);
        }
        self.free(ptr)?;
        Ok(new)
    }

    /// Cut the range of `ptr` down to its first `len` bytes in place and release the tail.
    ///
    /// Never allocates, so it succeeds in a full store. Shrinking to `0` frees the range and returns
    /// [`Pointer::EMPTY`].
    pub fn shrink(&self, ptr: Pointer, len: usize) -> Result<Pointer> {
        if len > ptr.len() {
            return Err(Error::new(ErrorKind::OutOfRange, "cannot shrink a range to a larger length")
                .with_context("len", ptr.len)
                .with_context("new_len", len));
        }
        if len == ptr.len() {
            return Ok(ptr);
        }
        if len == 0 {
            self.free(ptr)?;
            return Ok(self.on_acquired(Pointer::EMPTY));
        }
        let new_len = len as u32;
        let segment = self.segment_of(&ptr)?;
        segment.shrink(ptr.offset, ptr.len, new_len).inspect_err(|e| {
            if e.kind() == ErrorKind::ConsistencyViolation {
                self.on_violation();
            }
        })?;
        self.inner
            .statistics
            .used_bytes
            .fetch_sub(ptr.len() - len, Ordering::Relaxed);
        Ok(Pointer { len: new_len, ..ptr })
    }

    /// Copy the bytes of `ptr` to a new range that consolidates the free space of `ptr`'s segment.
    ///
    /// Other existing segments are tried first. Failing that, the bytes move into a free range of the same segment
    /// other than its largest one. The pool never grows for a relocation. Returns `None` if there is no room. The
    /// old range stays allocated until the caller frees it.
    pub fn relocate(&self, ptr: Pointer) -> Result<Option<Pointer>> {
        let data = self.read(ptr)?;
        let new = match self.acquire_in(0..self.segment_count(), ptr.len, Some(ptr.segment)) {
            Some(new) => new,
            None => {
                let within = self
                    .segment(ptr.segment)
                    .and_then(|segment| segment.allocate_outside_largest(ptr.len));
                match within {
                    Some(offset) => Pointer { offset, ..ptr },
                    None => return Ok(None),
                }
            }
        };
        let new = self.on_acquired(new);
        if let Err(e) = self.write(new, &data) {
            let _ = self.free(new);
            return Err(e);
        }
        self.inner.statistics.relocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("[store]: relocate {ptr:?} to {new:?}");
        Ok(Some(new))
    }

    /// Ids of segments whose fragmentation exceeds `threshold`, most fragmented first.
    pub fn compaction_candidates(&self, threshold: f64) -> Vec<SegmentId> {
        let mut candidates = self
            .segments()
            .map(|s| (s.id(), s.fragmentation()))
            .filter(|(_, fragmentation)| *fragmentation > threshold)
            .collect::<Vec<_>>();
        candidates.sort_by(|(ia, a), (ib, b)| b.total_cmp(a).then(ia.cmp(ib)));
        candidates.into_iter().map(|(id, _)| id).collect()
    }

    /// The live range to move first when evacuating a segment.
    pub fn evacuation_candidate(&self, id: SegmentId) -> Option<Pointer> {
        let (offset, len) = self.segment(id)?.evacuation_candidate()?;
        Some(Pointer { segment: id, offset, len })
    }

    fn acquire_in(
        &self,
        range: std::ops::Range<usize>,
        len: u32,
        exclude: Option<SegmentId>,
    ) -> Option<Pointer> {
        self.inner.segments[range]
            .iter()
            .filter_map(|slot| slot.get())
            .filter(|segment| Some(segment.id()) != exclude)
            .find_map(|segment| {
                segment.allocate(len).map(|offset| Pointer {
                    segment: segment.id(),
                    offset,
                    len,
                })
            })
    }

    fn on_acquired(&self, ptr: Pointer) -> Pointer {
        self.inner.statistics.acquires.fetch_add(1, Ordering::Relaxed);
        self.inner.statistics.used_bytes.fetch_add(ptr.len(), Ordering::Relaxed);
        ptr
    }

    fn on_violation(&self) {
        self.inner.statistics.consistency_violations.fetch_add(1, Ordering::Relaxed);
    }

    fn check_empty(&self, ptr: &Pointer) -> Result<()> {
        if *ptr == Pointer::EMPTY {
            return Ok(());
        }
        self.on_violation();
        let err = Error::consistency_violation(ptr.segment, ptr.offset, ptr.len, None);
        tracing::error!("[store]: {err}");
        Err(err)
    }

    fn segment_of(&self, ptr: &Pointer) -> Result<&Arc<Segment>> {
        self.segment(ptr.segment).ok_or_else(|| {
            self.on_violation();
            let err = Error::consistency_violation(ptr.segment, ptr.offset, ptr.len, None)
                .with_context("segments", self.segment_count());
            tracing::error!("[store]: {err}");
            err
        })
    }
}
