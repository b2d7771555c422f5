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

use std::{
    alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout},
    collections::BTreeMap,
    fmt::Debug,
    ptr::NonNull,
};

use offcache_common::{
    error::{Error, ErrorKind, Result},
    strict_assert, strict_assert_eq,
};
use parking_lot::RwLock;

/// Index of a segment in the pool.
pub type SegmentId = u32;

const SEGMENT_ALIGN: usize = 8;

/// Manually managed memory of a segment, allocated once and released on drop.
struct RawBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: `RawBuffer` exclusively owns its allocation. The pointer is created once in `new` and only released in
// `drop`, and every access goes through `&self`/`&mut self` slices guarded by the segment lock.
unsafe impl Send for RawBuffer {}

// SAFETY: Shared access only hands out `&[u8]`, mutable access requires `&mut self`.
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("segment capacity must be greater than 0"));
        }
        let layout = Layout::from_size_align(capacity, SEGMENT_ALIGN)
            .map_err(|e| Error::config("invalid segment capacity").with_source(e))?;
        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        };
        Ok(Self { ptr, layout })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `layout.size()` initialized (zeroed) bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: Same as `as_slice`, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated with `layout` in `new` and has not been deallocated yet.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

struct SegmentState {
    buffer: RawBuffer,
    /// offset -> len of free ranges, never overlapping and never adjacent.
    free: BTreeMap<u32, u32>,
    /// offset -> len of allocated ranges.
    allocated: BTreeMap<u32, u32>,
    free_bytes: u32,
}

impl SegmentState {
    fn check_record(&self, id: SegmentId, offset: u32, len: u32) -> Result<()> {
        match self.allocated.get(&offset) {
            Some(recorded) if *recorded == len => Ok(()),
            recorded => {
                let err = Error::consistency_violation(id, offset, len, recorded.copied());
                tracing::error!("[segment]: {err}");
                Err(err)
            }
        }
    }

    /// Take `len` bytes from the head of the free range at `offset`.
    fn take_free(&mut self, offset: u32, len: u32) {
        if let Some(free) = self.free.remove(&offset) {
            if free > len {
                self.free.insert(offset + len, free - len);
            }
            self.free_bytes -= len;
        }
    }

    /// Return `[offset, offset + len)` to the free list, merging it with the free ranges it touches.
    fn insert_free(&mut self, offset: u32, len: u32) {
        let mut start = offset;
        let mut end = offset + len;

        let prev = self.free.range(..offset).next_back().map(|(o, l)| (*o, *l));
        if let Some((prev_offset, prev_len)) = prev {
            if prev_offset + prev_len == start {
                self.free.remove(&prev_offset);
                start = prev_offset;
            }
        }
        if let Some(next_len) = self.free.remove(&end) {
            end += next_len;
        }
        self.free.insert(start, end - start);
        self.free_bytes += len;
    }

    fn largest_free(&self) -> Option<(u32, u32)> {
        // Ties are broken by the lowest offset.
        self.free
            .iter()
            .fold(None, |largest: Option<(u32, u32)>, (&offset, &len)| match largest {
                Some((_, l)) if l >= len => largest,
                _ => Some((offset, len)),
            })
    }
}

/// A fixed-capacity contiguous byte region with its own free-range list.
///
/// Every mutation of the free list or the bytes happens under the segment's own lock.
pub struct Segment {
    id: SegmentId,
    capacity: u32,
    state: RwLock<SegmentState>,
}

impl Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("free", &state.free)
            .field("allocated", &state.allocated)
            .finish()
    }
}

impl Segment {
    /// Allocate a zeroed segment.
    pub fn new(id: SegmentId, capacity: usize) -> Result<Self> {
        let capacity32 = u32::try_from(capacity).map_err(|_| {
            Error::config("segment capacity must fit in 32 bits").with_context("capacity", capacity)
        })?;
        let buffer = RawBuffer::new(capacity)?;
        let mut free = BTreeMap::new();
        free.insert(0, capacity32);
        Ok(Self {
            id,
            capacity: capacity32,
            state: RwLock::new(SegmentState {
                buffer,
                free,
                allocated: BTreeMap::new(),
                free_bytes: capacity32,
            }),
        })
    }

    /// Get segment id.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Get segment capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Reserve `len` bytes with first fit. Returns the offset of the range.
    pub fn allocate(&self, len: u32) -> Option<u32> {
        if len == 0 {
            return None;
        }
        let mut state = self.state.write();
        let offset = state.free.iter().find(|(_, free)| **free >= len).map(|(offset, _)| *offset)?;
        state.take_free(offset, len);
        state.allocated.insert(offset, len);

        self.check_invariants(&state);
        Some(offset)
    }

    /// Reserve `len` bytes with first fit, skipping the largest free range.
    ///
    /// Moving the evacuation candidate into such a range grows the largest free range by `len`, so the
    /// fragmentation drops by at least `len / capacity`.
    pub fn allocate_outside_largest(&self, len: u32) -> Option<u32> {
        if len == 0 {
            return None;
        }
        let mut state = self.state.write();
        let (largest, _) = state.largest_free()?;
        let offset = state
            .free
            .iter()
            .find(|(offset, free)| **offset != largest && **free >= len)
            .map(|(offset, _)| *offset)?;
        state.take_free(offset, len);
        state.allocated.insert(offset, len);

        self.check_invariants(&state);
        Some(offset)
    }

    /// Return an allocated range to the free list, coalescing it with adjacent free ranges.
    pub fn release(&self, offset: u32, len: u32) -> Result<()> {
        let mut state = self.state.write();
        state.check_record(self.id, offset, len)?;
        state.allocated.remove(&offset);
        state.insert_free(offset, len);

        self.check_invariants(&state);
        Ok(())
    }

    /// Cut an allocated range down to its first `new_len` bytes and release the tail.
    pub fn shrink(&self, offset: u32, len: u32, new_len: u32) -> Result<()> {
        if new_len == 0 || new_len > len {
            return Err(Error::new(ErrorKind::OutOfRange, "shrunk length must be in (0, len]")
                .with_context("segment", self.id)
                .with_context("len", len)
                .with_context("new_len", new_len));
        }
        let mut state = self.state.write();
        state.check_record(self.id, offset, len)?;
        if new_len == len {
            return Ok(());
        }
        state.allocated.insert(offset, new_len);
        state.insert_free(offset + new_len, len - new_len);

        self.check_invariants(&state);
        Ok(())
    }

    /// Copy the bytes of an allocated range out of the segment.
    pub fn read(&self, offset: u32, len: u32) -> Result<Vec<u8>> {
        let state = self.state.read();
        state.check_record(self.id, offset, len)?;
        let start = offset as usize;
        Ok(state.buffer.as_slice()[start..start + len as usize].to_vec())
    }

    /// Write `buf` at the start of an allocated range. `buf` must not be longer than the range.
    pub fn write(&self, offset: u32, len: u32, buf: &[u8]) -> Result<()> {
        if buf.len() > len as usize {
            return Err(Error::new(ErrorKind::OutOfRange, "buffer is longer than the pointer range")
                .with_context("segment", self.id)
                .with_context("len", len)
                .with_context("buffer", buf.len()));
        }
        let mut state = self.state.write();
        state.check_record(self.id, offset, len)?;
        let start = offset as usize;
        state.buffer.as_mut_slice()[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    /// Free bytes in the segment.
    pub fn free_bytes(&self) -> usize {
        self.state.read().free_bytes as usize
    }

    /// Allocated bytes in the segment.
    pub fn allocated_bytes(&self) -> usize {
        (self.capacity - self.state.read().free_bytes) as usize
    }

    /// Length of the largest free range.
    pub fn largest_free(&self) -> usize {
        self.state.read().largest_free().map(|(_, len)| len as usize).unwrap_or_default()
    }

    /// Free bytes outside the largest free range over the capacity.
    ///
    /// `0.0` means all free space is contiguous.
    pub fn fragmentation(&self) -> f64 {
        let state = self.state.read();
        let largest = state.largest_free().map(|(_, len)| len).unwrap_or_default();
        (state.free_bytes - largest) as f64 / self.capacity as f64
    }

    /// `(offset, len)` of all free ranges in offset order.
    pub fn free_ranges(&self) -> Vec<(u32, u32)> {
        self.state.read().free.iter().map(|(o, l)| (*o, *l)).collect()
    }

    /// `(offset, len)` of all allocated ranges in offset order.
    pub fn allocations(&self) -> Vec<(u32, u32)> {
        self.state.read().allocated.iter().map(|(o, l)| (*o, *l)).collect()
    }

    /// The allocation to move out first when evacuating the segment.
    ///
    /// It is always adjacent to the largest free range, so releasing it never raises the fragmentation. An allocation
    /// that also touches another free range is preferred, releasing it merges both ranges and lowers the
    /// fragmentation.
    pub fn evacuation_candidate(&self) -> Option<(u32, u32)> {
        let state = self.state.read();
        let Some((start, len)) = state.largest_free() else {
            return state.allocated.iter().next().map(|(o, l)| (*o, *l));
        };
        let end = start + len;

        let before = state
            .allocated
            .range(..start)
            .next_back()
            .filter(|(offset, len)| **offset + **len == start)
            .map(|(o, l)| (*o, *l));
        let after = state.allocated.get_key_value(&end).map(|(o, l)| (*o, *l));

        let bridges_before = before.is_some_and(|(offset, _)| {
            state
                .free
                .range(..offset)
                .next_back()
                .is_some_and(|(o, l)| o + l == offset)
        });
        let bridges_after = after.is_some_and(|(offset, len)| state.free.contains_key(&(offset + len)));

        match (bridges_before, bridges_after) {
            (true, _) => before,
            (false, true) => after,
            (false, false) => before.or(after),
        }
    }

    fn check_invariants(&self, state: &SegmentState) {
        strict_assert_eq!(
            state.allocated.values().map(|len| *len as u64).sum::<u64>() + state.free_bytes as u64,
            self.capacity as u64
        );
        strict_assert_eq!(
            state.free.values().map(|len| *len as u64).sum::<u64>(),
            state.free_bytes as u64
        );
        strict_assert!(state
            .free
            .iter()
            .zip(state.free.iter().skip(1))
            .all(|((o1, l1), (o2, _))| o1 + l1 < *o2));
    }
}
