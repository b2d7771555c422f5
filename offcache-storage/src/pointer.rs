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

use crate::segment::SegmentId;

/// Opaque handle of a byte range inside a segment.
///
/// A live pointer never aliases the range of another live pointer. The store checks every pointer against the
/// allocation record of its segment before touching the bytes. Empty values get [`Pointer::EMPTY`], which is not
/// backed by any segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub(crate) segment: SegmentId,
    pub(crate) offset: u32,
    pub(crate) len: u32,
}

impl Pointer {
    /// The pointer of an empty value.
    pub const EMPTY: Pointer = Pointer {
        segment: SegmentId::MAX,
        offset: 0,
        len: 0,
    };

    /// Id of the segment that holds the range.
    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Offset of the range inside the segment.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Length of the range in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` if the range is empty. The only empty pointer the store hands out is [`Pointer::EMPTY`].
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
