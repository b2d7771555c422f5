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
    fmt::Debug,
    hash::{BuildHasher, Hash, RandomState},
};

use parking_lot::{Mutex, MutexGuard};

/// Striped per-key locks.
///
/// Keys are mapped to a fixed set of mutexes by hash. Holding the guard of a key serializes every operation on it,
/// while operations on keys of different stripes run in parallel.
///
/// Never hold two stripe guards at the same time.
pub struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
    hash_builder: RandomState,
}

impl Debug for KeyLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLocks").field("stripes", &self.stripes.len()).finish()
    }
}

impl KeyLocks {
    /// Create striped locks with at least `stripes` stripes, rounded up to a power of two.
    pub fn new(stripes: usize) -> Self {
        let stripes = stripes.max(1).next_power_of_two();
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
            hash_builder: RandomState::new(),
        }
    }

    /// Lock the stripe `key` belongs to.
    pub fn lock<K>(&self, key: &K) -> MutexGuard<'_, ()>
    where
        K: Hash + ?Sized,
    {
        self.stripes[self.stripe(key)].lock()
    }

    /// Index of the stripe `key` belongs to.
    pub fn stripe<K>(&self, key: &K) -> usize
    where
        K: Hash + ?Sized,
    {
        self.hash_builder.hash_one(key) as usize & (self.stripes.len() - 1)
    }

    /// Count of stripes.
    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    #[test]
    fn test_stripes_power_of_two() {
        assert_eq!(KeyLocks::new(0).stripes(), 1);
        assert_eq!(KeyLocks::new(5).stripes(), 8);
        assert_eq!(KeyLocks::new(64).stripes(), 64);
    }

    #[test]
    fn test_same_key_same_stripe() {
        let locks = KeyLocks::new(16);
        let stripes = (0..4).map(|_| locks.stripe(&"key")).collect_vec();
        assert!(stripes.iter().all_equal());

        let guard = locks.lock(&"key");
        assert!(locks.stripes[locks.stripe(&"key")].try_lock().is_none());
        drop(guard);
        assert!(locks.stripes[locks.stripe(&"key")].try_lock().is_some());
    }
}
