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

use std::hash::Hash;

use super::{Eviction, Queue};

/// Least recently used eviction.
#[derive(Debug)]
pub struct Lru<K> {
    queue: Queue<K>,
}

impl<K> Default for Lru<K> {
    fn default() -> Self {
        Self { queue: Queue::default() }
    }
}

impl<K> Eviction<K> for Lru<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn push(&mut self, key: K) {
        self.queue.push_back(key);
    }

    fn access(&mut self, key: &K) {
        self.queue.move_to_back(key);
    }

    fn remove(&mut self, key: &K) -> bool {
        self.queue.remove(key)
    }

    fn pop(&mut self) -> Option<K> {
        self.queue.pop_front()
    }

    fn clear(&mut self) {
        self.queue.clear();
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::test_utils::{replay, TestEviction};

    impl<K> TestEviction<K> for Lru<K>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
    {
        fn dump(&self) -> Vec<K> {
            self.queue.dump()
        }
    }

    #[test]
    fn test_lru() {
        let mut lru = Lru::default();
        (0..8).for_each(|i| lru.push(i));
        assert_eq!(lru.dump(), (0..8).collect::<Vec<_>>());

        lru.access(&0);
        lru.access(&3);
        assert_eq!(lru.dump(), vec![1, 2, 4, 5, 6, 7, 0, 3]);

        // Untracked keys are ignored.
        lru.access(&42);
        assert_eq!(lru.len(), 8);

        lru.push(2);
        assert_eq!(lru.dump(), vec![1, 4, 5, 6, 7, 0, 3, 2]);

        assert_eq!(lru.pop(), Some(1));
        assert_eq!(lru.pop(), Some(4));
        assert!(lru.remove(&0));
        assert_eq!(lru.dump(), vec![5, 6, 7, 3, 2]);

        lru.clear();
        assert!(lru.is_empty());
    }

    #[test]
    fn test_lru_deterministic() {
        let a = replay(Lru::default(), 1000);
        let b = replay(Lru::default(), 1000);
        assert_eq!(a, b);
    }
}
