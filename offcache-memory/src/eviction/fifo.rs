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

/// First in, first out eviction.
#[derive(Debug)]
pub struct Fifo<K> {
    queue: Queue<K>,
}

impl<K> Default for Fifo<K> {
    fn default() -> Self {
        Self { queue: Queue::default() }
    }
}

impl<K> Eviction<K> for Fifo<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn push(&mut self, key: K) {
        if !self.queue.contains(&key) {
            self.queue.push_back(key);
        }
    }

    fn access(&mut self, _: &K) {}

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
    use crate::eviction::test_utils::TestEviction;

    impl<K> TestEviction<K> for Fifo<K>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
    {
        fn dump(&self) -> Vec<K> {
            self.queue.dump()
        }
    }

    #[test]
    fn test_fifo() {
        let mut fifo = Fifo::default();
        (0..8).for_each(|i| fifo.push(i));
        assert_eq!(fifo.dump(), (0..8).collect::<Vec<_>>());

        // Hits and repeated pushes keep the insertion order.
        fifo.access(&0);
        fifo.push(1);
        assert_eq!(fifo.pop(), Some(0));
        assert_eq!(fifo.pop(), Some(1));

        assert!(fifo.remove(&4));
        assert!(!fifo.remove(&4));
        assert_eq!(fifo.dump(), vec![2, 3, 5, 6, 7]);
        assert_eq!(fifo.len(), 5);

        fifo.push(4);
        assert_eq!(fifo.dump(), vec![2, 3, 5, 6, 7, 4]);

        fifo.clear();
        assert!(fifo.is_empty());
        assert_eq!(fifo.pop(), None);
    }
}
