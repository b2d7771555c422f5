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

use std::{collections::BTreeMap, fmt::Debug, hash::Hash};

use hashbrown::HashMap;

/// Decides which key leaves a cache when it is over capacity.
///
/// An eviction policy only tracks keys. The same sequence of calls always yields the same victims.
pub trait Eviction<K>: Send + Sync + 'static {
    /// Start tracking a new key. Pushing a tracked key is treated as an access.
    fn push(&mut self, key: K);
    /// Record a hit on a tracked key.
    fn access(&mut self, key: &K);
    /// Stop tracking a key. Returns `true` if the key was tracked.
    fn remove(&mut self, key: &K) -> bool;
    /// Remove and return the next victim.
    fn pop(&mut self) -> Option<K>;
    /// Stop tracking all keys.
    fn clear(&mut self);
    /// Count of tracked keys.
    fn len(&self) -> usize;
    /// Returns `true` if no key is tracked.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Eviction policy selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EvictionConfig {
    /// First in, first out. Hits do not change the order.
    Fifo,
    /// Least recently used. Hits move a key to the back.
    #[default]
    Lru,
}

impl EvictionConfig {
    /// Build the selected policy.
    pub fn build<K>(&self) -> Box<dyn Eviction<K>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
    {
        match self {
            EvictionConfig::Fifo => Box::new(Fifo::default()),
            EvictionConfig::Lru => Box::new(Lru::default()),
        }
    }
}

/// Keys ordered by the tick of their last reordering.
struct Queue<K> {
    order: BTreeMap<u64, K>,
    ticks: HashMap<K, u64>,
    tick: u64,
}

impl<K> Default for Queue<K> {
    fn default() -> Self {
        Self {
            order: BTreeMap::new(),
            ticks: HashMap::new(),
            tick: 0,
        }
    }
}

impl<K> Queue<K>
where
    K: Hash + Eq + Clone,
{
    fn contains(&self, key: &K) -> bool {
        self.ticks.contains_key(key)
    }

    fn push_back(&mut self, key: K) {
        self.remove(&key);
        let tick = self.next_tick();
        self.order.insert(tick, key.clone());
        self.ticks.insert(key, tick);
    }

    fn move_to_back(&mut self, key: &K) {
        if let Some(old) = self.ticks.get(key).copied() {
            let tick = self.next_tick();
            if let Some(key) = self.order.remove(&old) {
                self.order.insert(tick, key);
            }
            self.ticks.insert(key.clone(), tick);
        }
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.ticks.remove(key) {
            Some(tick) => {
                self.order.remove(&tick);
                true
            }
            None => false,
        }
    }

    fn pop_front(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ticks.clear();
    }

    fn len(&self) -> usize {
        self.ticks.len()
    }

    #[cfg(test)]
    fn dump(&self) -> Vec<K> {
        self.order.values().cloned().collect()
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

impl<K> Debug for Queue<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("len", &self.ticks.len()).field("tick", &self.tick).finish()
    }
}

/// First in, first out eviction.
pub mod fifo;
/// Least recently used eviction.
pub mod lru;

pub use fifo::Fifo;
pub use lru::Lru;

#[cfg(test)]
pub mod test_utils;
