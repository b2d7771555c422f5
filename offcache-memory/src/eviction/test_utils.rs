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

use super::Eviction;

pub trait TestEviction<K>: Eviction<K> {
    /// Tracked keys from the next victim to the last.
    fn dump(&self) -> Vec<K>;
}

/// Run a fixed mixed workload and return the victims in order.
pub fn replay<E>(mut eviction: E, ops: u64) -> Vec<u64>
where
    E: Eviction<u64>,
{
    let mut victims = vec![];
    for i in 0..ops {
        let key = (i * 7919) % 64;
        match i % 5 {
            0 | 1 => eviction.push(key),
            2 | 3 => eviction.access(&key),
            _ => {
                eviction.remove(&key);
            }
        }
        while eviction.len() > 16 {
            victims.extend(eviction.pop());
        }
    }
    victims
}
