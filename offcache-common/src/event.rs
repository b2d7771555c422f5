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

use std::{fmt::Debug, marker::PhantomData};

/// Trait for the customized eviction listener.
///
/// Called when an entry leaves a cache because it was evicted by the capacity bound or invalidated.
/// The listener receives the key and the value with ownership.
///
/// The listener is always called outside of any cache lock, so it may block.
pub trait EvictionListener<K, V>: Send + Sync + 'static {
    /// Called when an entry is evicted or invalidated.
    fn on_eviction(&self, key: K, value: V);
}

impl<K, V, F> EvictionListener<K, V> for F
where
    F: Fn(K, V) + Send + Sync + 'static,
{
    fn on_eviction(&self, key: K, value: V) {
        self(key, value)
    }
}

/// Eviction listener that ignores every event.
pub struct NoopEvictionListener<K, V>(PhantomData<fn(K, V)>);

impl<K, V> Debug for NoopEvictionListener<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoopEvictionListener").finish()
    }
}

impl<K, V> Default for NoopEvictionListener<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K, V> EvictionListener<K, V> for NoopEvictionListener<K, V>
where
    K: 'static,
    V: 'static,
{
    fn on_eviction(&self, _: K, _: V) {}
}
