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

use std::sync::Arc;

use itertools::Itertools;
use offcache::prelude::*;
use parking_lot::Mutex;

#[test_log::test]
fn test_batches_never_exceed_batch_size() {
    const TASKS: u64 = 2345;
    const BATCH_SIZE: usize = 100;

    for strategy in [DrainStrategy::Single, DrainStrategy::Pool { concurrency: 3 }] {
        let sizes = Arc::new(Mutex::new(vec![]));
        let keys = Arc::new(Mutex::new(vec![]));
        let saver = {
            let sizes = sizes.clone();
            let keys = keys.clone();
            move |tasks: &[CacheTask<u64, String>]| -> Result<()> {
                sizes.lock().push(tasks.len());
                keys.lock().extend(tasks.iter().map(|t| *t.key()));
                Ok(())
            }
        };
        let listener = QueuingEvictionListener::builder(saver)
            .with_batch_size(BATCH_SIZE)
            .with_queue_size(500)
            .with_strategy(strategy)
            .build()
            .unwrap();
        listener.start().unwrap();

        std::thread::scope(|s| {
            for part in 0..3u64 {
                let listener = &listener;
                s.spawn(move || {
                    for key in (0..TASKS).filter(|k| k % 3 == part) {
                        listener.on_eviction(key, format!("value {key}"));
                    }
                });
            }
        });
        listener.stop();

        let sizes = sizes.lock();
        assert!(sizes.iter().all(|size| *size > 0 && *size <= BATCH_SIZE), "{strategy:?}");
        assert_eq!(sizes.iter().sum::<usize>(), TASKS as usize);
        let keys = keys.lock().iter().copied().sorted().collect_vec();
        assert_eq!(keys, (0..TASKS).collect_vec());
    }
}

#[test_log::test]
fn test_single_worker_keeps_queue_order() {
    let keys = Arc::new(Mutex::new(vec![]));
    let saver = {
        let keys = keys.clone();
        move |tasks: &[CacheTask<u64, ()>]| -> Result<()> {
            keys.lock().extend(tasks.iter().map(|t| *t.key()));
            Ok(())
        }
    };
    let listener = QueuingEvictionListener::builder(saver)
        .with_batch_size(7)
        .with_strategy(DrainStrategy::Single)
        .build()
        .unwrap();
    listener.start().unwrap();
    for key in 0..300 {
        listener.on_eviction(key, ());
    }
    listener.stop();
    assert_eq!(*keys.lock(), (0..300).collect_vec());
}

#[test_log::test]
fn test_off_heap_evictions_reach_the_saver() {
    let saved = Arc::new(Mutex::new(vec![]));
    let saver = {
        let saved = saved.clone();
        move |tasks: &[CacheTask<u64, String>]| -> Result<()> {
            saved.lock().extend(tasks.iter().cloned().map(CacheTask::into_parts));
            Ok(())
        }
    };
    let listener = QueuingEvictionListener::builder(saver).build().unwrap();
    listener.start().unwrap();

    let cache = OffHeapCache::<u64, String>::builder("evicting")
        .with_capacity(5)
        .with_eviction_config(EvictionConfig::Lru)
        .with_serializer(RawSerializer)
        .with_eviction_listener(listener.clone())
        .build()
        .unwrap();
    for key in 0..5 {
        cache.put(key, key.to_string()).unwrap();
    }
    // Keep 0 hot.
    cache.get(&0).unwrap();
    for key in 5..8 {
        cache.put(key, key.to_string()).unwrap();
    }
    cache.invalidate(&0).unwrap();

    listener.stop();
    let saved = saved.lock().iter().cloned().sorted().collect_vec();
    assert_eq!(
        saved,
        vec![
            (0, "0".to_string()),
            (1, "1".to_string()),
            (2, "2".to_string()),
            (3, "3".to_string()),
        ]
    );
}
