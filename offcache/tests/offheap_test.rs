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
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use itertools::Itertools;
use offcache::prelude::*;
use parking_lot::Mutex;
use rand::Rng;

type Saved = Arc<Mutex<Vec<Vec<(u64, Vec<u8>)>>>>;

fn saving_listener(batch_size: usize) -> (Saved, QueuingEvictionListener<u64, Vec<u8>>) {
    let saved: Saved = Arc::default();
    let saver = {
        let saved = saved.clone();
        move |tasks: &[CacheTask<u64, Vec<u8>>]| -> Result<()> {
            saved
                .lock()
                .push(tasks.iter().map(|t| (*t.key(), t.value().clone())).collect_vec());
            Ok(())
        }
    };
    let listener = QueuingEvictionListener::builder(saver)
        .with_batch_size(batch_size)
        .with_strategy(DrainStrategy::Single)
        .build()
        .unwrap();
    (saved, listener)
}

#[test_log::test]
fn test_segments_full_of_values_evict_to_listener() {
    let (saved, listener) = saving_listener(1000);
    listener.start().unwrap();

    let cache = OffHeapCache::<u64, Vec<u8>>::builder("e2e")
        .with_capacity(10)
        .with_segments(10, 100)
        .with_eviction_config(EvictionConfig::Fifo)
        .with_serializer(RawSerializer)
        .with_eviction_listener(listener.clone())
        .build()
        .unwrap();
    assert_eq!(cache.store().capacity(), 1000);

    for i in 0..12u64 {
        cache.put(i, vec![i as u8; 90]).unwrap();
    }
    assert_eq!(cache.size(), 10);
    assert_eq!(cache.statistics().evictions(), 2);
    assert_eq!(cache.store().used_bytes(), 900);

    listener.stop();
    let saved = saved.lock().iter().flatten().cloned().collect_vec();
    assert_eq!(saved, vec![(0, vec![0; 90]), (1, vec![1; 90])]);
    for i in 2..12u64 {
        assert_eq!(cache.get(&i).unwrap(), Some(vec![i as u8; 90]));
    }
}

#[test]
fn test_hit_ratio_without_gets() {
    let cache = OffHeapCache::<u64, Vec<u8>>::builder("idle")
        .with_serializer(RawSerializer)
        .build()
        .unwrap();
    cache.put(1, vec![1]).unwrap();
    assert_eq!(cache.hit_ratio(), 0.0);

    cache.get(&1).unwrap();
    cache.get(&2).unwrap();
    cache.get(&1).unwrap();
    assert!((cache.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
}

#[test_log::test]
fn test_empty_strings_round_trip() {
    let cache = OffHeapCache::<u64, String>::builder("empty")
        .with_capacity(4)
        .with_segments(1, 8)
        .with_serializer(RawSerializer)
        .build()
        .unwrap();
    cache.put(1, "12345678".to_string()).unwrap();

    // The single segment is full, empty values still fit.
    cache.put(2, String::new()).unwrap();
    assert_eq!(cache.get(&2).unwrap(), Some(String::new()));
    cache.put(1, String::new()).unwrap();
    assert_eq!(cache.get(&1).unwrap(), Some(String::new()));
    assert_eq!(cache.store().free_bytes(), 8);
    assert_eq!(cache.size(), 2);
}

#[test_log::test]
fn test_load_through() {
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = {
        let loads = loads.clone();
        move |key: &u64| -> Result<Option<String>> {
            loads.fetch_add(1, Ordering::Relaxed);
            match *key {
                0 => Err(Error::external(anyhow::anyhow!("database is down"))),
                k if k < 100 => Ok(Some(format!("row {k}"))),
                _ => Ok(None),
            }
        }
    };
    let cache = OffHeapCache::<u64, String>::builder("loading")
        .with_serializer(RawSerializer)
        .with_loader(loader)
        .build()
        .unwrap();

    assert_eq!(cache.get(&7).unwrap(), Some("row 7".to_string()));
    assert_eq!(cache.get(&7).unwrap(), Some("row 7".to_string()));
    assert_eq!(loads.load(Ordering::Relaxed), 1);
    assert_eq!(cache.statistics().loads(), 1);

    // Load-through also serves `contains`.
    assert!(cache.contains(&8).unwrap());
    assert!(!cache.contains(&500).unwrap());
    assert_eq!(cache.size(), 2);

    let err = cache.get(&0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(err.source().map(|e| e.to_string()), Some("database is down".to_string()));
    assert_eq!(cache.size(), 2);
}

#[test_log::test]
fn test_compaction_under_concurrent_reads() {
    const LIVE: u64 = 64;

    let cache = Arc::new(
        OffHeapCache::<u64, Vec<u8>>::builder("compaction")
            .with_capacity(1024)
            .with_segments(8, 512)
            .with_serializer(RawSerializer)
            .with_compaction_config(CompactionConfig {
                period: Duration::from_millis(1),
                threshold: 0.0,
                enabled: true,
            })
            .build()
            .unwrap(),
    );
    let value = |key: u64| vec![key as u8; 8 + (key as usize % 8)];

    // Interleave live and churned keys so invalidation fragments the segments.
    for key in 0..LIVE * 2 {
        cache.put(key, value(key)).unwrap();
    }
    for key in (1..LIVE * 2).step_by(2) {
        cache.invalidate(&key).unwrap();
    }

    let stop = AtomicBool::new(false);
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    for key in (0..LIVE * 2).step_by(2) {
                        assert_eq!(cache.get(&key).unwrap(), Some(value(key)));
                    }
                }
            });
        }
        s.spawn(|| {
            let mut rng = rand::rng();
            while !stop.load(Ordering::Relaxed) {
                let key = 1000 + rng.random_range(0..64u64);
                if rng.random_bool(0.5) {
                    cache.put(key, vec![0xff; rng.random_range(1..32)]).unwrap();
                } else {
                    cache.invalidate(&key).unwrap();
                }
            }
        });

        let start = Instant::now();
        while cache.statistics().relocations() == 0 && start.elapsed() < Duration::from_secs(10) {
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::Relaxed);
    });

    assert!(cache.statistics().relocations() > 0);
    cache.close();
    for key in (0..LIVE * 2).step_by(2) {
        assert_eq!(cache.get(&key).unwrap(), Some(value(key)));
    }
    assert_eq!(cache.store().statistics().consistency_violations(), 0);
}

#[test_log::test]
fn test_concurrent_random_operations() {
    let cache = Arc::new(
        OffHeapCache::<u64, Vec<u8>>::builder("random")
            .with_capacity(100)
            .with_segments(16, 1024)
            .with_serializer(RawSerializer)
            .build()
            .unwrap(),
    );

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut rng = rand::rng();
                for _ in 0..2000 {
                    let key = rng.random_range(0..200u64);
                    match rng.random_range(0..3) {
                        0 => {
                            let len = rng.random_range(1..64);
                            cache.put(key, vec![key as u8; len]).unwrap();
                        }
                        1 => {
                            if let Some(value) = cache.get(&key).unwrap() {
                                assert!(value.iter().all(|b| *b == key as u8));
                            }
                        }
                        _ => {
                            cache.invalidate(&key).unwrap();
                        }
                    }
                }
            });
        }
    });

    assert!(cache.size() <= 100);
    cache.clear().unwrap();
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.store().used_bytes(), 0);
}

#[test]
fn test_registry_clears_every_backend() {
    let registry = CacheRegistry::new();
    let offheap = Arc::new(
        OffHeapCache::<u64, String>::builder("offheap")
            .with_serializer(RawSerializer)
            .build()
            .unwrap(),
    );
    let heap = Arc::new(HeapCacheBuilder::<u64, String>::new("heap").build().unwrap());
    registry.register(offheap.clone()).unwrap();
    registry.register(heap.clone()).unwrap();

    for i in 0..10 {
        offheap.put(i, i.to_string()).unwrap();
        heap.put(i, i.to_string()).unwrap();
    }
    registry.clear_all().unwrap();
    assert_eq!(offheap.size(), 0);
    assert_eq!(heap.size(), 0);
    assert_eq!(registry.names(), vec!["heap".to_string(), "offheap".to_string()]);
}
