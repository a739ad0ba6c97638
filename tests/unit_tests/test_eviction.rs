// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use beaconkit_rs::{
    caching::{
        cache::BeaconCache,
        evictor::BeaconCacheEvictor,
        strategies::{EvictionStrategy, SpaceEvictionStrategy, TimeEvictionStrategy},
    },
    cfg::config::CacheConfig,
    providers::time::TimingProvider,
};

use crate::unit_tests::common::MockTimingProvider;

fn cache_config(age: i64, lower: i64, upper: i64) -> CacheConfig {
    CacheConfig {
        max_record_age_ms: age,
        lower_memory_bytes: lower,
        upper_memory_bytes: upper,
    }
}

#[test]
fn test_time_eviction_removes_outdated_records() {
    let cache = Arc::new(BeaconCache::new());
    let clock = MockTimingProvider::new(0);
    cache.add_event_data(1, 0, "old record");
    cache.add_event_data(1, 800, "younger record");

    let mut strategy = TimeEvictionStrategy::new(
        Arc::clone(&cache),
        cache_config(1000, 0, 0),
        Arc::clone(&clock) as Arc<dyn TimingProvider>,
        || false,
    );

    // the interval has not elapsed yet
    clock.set(900);
    strategy.execute();
    assert_eq!(cache.beacon_ids().len(), 1);
    assert!(!cache.is_empty(1));

    // now it has; records older than (1500 - 1000) go away
    clock.set(1500);
    strategy.execute();
    let chunk = cache
        .get_next_beacon_chunk(1, "p", 1024, '&')
        .expect("session still has the younger record");
    assert_eq!(chunk, "p&younger record");
}

#[test]
fn test_time_eviction_runs_at_most_once_per_interval() {
    let cache = Arc::new(BeaconCache::new());
    let clock = MockTimingProvider::new(0);

    let mut strategy = TimeEvictionStrategy::new(
        Arc::clone(&cache),
        cache_config(1000, 0, 0),
        Arc::clone(&clock) as Arc<dyn TimingProvider>,
        || false,
    );

    clock.set(1500);
    strategy.execute();
    assert_eq!(strategy.last_run_timestamp(), 1500);

    // half an interval later nothing may happen
    cache.add_event_data(1, 0, "ancient");
    clock.set(2000);
    strategy.execute();
    assert!(!cache.is_empty(1));
}

#[test]
fn test_time_eviction_disabled_by_non_positive_age() {
    let cache = Arc::new(BeaconCache::new());
    let clock = MockTimingProvider::new(0);
    cache.add_event_data(1, 0, "ancient");

    let mut strategy = TimeEvictionStrategy::new(
        Arc::clone(&cache),
        cache_config(0, 0, 0),
        Arc::clone(&clock) as Arc<dyn TimingProvider>,
        || false,
    );
    assert!(strategy.is_disabled());

    clock.set(1_000_000);
    strategy.execute();
    assert!(!cache.is_empty(1));
}

#[test]
fn test_space_eviction_trims_down_to_the_lower_bound() {
    let cache = Arc::new(BeaconCache::new());
    let record = "x".repeat(50); // 58 bytes with overhead
    for i in 0..35 {
        cache.add_event_data(1, i, &record);
    }
    assert!(cache.num_bytes_in_cache() > 2000);

    let mut strategy =
        SpaceEvictionStrategy::new(Arc::clone(&cache), cache_config(0, 1000, 2000), || {
            false
        });
    strategy.execute();

    let bytes = cache.num_bytes_in_cache();
    assert!(bytes <= 1000, "cache must be trimmed below the lower bound");
    assert!(
        bytes > 1000 - 58,
        "eviction must stop as soon as the lower bound is reached"
    );
}

#[test]
fn test_space_eviction_only_runs_above_the_upper_bound() {
    let cache = Arc::new(BeaconCache::new());
    let record = "x".repeat(50);
    for i in 0..20 {
        // 1160 bytes, between the bounds
        cache.add_event_data(1, i, &record);
    }
    let before = cache.num_bytes_in_cache();

    let mut strategy =
        SpaceEvictionStrategy::new(Arc::clone(&cache), cache_config(0, 1000, 2000), || {
            false
        });
    assert!(!strategy.should_run());
    strategy.execute();
    assert_eq!(cache.num_bytes_in_cache(), before);
}

#[test]
fn test_space_eviction_disabled_configurations() {
    let cache = Arc::new(BeaconCache::new());
    for (lower, upper) in [(0, 2000), (1000, 0), (2000, 1000), (1000, 1000)] {
        let strategy =
            SpaceEvictionStrategy::new(Arc::clone(&cache), cache_config(0, lower, upper), || {
                false
            });
        assert!(strategy.is_disabled(), "lower={lower} upper={upper}");
    }
}

#[test]
fn test_space_eviction_honors_a_stop_request() {
    let cache = Arc::new(BeaconCache::new());
    let record = "x".repeat(50);
    for i in 0..35 {
        cache.add_event_data(1, i, &record);
    }
    let before = cache.num_bytes_in_cache();

    let mut strategy =
        SpaceEvictionStrategy::new(Arc::clone(&cache), cache_config(0, 1000, 2000), || {
            true
        });
    strategy.execute();
    assert_eq!(cache.num_bytes_in_cache(), before);
}

#[test]
fn test_evictor_worker_lifecycle_and_space_trimming() {
    let cache = Arc::new(BeaconCache::new());
    let clock = MockTimingProvider::new(0);
    let evictor = BeaconCacheEvictor::new(
        Arc::clone(&cache),
        cache_config(0, 100, 200),
        Arc::clone(&clock) as Arc<dyn TimingProvider>,
    );

    assert!(evictor.start());
    assert!(!evictor.start(), "second start must be a no-op");
    assert!(evictor.is_alive());

    // every insert notifies the worker; crossing the upper bound makes it trim
    let record = "x".repeat(20); // 28 bytes each
    for i in 0..10 {
        cache.add_event_data(1, i, &record);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while cache.num_bytes_in_cache() > 100 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(
        cache.num_bytes_in_cache() <= 100,
        "worker did not trim the cache in time"
    );

    assert!(evictor.stop(Duration::from_secs(5)));
    assert!(!evictor.is_alive());
    assert!(!evictor.stop(Duration::from_secs(1)), "stop after stop is a no-op");
}

#[test]
fn test_evictor_stop_and_join() {
    let cache = Arc::new(BeaconCache::new());
    let clock = MockTimingProvider::new(0);
    let evictor = BeaconCacheEvictor::new(
        Arc::clone(&cache),
        cache_config(0, 100, 200),
        Arc::clone(&clock) as Arc<dyn TimingProvider>,
    );

    assert!(evictor.start());
    assert!(evictor.stop_and_join());
    assert!(!evictor.is_alive());
}
