// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    caching::cache::BeaconCache,
    cfg::config::CacheConfig,
    providers::time::TimingProvider,
};

/// Shared shape of the two eviction policies so the worker can run them
/// in a fixed order.
pub trait EvictionStrategy: Send {
    fn execute(&mut self);
}

/// Removes records that outlived `max_record_age_ms`.
///
/// Runs at most once per configured age interval, so a burst of cache
/// inserts does not turn into a scan storm.
pub struct TimeEvictionStrategy<F: Fn() -> bool + Send> {
    cache: Arc<BeaconCache>,
    config: CacheConfig,
    timing_provider: Arc<dyn TimingProvider>,
    stop_requested: F,
    last_run_timestamp: i64,
    disabled_logged: bool,
}

impl<F: Fn() -> bool + Send> TimeEvictionStrategy<F> {
    pub fn new(
        cache: Arc<BeaconCache>,
        config: CacheConfig,
        timing_provider: Arc<dyn TimingProvider>,
        stop_requested: F,
    ) -> Self {
        let last_run_timestamp = timing_provider.provide_timestamp_ms();
        Self {
            cache,
            config,
            timing_provider,
            stop_requested,
            last_run_timestamp,
            disabled_logged: false,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.config.max_record_age_ms <= 0
    }

    pub fn should_run(&self, now: i64) -> bool {
        now - self.last_run_timestamp >= self.config.max_record_age_ms
    }

    pub fn last_run_timestamp(&self) -> i64 {
        self.last_run_timestamp
    }

    fn do_execute(&mut self, now: i64) {
        let min_allowed_timestamp = now - self.config.max_record_age_ms;
        let mut total_evicted = 0u32;
        for session_number in self.cache.beacon_ids() {
            if (self.stop_requested)() {
                break;
            }
            total_evicted += self
                .cache
                .evict_records_by_age(session_number, min_allowed_timestamp);
        }
        if total_evicted > 0 {
            debug!(records = total_evicted, "evicted outdated records");
        }
        self.last_run_timestamp = now;
    }
}

impl<F: Fn() -> bool + Send> EvictionStrategy for TimeEvictionStrategy<F> {
    fn execute(&mut self) {
        if self.is_disabled() {
            if !self.disabled_logged {
                info!("time eviction is disabled");
                self.disabled_logged = true;
            }
            return;
        }
        let now = self.timing_provider.provide_timestamp_ms();
        if self.should_run(now) {
            self.do_execute(now);
        }
    }
}

/// Trims the cache back below the lower memory bound once the upper
/// bound is crossed, one record per session per sweep.
pub struct SpaceEvictionStrategy<F: Fn() -> bool + Send> {
    cache: Arc<BeaconCache>,
    config: CacheConfig,
    stop_requested: F,
    disabled_logged: bool,
}

impl<F: Fn() -> bool + Send> SpaceEvictionStrategy<F> {
    pub fn new(cache: Arc<BeaconCache>, config: CacheConfig, stop_requested: F) -> Self {
        Self {
            cache,
            config,
            stop_requested,
            disabled_logged: false,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.config.lower_memory_bytes <= 0
            || self.config.upper_memory_bytes <= 0
            || self.config.upper_memory_bytes <= self.config.lower_memory_bytes
    }

    pub fn should_run(&self) -> bool {
        self.cache.num_bytes_in_cache() > self.config.upper_memory_bytes
    }

    fn do_execute(&mut self) {
        while !(self.stop_requested)()
            && self.cache.num_bytes_in_cache() > self.config.lower_memory_bytes
        {
            let mut evicted_this_sweep = 0u32;
            for session_number in self.cache.beacon_ids() {
                if (self.stop_requested)()
                    || self.cache.num_bytes_in_cache() <= self.config.lower_memory_bytes
                {
                    break;
                }
                evicted_this_sweep += self.cache.evict_records_by_number(session_number, 1);
            }
            // Everything left is staged for transmission; the live queues
            // are dry and another sweep cannot make progress.
            if evicted_this_sweep == 0 {
                break;
            }
            debug!(records = evicted_this_sweep, "evicted records to reclaim space");
        }
    }
}

impl<F: Fn() -> bool + Send> EvictionStrategy for SpaceEvictionStrategy<F> {
    fn execute(&mut self) {
        if self.is_disabled() {
            if !self.disabled_logged {
                info!("space eviction is disabled");
                self.disabled_logged = true;
            }
            return;
        }
        if self.should_run() {
            self.do_execute();
        }
    }
}
