// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Weak},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::{
    caching::{
        cache::{BeaconCache, CacheObserver},
        strategies::{EvictionStrategy, SpaceEvictionStrategy, TimeEvictionStrategy},
    },
    cfg::config::CacheConfig,
    providers::time::TimingProvider,
};

#[derive(Debug, Default)]
struct EvictorFlags {
    record_added: bool,
    stop: bool,
    observer_registered: bool,
    running: bool,
}

#[derive(Default)]
struct EvictorState {
    flags: Mutex<EvictorFlags>,
    condvar: Condvar,
}

impl EvictorState {
    fn is_stop_requested(&self) -> bool {
        self.flags.lock().stop
    }
}

impl CacheObserver for EvictorState {
    fn on_record_added(&self) {
        let mut flags = self.flags.lock();
        flags.record_added = true;
        self.condvar.notify_all();
    }
}

/// Owns the eviction worker thread.
///
/// The worker sleeps on a condition variable until the cache reports an
/// insert (or a stop request), then runs time eviction followed by space
/// eviction.
pub struct BeaconCacheEvictor {
    cache: Arc<BeaconCache>,
    config: CacheConfig,
    timing_provider: Arc<dyn TimingProvider>,
    state: Arc<EvictorState>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BeaconCacheEvictor {
    pub fn new(
        cache: Arc<BeaconCache>,
        config: CacheConfig,
        timing_provider: Arc<dyn TimingProvider>,
    ) -> Self {
        Self {
            cache,
            config,
            timing_provider,
            state: Arc::new(EvictorState::default()),
            thread: Mutex::new(None),
        }
    }

    /// Spawns the worker and blocks until it has registered itself as
    /// cache observer. Returns `true` iff a thread was actually started.
    pub fn start(&self) -> bool {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            debug!("eviction worker is already running");
            return false;
        }

        {
            let mut flags = self.state.flags.lock();
            flags.stop = false;
            flags.record_added = false;
            flags.observer_registered = false;
            flags.running = true;
        }

        let cache = Arc::clone(&self.cache);
        let config = self.config;
        let timing_provider = Arc::clone(&self.timing_provider);
        let state = Arc::clone(&self.state);

        *thread = Some(std::thread::spawn(move || {
            run_evictor(cache, config, timing_provider, state);
        }));

        // The caller may insert records right away; wait until the worker
        // observes the cache so nothing slips through unnoticed.
        let mut flags = self.state.flags.lock();
        while !flags.observer_registered {
            self.state.condvar.wait(&mut flags);
        }
        true
    }

    /// Signals the worker to stop and waits up to `timeout` for it to
    /// terminate; the thread is detached on timeout and exits on its own.
    pub fn stop(&self, timeout: Duration) -> bool {
        let mut thread = self.thread.lock();
        let Some(handle) = thread.take() else {
            return false;
        };

        let deadline = Instant::now() + timeout;
        {
            let mut flags = self.state.flags.lock();
            flags.stop = true;
            self.state.condvar.notify_all();
            while flags.running {
                if self
                    .state
                    .condvar
                    .wait_until(&mut flags, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            if flags.running {
                // Detach; the strategies poll the stop flag between
                // sessions and the thread exits promptly.
                drop(handle);
                return false;
            }
        }
        handle.join().is_ok()
    }

    /// Test variant: stop and join without a timeout.
    pub fn stop_and_join(&self) -> bool {
        let Some(handle) = self.thread.lock().take() else {
            return false;
        };
        {
            let mut flags = self.state.flags.lock();
            flags.stop = true;
            self.state.condvar.notify_all();
        }
        handle.join().is_ok()
    }

    pub fn is_alive(&self) -> bool {
        self.state.flags.lock().running
    }
}

fn run_evictor(
    cache: Arc<BeaconCache>,
    config: CacheConfig,
    timing_provider: Arc<dyn TimingProvider>,
    state: Arc<EvictorState>,
) {
    cache.register_observer(Arc::downgrade(&state) as Weak<dyn CacheObserver>);
    {
        let mut flags = state.flags.lock();
        flags.observer_registered = true;
        state.condvar.notify_all();
    }

    let time_stop = {
        let state = Arc::clone(&state);
        move || state.is_stop_requested()
    };
    let space_stop = {
        let state = Arc::clone(&state);
        move || state.is_stop_requested()
    };
    let mut strategies: Vec<Box<dyn EvictionStrategy>> = vec![
        Box::new(TimeEvictionStrategy::new(
            Arc::clone(&cache),
            config,
            timing_provider,
            time_stop,
        )),
        Box::new(SpaceEvictionStrategy::new(Arc::clone(&cache), config, space_stop)),
    ];

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        loop {
            {
                let mut flags = state.flags.lock();
                while !flags.record_added && !flags.stop {
                    state.condvar.wait(&mut flags);
                }
                if flags.stop {
                    break;
                }
                flags.record_added = false;
            }
            for strategy in &mut strategies {
                strategy.execute();
            }
        }
    }));

    if outcome.is_err() {
        error!("eviction worker aborted after a panic");
    }

    let mut flags = state.flags.lock();
    flags.running = false;
    state.condvar.notify_all();
}
