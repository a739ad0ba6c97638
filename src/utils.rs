// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::providers::http::HttpClientProvider;

/// Interruptible sleep primitive shared by the send worker.
///
/// A single wake-up is sticky: once [`wake`](Suspender::wake) was called,
/// every subsequent sleep returns immediately. This is exactly the
/// shutdown semantic the background workers need.
pub trait Suspender: Send + Sync {
    fn sleep(&self, millis: i64);
    fn wake(&self);
}

#[derive(Default)]
pub struct InterruptibleThreadSuspender {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl Suspender for InterruptibleThreadSuspender {
    fn sleep(&self, millis: i64) {
        if millis <= 0 {
            return;
        }
        let deadline = Instant::now() + Duration::from_millis(millis as u64);
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.condvar.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }
    }

    fn wake(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.condvar.notify_all();
    }
}

static TRANSPORT_INSTANCES: Mutex<usize> = Mutex::new(0);

/// Scoped owner of process-wide transport state.
///
/// The first SDK instance in the process triggers the provider's
/// `global_init`; dropping the last one triggers `global_release`.
pub struct TransportGuard {
    provider: Arc<dyn HttpClientProvider>,
}

impl TransportGuard {
    pub fn acquire(provider: Arc<dyn HttpClientProvider>) -> Self {
        let mut instances = TRANSPORT_INSTANCES.lock();
        if *instances == 0 {
            provider.global_init();
        }
        *instances += 1;
        Self { provider }
    }
}

impl Drop for TransportGuard {
    fn drop(&mut self) {
        let mut instances = TRANSPORT_INSTANCES.lock();
        *instances -= 1;
        if *instances == 0 {
            self.provider.global_release();
        }
    }
}
