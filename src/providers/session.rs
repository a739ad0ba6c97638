// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::atomic::{AtomicI32, Ordering};

use rand::RngExt;

/// Allocates the 32-bit session numbers identifying beacons.
pub trait SessionIdProvider: Send + Sync {
    /// Next session number; always positive, wraps before overflow.
    fn next_session_id(&self) -> i32;
}

/// Monotonic allocator seeded at a random positive offset so session
/// numbers from different processes rarely collide.
#[derive(Debug)]
pub struct DefaultSessionIdProvider {
    current: AtomicI32,
}

impl Default for DefaultSessionIdProvider {
    fn default() -> Self {
        Self::with_initial_offset(rand::rng().random_range(0..i32::MAX))
    }
}

impl DefaultSessionIdProvider {
    pub fn with_initial_offset(offset: i32) -> Self {
        Self {
            current: AtomicI32::new(offset.max(0)),
        }
    }
}

impl SessionIdProvider for DefaultSessionIdProvider {
    fn next_session_id(&self) -> i32 {
        let previous = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current >= i32::MAX - 1 { 1 } else { current + 1 })
            })
            .unwrap_or_default();
        if previous >= i32::MAX - 1 { 1 } else { previous + 1 }
    }
}
