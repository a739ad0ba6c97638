// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::Utc;

/// Source of millisecond timestamps for every beacon record.
pub trait TimingProvider: Send + Sync {
    /// Current timestamp in milliseconds since the Unix epoch.
    fn provide_timestamp_ms(&self) -> i64;
}

/// Wall-clock provider used outside of tests.
#[derive(Debug, Default)]
pub struct DefaultTimingProvider;

impl TimingProvider for DefaultTimingProvider {
    fn provide_timestamp_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
