// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rand::RngExt;

/// Randomness seam, used for the anonymized per-beacon device id.
pub trait PrngProvider: Send + Sync {
    /// Uniformly distributed non-negative 63-bit integer.
    fn next_positive_i64(&self) -> i64;
}

/// Thread-local OS-seeded generator.
#[derive(Debug, Default)]
pub struct DefaultPrngProvider;

impl PrngProvider for DefaultPrngProvider {
    fn next_positive_i64(&self) -> i64 {
        rand::rng().random_range(0..i64::MAX)
    }
}
