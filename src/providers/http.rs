// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use crate::protocol::http::{HttpClient, HttpClientConfig};

/// Factory for transport clients.
///
/// A fresh client is requested for every send pass so a server-side
/// redirect to another server id takes effect on the next cycle.
pub trait HttpClientProvider: Send + Sync {
    fn create_client(&self, config: &HttpClientConfig) -> Arc<dyn HttpClient>;

    /// Called once per process before the first client is created.
    /// Transport libraries with process-wide state (TLS contexts, handle
    /// pools) initialize it here.
    fn global_init(&self) {}

    /// Called once per process after the last SDK instance is dropped.
    fn global_release(&self) {}
}
