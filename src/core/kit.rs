// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    time::Duration,
};

use tracing::debug;

use crate::{
    caching::{cache::BeaconCache, evictor::BeaconCacheEvictor},
    cfg::{config::Config, runtime::RuntimeConfiguration},
    communication::{context::BeaconSendingContext, sender::BeaconSender},
    core::{api::Session, null_objects::null_session, session::SessionImpl},
    protocol::beacon::Beacon,
    providers::{
        http::HttpClientProvider,
        prng::{DefaultPrngProvider, PrngProvider},
        session::{DefaultSessionIdProvider, SessionIdProvider},
        thread::{DefaultThreadIdProvider, ThreadIdProvider},
        time::{DefaultTimingProvider, TimingProvider},
    },
    utils::{InterruptibleThreadSuspender, TransportGuard},
};

/// Grace period for the eviction worker during shutdown.
const EVICTOR_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// The SDK instance: wires cache, eviction worker, send worker and the
/// session factory together.
///
/// One instance owns exactly one eviction thread and one send thread.
/// After [`shutdown`](BeaconKit::shutdown), `create_session` degrades to
/// the no-op session.
pub struct BeaconKit {
    configuration: Arc<RuntimeConfiguration>,
    cache: Arc<BeaconCache>,
    evictor: BeaconCacheEvictor,
    sender: BeaconSender,

    thread_id_provider: Arc<dyn ThreadIdProvider>,
    timing_provider: Arc<dyn TimingProvider>,
    prng_provider: Arc<dyn PrngProvider>,

    shutdown: AtomicBool,
    _transport: TransportGuard,
}

impl BeaconKit {
    /// Builds an instance with the default in-process providers.
    pub fn new(config: Config, http_client_provider: Arc<dyn HttpClientProvider>) -> Self {
        Self::with_providers(
            config,
            http_client_provider,
            Arc::new(DefaultTimingProvider),
            Arc::new(DefaultThreadIdProvider),
            Arc::new(DefaultSessionIdProvider::default()),
            Arc::new(DefaultPrngProvider),
        )
    }

    /// Full provider injection, used by tests and embedders with their
    /// own timing or identity sources.
    pub fn with_providers(
        config: Config,
        http_client_provider: Arc<dyn HttpClientProvider>,
        timing_provider: Arc<dyn TimingProvider>,
        thread_id_provider: Arc<dyn ThreadIdProvider>,
        session_id_provider: Arc<dyn SessionIdProvider>,
        prng_provider: Arc<dyn PrngProvider>,
    ) -> Self {
        let transport = TransportGuard::acquire(Arc::clone(&http_client_provider));

        let configuration =
            Arc::new(RuntimeConfiguration::new(config, session_id_provider));
        let cache = Arc::new(BeaconCache::new());
        let evictor = BeaconCacheEvictor::new(
            Arc::clone(&cache),
            configuration.config().cache,
            Arc::clone(&timing_provider),
        );
        let context = Arc::new(BeaconSendingContext::new(
            http_client_provider,
            Arc::clone(&timing_provider),
            Arc::clone(&configuration),
            Arc::new(InterruptibleThreadSuspender::default()),
        ));
        let sender = BeaconSender::new(context);

        Self {
            configuration,
            cache,
            evictor,
            sender,
            thread_id_provider,
            timing_provider,
            prng_provider,
            shutdown: AtomicBool::new(false),
            _transport: transport,
        }
    }

    /// Starts the two background workers.
    pub fn initialize(&self) {
        self.evictor.start();
        self.sender.initialize();
    }

    /// Blocks until the initial server handshake finished. `None` waits
    /// indefinitely; returns `false` on timeout or shutdown.
    pub fn wait_for_init_completion(&self, timeout_ms: Option<i64>) -> bool {
        self.sender.wait_for_init_completion(timeout_ms)
    }

    pub fn is_initialized(&self) -> bool {
        self.sender.is_initialized()
    }

    /// Opens a session for the given client IP. Returns the no-op
    /// session once the SDK was shut down.
    pub fn create_session(&self, client_ip: &str) -> Arc<dyn Session> {
        if self.shutdown.load(Ordering::Acquire) {
            return null_session();
        }
        let beacon = Arc::new(Beacon::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.configuration),
            client_ip,
            Arc::clone(&self.thread_id_provider),
            Arc::clone(&self.timing_provider),
            self.prng_provider.as_ref(),
        ));
        let session = SessionImpl::new(beacon, Arc::downgrade(self.sender.context()));
        session.start();
        self.sender.context().start_session(Arc::clone(&session));
        session
    }

    /// Stops both workers; the send worker flushes open sessions on its
    /// way to the terminal state. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("shutting down");
        self.evictor.stop(EVICTOR_STOP_TIMEOUT);
        self.sender.shutdown();
    }
}

impl Drop for BeaconKit {
    fn drop(&mut self) {
        self.shutdown();
    }
}
