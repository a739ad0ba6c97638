// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::{
    cfg::runtime::RuntimeConfiguration,
    communication::{session_wrapper::SessionWrapper, states::SendingState},
    core::session::SessionImpl,
    protocol::{http::HttpClient, status::StatusResponse},
    providers::{http::HttpClientProvider, time::TimingProvider},
    utils::Suspender,
};

/// Latch observed by `wait_for_init_completion`: unset while the initial
/// handshake is in flight, then fixed to the outcome.
#[derive(Default)]
struct InitLatch {
    completed: Mutex<Option<bool>>,
    condvar: Condvar,
}

/// State shared between the send worker, the sending states and the
/// host-facing facade.
pub struct BeaconSendingContext {
    http_client_provider: Arc<dyn HttpClientProvider>,
    timing_provider: Arc<dyn TimingProvider>,
    configuration: Arc<RuntimeConfiguration>,
    suspender: Arc<dyn Suspender>,

    shutdown_requested: AtomicBool,
    init_latch: InitLatch,
    next_state: Mutex<Option<SendingState>>,

    sessions: Mutex<Vec<Arc<SessionWrapper>>>,
    last_open_session_send_time: AtomicI64,
    last_status_check_time: AtomicI64,
}

impl BeaconSendingContext {
    pub fn new(
        http_client_provider: Arc<dyn HttpClientProvider>,
        timing_provider: Arc<dyn TimingProvider>,
        configuration: Arc<RuntimeConfiguration>,
        suspender: Arc<dyn Suspender>,
    ) -> Self {
        Self {
            http_client_provider,
            timing_provider,
            configuration,
            suspender,
            shutdown_requested: AtomicBool::new(false),
            init_latch: InitLatch::default(),
            next_state: Mutex::new(None),
            sessions: Mutex::new(Vec::new()),
            last_open_session_send_time: AtomicI64::new(0),
            last_status_check_time: AtomicI64::new(0),
        }
    }

    pub fn configuration(&self) -> &Arc<RuntimeConfiguration> {
        &self.configuration
    }

    pub fn http_client_provider(&self) -> &dyn HttpClientProvider {
        self.http_client_provider.as_ref()
    }

    /// A fresh client per use so server-id redirects take effect.
    pub fn http_client(&self) -> Arc<dyn HttpClient> {
        self.http_client_provider
            .create_client(&self.configuration.http_client_config())
    }

    pub fn current_timestamp(&self) -> i64 {
        self.timing_provider.provide_timestamp_ms()
    }

    /// Interruptible sleep; returns early when shutdown is requested.
    pub fn sleep_ms(&self, millis: i64) {
        self.suspender.sleep(millis);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Sets the shutdown flag and wakes every suspended worker.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        self.suspender.wake();
        // unblock anyone stuck in wait_for_init_completion
        self.init_latch.condvar.notify_all();
    }

    pub fn set_init_completed(&self, success: bool) {
        let mut completed = self.init_latch.completed.lock();
        *completed = Some(success);
        self.init_latch.condvar.notify_all();
    }

    pub fn is_init_completed(&self) -> bool {
        self.init_latch.completed.lock().unwrap_or(false)
    }

    /// Blocks until the initial handshake finished, shutdown was
    /// requested, or the optional timeout expired. Returns the handshake
    /// outcome, `false` on timeout or shutdown.
    pub fn wait_for_init_completion(&self, timeout_ms: Option<i64>) -> bool {
        let deadline = timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms.max(0) as u64));
        let mut completed = self.init_latch.completed.lock();
        loop {
            if let Some(result) = *completed {
                return result;
            }
            if self.is_shutdown_requested() {
                return false;
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .init_latch
                        .condvar
                        .wait_until(&mut completed, deadline)
                        .timed_out()
                    {
                        return completed.unwrap_or(false);
                    }
                },
                None => self.init_latch.condvar.wait(&mut completed),
            }
        }
    }

    pub fn is_capture_on(&self) -> bool {
        self.configuration.is_capture()
    }

    /// Applies a successful status response; when the server turned
    /// capture off, all captured session data is discarded.
    pub fn handle_status_response(&self, response: &StatusResponse) {
        if !response.is_ok() {
            return;
        }
        self.configuration.update_from(response);
        if !self.configuration.is_capture() {
            self.clear_all_session_data();
        }
    }

    /// Server throttling and explicit capture-off both land here.
    pub fn disable_capture_and_clear(&self) {
        self.configuration.disable_capture();
        self.clear_all_session_data();
    }

    pub fn set_next_state(&self, state: SendingState) {
        *self.next_state.lock() = Some(state);
    }

    pub fn take_next_state(&self) -> Option<SendingState> {
        self.next_state.lock().take()
    }

    pub fn last_open_session_send_time(&self) -> i64 {
        self.last_open_session_send_time.load(Ordering::Acquire)
    }

    pub fn set_last_open_session_send_time(&self, timestamp: i64) {
        self.last_open_session_send_time.store(timestamp, Ordering::Release);
    }

    pub fn last_status_check_time(&self) -> i64 {
        self.last_status_check_time.load(Ordering::Acquire)
    }

    pub fn set_last_status_check_time(&self, timestamp: i64) {
        self.last_status_check_time.store(timestamp, Ordering::Release);
    }

    // --- session registry ---

    /// Registers a freshly created session as new (unconfigured).
    pub fn start_session(&self, session: Arc<SessionImpl>) {
        debug!(session = session.session_number(), "tracking new session");
        self.sessions
            .lock()
            .push(Arc::new(SessionWrapper::new(session)));
    }

    /// Marks a session as finished once the host ended it.
    pub fn finish_session(&self, session: &Arc<SessionImpl>) {
        debug!(session = session.session_number(), "session finished");
        let sessions = self.sessions.lock();
        if let Some(wrapper) = sessions
            .iter()
            .find(|wrapper| Arc::ptr_eq(wrapper.session(), session))
        {
            wrapper.mark_finished();
        }
    }

    pub fn get_all_new_sessions(&self) -> Vec<Arc<SessionWrapper>> {
        self.sessions
            .lock()
            .iter()
            .filter(|w| !w.is_beacon_configured())
            .cloned()
            .collect()
    }

    pub fn get_all_open_and_configured_sessions(&self) -> Vec<Arc<SessionWrapper>> {
        self.sessions
            .lock()
            .iter()
            .filter(|w| w.is_beacon_configured() && !w.is_session_finished())
            .cloned()
            .collect()
    }

    pub fn get_all_finished_and_configured_sessions(&self) -> Vec<Arc<SessionWrapper>> {
        self.sessions
            .lock()
            .iter()
            .filter(|w| w.is_beacon_configured() && w.is_session_finished())
            .cloned()
            .collect()
    }

    pub fn remove_session(&self, wrapper: &Arc<SessionWrapper>) {
        self.sessions
            .lock()
            .retain(|candidate| !Arc::ptr_eq(candidate, wrapper));
    }

    fn clear_all_session_data(&self) {
        let wrappers: Vec<_> = self.sessions.lock().iter().cloned().collect();
        for wrapper in wrappers {
            wrapper.session().clear_captured_data();
            if wrapper.is_session_finished() {
                self.remove_session(&wrapper);
            }
        }
    }
}
