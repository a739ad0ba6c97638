// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc, Weak,
    atomic::{AtomicI64, Ordering},
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    cfg::runtime::BeaconConfiguration,
    communication::context::BeaconSendingContext,
    core::{
        action::RootActionImpl,
        api::{Action as _, RootAction, Session, WebRequestTracer},
        null_objects::{null_root_action, null_web_request_tracer},
        web_request::{TracerParent, WebRequestTracerImpl},
    },
    protocol::{beacon::Beacon, status::StatusResponse},
    providers::http::HttpClientProvider,
};

/// A live session. Serializes through its beacon and registers itself
/// with the send worker; `end` seals it exactly once via CAS on the end
/// timestamp.
pub struct SessionImpl {
    beacon: Arc<Beacon>,
    sender: Weak<BeaconSendingContext>,
    end_time: AtomicI64,
    open_root_actions: Mutex<Vec<Arc<RootActionImpl>>>,
    self_weak: OnceCell<Weak<SessionImpl>>,
}

impl SessionImpl {
    pub fn new(beacon: Arc<Beacon>, sender: Weak<BeaconSendingContext>) -> Arc<Self> {
        let session = Arc::new(Self {
            beacon,
            sender,
            end_time: AtomicI64::new(-1),
            open_root_actions: Mutex::new(Vec::new()),
            self_weak: OnceCell::new(),
        });
        let _ = session.self_weak.set(Arc::downgrade(&session));
        session
    }

    /// Records the session-start event. Called once right after
    /// construction.
    pub fn start(&self) {
        self.beacon.start_session();
    }

    pub fn session_number(&self) -> i32 {
        self.beacon.session_number()
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.load(Ordering::Acquire) != -1
    }

    pub fn end_time(&self) -> i64 {
        self.end_time.load(Ordering::Acquire)
    }

    pub(crate) fn root_action_ended(&self, action: &Arc<RootActionImpl>) {
        self.open_root_actions
            .lock()
            .retain(|candidate| !Arc::ptr_eq(candidate, action));
    }

    /// Transmits this session's cached records.
    pub fn send_beacon(
        &self,
        provider: &dyn HttpClientProvider,
    ) -> Option<StatusResponse> {
        self.beacon.send(provider)
    }

    pub fn is_beacon_empty(&self) -> bool {
        self.beacon.is_empty()
    }

    pub fn clear_captured_data(&self) {
        self.beacon.clear_data();
    }

    pub fn beacon_configuration(&self) -> BeaconConfiguration {
        self.beacon.beacon_configuration()
    }

    pub fn update_beacon_configuration(&self, multiplicity: i32) {
        let current = self.beacon.beacon_configuration();
        self.beacon.set_beacon_configuration(BeaconConfiguration::new(
            multiplicity,
            current.data_collection_level,
            current.crash_reporting_level,
        ));
    }
}

impl Session for SessionImpl {
    fn enter_action(&self, action_name: &str) -> Arc<dyn RootAction> {
        if action_name.is_empty() {
            warn!(
                session = self.session_number(),
                "enterAction: actionName must not be empty"
            );
            return null_root_action();
        }
        if self.is_ended() {
            return null_root_action();
        }
        let Some(this) = self.self_weak.get() else {
            return null_root_action();
        };
        let action =
            RootActionImpl::new(Arc::clone(&self.beacon), action_name, this.clone());
        self.open_root_actions.lock().push(Arc::clone(&action));
        action
    }

    fn identify_user(&self, user_tag: &str) {
        if user_tag.is_empty() {
            warn!(
                session = self.session_number(),
                "identifyUser: userTag must not be empty"
            );
            return;
        }
        if !self.is_ended() {
            self.beacon.identify_user(user_tag);
        }
    }

    fn report_crash(&self, error_name: &str, reason: &str, stacktrace: &str) {
        if error_name.is_empty() {
            warn!(
                session = self.session_number(),
                "reportCrash: errorName must not be empty"
            );
            return;
        }
        if !self.is_ended() {
            self.beacon.report_crash(error_name, reason, stacktrace);
        }
    }

    fn trace_web_request(&self, url: &str) -> Arc<dyn WebRequestTracer> {
        if url.is_empty() {
            warn!(
                session = self.session_number(),
                "traceWebRequest: url must not be empty"
            );
            return null_web_request_tracer();
        }
        if self.is_ended() {
            return null_web_request_tracer();
        }
        // Attached directly to the session; parent action id stays 0.
        WebRequestTracerImpl::new(
            Arc::clone(&self.beacon),
            TracerParent::Session,
            0,
            url,
        )
    }

    fn end(&self) {
        let end_time = self.beacon.current_timestamp();
        if self
            .end_time
            .compare_exchange(-1, end_time, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        debug!(session = self.session_number(), "ending session");

        // Leave every still-open root action before sealing the session.
        loop {
            let action = self.open_root_actions.lock().pop();
            match action {
                Some(action) => {
                    action.leave_action();
                },
                None => break,
            }
        }

        self.beacon.end_session(end_time);

        if let (Some(sender), Some(this)) = (
            self.sender.upgrade(),
            self.self_weak.get().and_then(Weak::upgrade),
        ) {
            sender.finish_session(&this);
        }
    }
}
