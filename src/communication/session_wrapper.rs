// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI32, Ordering},
};

use crate::core::session::SessionImpl;

/// Attempts a new session gets before the send machine gives up on
/// configuring it and drops its data.
const MAX_NEW_SESSION_REQUESTS: i32 = 4;

/// Send-side bookkeeping around a session: whether the server confirmed
/// its beacon configuration, whether the host ended it, and how many
/// new-session request attempts are left.
pub struct SessionWrapper {
    session: Arc<SessionImpl>,
    beacon_configured: AtomicBool,
    session_finished: AtomicBool,
    new_session_requests_left: AtomicI32,
}

impl SessionWrapper {
    pub fn new(session: Arc<SessionImpl>) -> Self {
        Self {
            session,
            beacon_configured: AtomicBool::new(false),
            session_finished: AtomicBool::new(false),
            new_session_requests_left: AtomicI32::new(MAX_NEW_SESSION_REQUESTS),
        }
    }

    pub fn session(&self) -> &Arc<SessionImpl> {
        &self.session
    }

    pub fn is_beacon_configured(&self) -> bool {
        self.beacon_configured.load(Ordering::Acquire)
    }

    /// Applies the server-assigned multiplicity and marks the session
    /// configured.
    pub fn update_beacon_configuration(&self, multiplicity: i32) {
        self.session.update_beacon_configuration(multiplicity);
        self.beacon_configured.store(true, Ordering::Release);
    }

    pub fn is_session_finished(&self) -> bool {
        self.session_finished.load(Ordering::Acquire)
    }

    pub fn mark_finished(&self) {
        self.session_finished.store(true, Ordering::Release);
    }

    pub fn can_send_new_session_request(&self) -> bool {
        self.new_session_requests_left.load(Ordering::Acquire) > 0
    }

    pub fn decrease_new_session_requests(&self) {
        self.new_session_requests_left.fetch_sub(1, Ordering::AcqRel);
    }

    /// A session may transmit once it is configured with a positive
    /// multiplicity.
    pub fn is_data_sending_allowed(&self) -> bool {
        self.is_beacon_configured() && self.session.beacon_configuration().capture_allowed()
    }
}
