// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::debug;

use crate::communication::{
    context::BeaconSendingContext,
    request_util::send_status_request,
    states::{
        BeaconSendingCaptureOnState, BeaconSendingFlushSessionsState, BeaconSendingState,
        SendingState,
    },
};

/// Interval between status checks while capture is off (2 hours).
pub const STATUS_CHECK_INTERVAL_MS: i64 = 2 * 60 * 60 * 1000;

const STATUS_REQUEST_RETRIES: i32 = 5;
const INITIAL_RETRY_SLEEP_TIME_MS: i64 = 1000;

/// Capture is disabled; poll the server until it re-enables it.
///
/// An explicit sleep (a server `Retry-After`) is honored once; afterwards
/// the state falls back to the two-hour check interval.
pub struct BeaconSendingCaptureOffState {
    sleep_time_ms: Option<i64>,
}

impl Default for BeaconSendingCaptureOffState {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconSendingCaptureOffState {
    pub fn new() -> Self {
        Self {
            sleep_time_ms: None,
        }
    }

    pub fn with_sleep(sleep_time_ms: i64) -> Self {
        Self {
            sleep_time_ms: Some(sleep_time_ms),
        }
    }

    pub fn sleep_time_ms(&self) -> Option<i64> {
        self.sleep_time_ms
    }
}

impl BeaconSendingState for BeaconSendingCaptureOffState {
    fn do_execute(&mut self, context: &BeaconSendingContext) {
        context.disable_capture_and_clear();

        let current_time = context.current_timestamp();
        let delta = self.sleep_time_ms.take().unwrap_or_else(|| {
            STATUS_CHECK_INTERVAL_MS - (current_time - context.last_status_check_time())
        });
        if delta > 0 && !context.is_shutdown_requested() {
            context.sleep_ms(delta);
        }
        if context.is_shutdown_requested() {
            return;
        }

        let response = send_status_request(
            context,
            STATUS_REQUEST_RETRIES,
            INITIAL_RETRY_SLEEP_TIME_MS,
        );
        context.set_last_status_check_time(current_time);

        match response {
            Some(response) if response.is_too_many_requests() => {
                context.set_next_state(SendingState::from(
                    BeaconSendingCaptureOffState::with_sleep(response.retry_after_ms()),
                ));
            },
            Some(response) if response.is_ok() => {
                context.handle_status_response(&response);
                if context.is_capture_on() {
                    debug!("server re-enabled capture");
                    context.set_next_state(SendingState::from(
                        BeaconSendingCaptureOnState::new(),
                    ));
                }
            },
            _ => {
                // stay in capture-off, next wake follows the check interval
            },
        }
    }

    fn shutdown_state(&self) -> SendingState {
        SendingState::from(BeaconSendingFlushSessionsState)
    }

    fn name(&self) -> &'static str {
        "CaptureOff"
    }
}
