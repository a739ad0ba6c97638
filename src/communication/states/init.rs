// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{debug, info};

use crate::communication::{
    context::BeaconSendingContext,
    request_util::send_status_request,
    states::{
        BeaconSendingCaptureOffState, BeaconSendingCaptureOnState, BeaconSendingState,
        BeaconSendingTerminalState, SendingState,
    },
};

/// Status-request attempts per cycle before falling back to a re-init
/// delay.
pub const MAX_INITIAL_STATUS_REQUEST_RETRIES: i32 = 5;
/// First backoff sleep; doubled on every retry.
pub const INITIAL_RETRY_SLEEP_TIME_MS: i64 = 1000;
/// Sleeps between full retry cycles; sticks at the last entry.
pub const REINIT_DELAYS_MS: [i64; 5] = [
    60 * 1000,
    5 * 60 * 1000,
    15 * 60 * 1000,
    60 * 60 * 1000,
    2 * 60 * 60 * 1000,
];

/// Performs the initial status handshake with bounded exponential
/// backoff and escalating re-init delays.
pub struct BeaconSendingInitState {
    reinit_delay_index: usize,
}

impl Default for BeaconSendingInitState {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconSendingInitState {
    pub fn new() -> Self {
        Self {
            reinit_delay_index: 0,
        }
    }
}

impl BeaconSendingState for BeaconSendingInitState {
    fn do_execute(&mut self, context: &BeaconSendingContext) {
        loop {
            let response = send_status_request(
                context,
                MAX_INITIAL_STATUS_REQUEST_RETRIES,
                INITIAL_RETRY_SLEEP_TIME_MS,
            );
            if context.is_shutdown_requested() {
                context.set_init_completed(false);
                return;
            }

            match response {
                Some(response) if response.is_too_many_requests() => {
                    info!(
                        retry_after_ms = response.retry_after_ms(),
                        "server is throttling, backing off with capture disabled"
                    );
                    context.disable_capture_and_clear();
                    context.set_next_state(SendingState::from(
                        BeaconSendingCaptureOffState::with_sleep(response.retry_after_ms()),
                    ));
                    return;
                },
                Some(response) if response.is_ok() => {
                    context.handle_status_response(&response);
                    context.set_init_completed(true);

                    let now = context.current_timestamp();
                    context.set_last_open_session_send_time(now);
                    context.set_last_status_check_time(now);

                    let next = if context.is_capture_on() {
                        SendingState::from(BeaconSendingCaptureOnState::new())
                    } else {
                        SendingState::from(BeaconSendingCaptureOffState::new())
                    };
                    context.set_next_state(next);
                    return;
                },
                _ => {
                    let delay = REINIT_DELAYS_MS[self.reinit_delay_index];
                    debug!(delay_ms = delay, "initial handshake failed, waiting to re-init");
                    context.sleep_ms(delay);
                    self.reinit_delay_index =
                        (self.reinit_delay_index + 1).min(REINIT_DELAYS_MS.len() - 1);
                },
            }
        }
    }

    fn shutdown_state(&self) -> SendingState {
        SendingState::from(BeaconSendingTerminalState)
    }

    fn name(&self) -> &'static str {
        "Initial"
    }
}
