// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{debug, info};

use crate::{
    cfg::runtime::DEFAULT_MULTIPLICITY,
    communication::{
        context::BeaconSendingContext,
        states::{
            BeaconSendingCaptureOffState, BeaconSendingFlushSessionsState,
            BeaconSendingState, SendingState,
        },
    },
    protocol::status::StatusResponse,
};

/// Steady-state sending: wakes every send interval, configures new
/// sessions, transmits finished sessions and periodically flushes the
/// still-open ones.
pub struct BeaconSendingCaptureOnState;

impl Default for BeaconSendingCaptureOnState {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconSendingCaptureOnState {
    pub fn new() -> Self {
        Self
    }

    fn handle_new_sessions(&self, context: &BeaconSendingContext) {
        for wrapper in context.get_all_new_sessions() {
            if !wrapper.can_send_new_session_request() {
                // request budget exhausted; this session's data is dropped
                wrapper.update_beacon_configuration(0);
                continue;
            }
            match context.http_client().send_new_session_request() {
                Ok(response) if response.is_ok() => {
                    let multiplicity =
                        response.multiplicity().unwrap_or(DEFAULT_MULTIPLICITY);
                    wrapper.update_beacon_configuration(multiplicity);
                },
                _ => wrapper.decrease_new_session_requests(),
            }
        }
    }

    /// Sends every finished session. Successful sessions leave the
    /// registry; a transport failure or server error keeps them for the
    /// next cycle.
    fn send_finished_sessions(
        &self,
        context: &BeaconSendingContext,
    ) -> Option<StatusResponse> {
        let mut last_response = None;
        for wrapper in context.get_all_finished_and_configured_sessions() {
            if !wrapper.is_data_sending_allowed() {
                wrapper.session().clear_captured_data();
                context.remove_session(&wrapper);
                continue;
            }
            match wrapper.session().send_beacon(context.http_client_provider()) {
                Some(response) if response.is_ok() => {
                    wrapper.session().clear_captured_data();
                    context.remove_session(&wrapper);
                    last_response = Some(response);
                },
                Some(response) if response.is_too_many_requests() => {
                    return Some(response);
                },
                _ => {
                    // records were rolled back into the cache; retry on
                    // the next cycle instead of hammering the server
                    break;
                },
            }
        }
        last_response
    }

    /// Sends open sessions once their last flush is older than the send
    /// interval.
    fn send_open_sessions(&self, context: &BeaconSendingContext) -> Option<StatusResponse> {
        let now = context.current_timestamp();
        let interval = context.configuration().send_interval_ms();
        if now <= context.last_open_session_send_time() + interval {
            return None;
        }

        let mut last_response = None;
        for wrapper in context.get_all_open_and_configured_sessions() {
            if !wrapper.is_data_sending_allowed() {
                wrapper.session().clear_captured_data();
                continue;
            }
            match wrapper.session().send_beacon(context.http_client_provider()) {
                Some(response) if response.is_too_many_requests() => {
                    return Some(response);
                },
                Some(response) => last_response = Some(response),
                None => {},
            }
        }
        context.set_last_open_session_send_time(now);
        last_response
    }

    fn move_to_capture_off(
        &self,
        context: &BeaconSendingContext,
        retry_after_ms: i64,
    ) {
        info!(retry_after_ms, "server is throttling, disabling capture");
        context.disable_capture_and_clear();
        context.set_next_state(SendingState::from(
            BeaconSendingCaptureOffState::with_sleep(retry_after_ms),
        ));
    }
}

impl BeaconSendingState for BeaconSendingCaptureOnState {
    fn do_execute(&mut self, context: &BeaconSendingContext) {
        context.sleep_ms(context.configuration().send_interval_ms());
        if context.is_shutdown_requested() {
            return;
        }

        self.handle_new_sessions(context);

        let finished_response = self.send_finished_sessions(context);
        if let Some(response) = &finished_response
            && response.is_too_many_requests()
        {
            self.move_to_capture_off(context, response.retry_after_ms());
            return;
        }

        let open_response = self.send_open_sessions(context);
        if let Some(response) = &open_response
            && response.is_too_many_requests()
        {
            self.move_to_capture_off(context, response.retry_after_ms());
            return;
        }

        if let Some(response) = open_response.or(finished_response) {
            context.handle_status_response(&response);
        }
        if !context.is_capture_on() {
            debug!("server disabled capture");
            context.set_next_state(SendingState::from(BeaconSendingCaptureOffState::new()));
        }
    }

    fn shutdown_state(&self) -> SendingState {
        SendingState::from(BeaconSendingFlushSessionsState)
    }

    fn name(&self) -> &'static str {
        "CaptureOn"
    }
}
