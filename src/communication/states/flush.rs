// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::debug;

use crate::{
    cfg::runtime::DEFAULT_MULTIPLICITY,
    communication::{
        context::BeaconSendingContext,
        states::{BeaconSendingState, BeaconSendingTerminalState, SendingState},
    },
    core::api::Session as _,
};

/// Final drain before termination: ends every open session and sends
/// whatever the privacy settings still allow.
pub struct BeaconSendingFlushSessionsState;

impl BeaconSendingState for BeaconSendingFlushSessionsState {
    fn do_execute(&mut self, context: &BeaconSendingContext) {
        debug!("flushing remaining sessions");

        // Sessions the server never confirmed get the default
        // multiplicity so their data still goes out.
        for wrapper in context.get_all_new_sessions() {
            wrapper.update_beacon_configuration(DEFAULT_MULTIPLICITY);
        }

        for wrapper in context.get_all_open_and_configured_sessions() {
            wrapper.session().end();
        }

        for wrapper in context.get_all_finished_and_configured_sessions() {
            if wrapper.is_data_sending_allowed() {
                let _ = wrapper.session().send_beacon(context.http_client_provider());
            }
            wrapper.session().clear_captured_data();
            context.remove_session(&wrapper);
        }

        context.set_next_state(SendingState::from(BeaconSendingTerminalState));
    }

    fn shutdown_state(&self) -> SendingState {
        SendingState::from(BeaconSendingTerminalState)
    }

    fn name(&self) -> &'static str {
        "FlushSessions"
    }
}
