// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::communication::{
    context::BeaconSendingContext,
    states::{BeaconSendingState, SendingState},
};

/// End of the line: raises the shutdown flag and never executes again.
pub struct BeaconSendingTerminalState;

impl BeaconSendingState for BeaconSendingTerminalState {
    fn do_execute(&mut self, context: &BeaconSendingContext) {
        context.request_shutdown();
    }

    fn shutdown_state(&self) -> SendingState {
        SendingState::from(BeaconSendingTerminalState)
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Terminal"
    }
}
