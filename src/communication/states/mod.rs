// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The closed set of beacon-sending states.
//!
//! Each state runs one `do_execute` pass against the shared context and
//! requests transitions through `context.set_next_state`. The worker
//! loop swaps states until a terminal one is reached; an external
//! shutdown request short-circuits through `shutdown_state`.

use enum_dispatch::enum_dispatch;

use crate::communication::context::BeaconSendingContext;

pub mod capture_off;
pub mod capture_on;
pub mod flush;
pub mod init;
pub mod terminal;

pub use capture_off::BeaconSendingCaptureOffState;
pub use capture_on::BeaconSendingCaptureOnState;
pub use flush::BeaconSendingFlushSessionsState;
pub use init::BeaconSendingInitState;
pub use terminal::BeaconSendingTerminalState;

#[enum_dispatch]
pub trait BeaconSendingState {
    /// One pass of this state's work.
    fn do_execute(&mut self, context: &BeaconSendingContext);

    /// State the scheduler jumps to when shutdown is requested while
    /// this state is current.
    fn shutdown_state(&self) -> SendingState;

    fn is_terminal(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

#[enum_dispatch(BeaconSendingState)]
pub enum SendingState {
    Init(BeaconSendingInitState),
    CaptureOn(BeaconSendingCaptureOnState),
    CaptureOff(BeaconSendingCaptureOffState),
    FlushSessions(BeaconSendingFlushSessionsState),
    Terminal(BeaconSendingTerminalState),
}

impl SendingState {
    /// Entry state of a fresh send worker.
    pub fn initial() -> Self {
        SendingState::Init(BeaconSendingInitState::new())
    }
}
