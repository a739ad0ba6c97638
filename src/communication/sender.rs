// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::communication::{
    context::BeaconSendingContext,
    states::{BeaconSendingState, SendingState},
};

/// How long `shutdown` waits for the worker before detaching it.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct WorkerFlags {
    running: bool,
}

#[derive(Default)]
struct WorkerState {
    flags: Mutex<WorkerFlags>,
    condvar: Condvar,
}

/// Owns the single send worker thread driving the state machine.
pub struct BeaconSender {
    context: Arc<BeaconSendingContext>,
    state: Arc<WorkerState>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BeaconSender {
    pub fn new(context: Arc<BeaconSendingContext>) -> Self {
        Self {
            context,
            state: Arc::new(WorkerState::default()),
            thread: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<BeaconSendingContext> {
        &self.context
    }

    /// Spawns the worker; idempotent. Returns `true` iff a thread was
    /// actually started.
    pub fn initialize(&self) -> bool {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            debug!("send worker is already running");
            return false;
        }
        self.state.flags.lock().running = true;

        let context = Arc::clone(&self.context);
        let state = Arc::clone(&self.state);
        *thread = Some(std::thread::spawn(move || run_sender(context, state)));
        true
    }

    pub fn is_alive(&self) -> bool {
        self.state.flags.lock().running
    }

    /// Blocks until init completed, shutdown, or timeout.
    pub fn wait_for_init_completion(&self, timeout_ms: Option<i64>) -> bool {
        self.context.wait_for_init_completion(timeout_ms)
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_init_completed()
    }

    /// Requests shutdown (the state machine flushes open sessions on its
    /// way out) and waits up to [`SHUTDOWN_TIMEOUT`] for the worker.
    pub fn shutdown(&self) -> bool {
        self.context.request_shutdown();

        let mut thread = self.thread.lock();
        let Some(handle) = thread.take() else {
            return false;
        };

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        {
            let mut flags = self.state.flags.lock();
            while flags.running {
                if self
                    .state
                    .condvar
                    .wait_until(&mut flags, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            if flags.running {
                drop(handle);
                return false;
            }
        }
        handle.join().is_ok()
    }
}

fn run_sender(context: Arc<BeaconSendingContext>, state: Arc<WorkerState>) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut current = SendingState::initial();
        while !current.is_terminal() {
            current.do_execute(&context);
            if context.is_shutdown_requested() && !current.is_terminal() {
                context.set_next_state(current.shutdown_state());
            }
            if let Some(next) = context.take_next_state() {
                debug!(from = current.name(), to = next.name(), "state transition");
                current = next;
            }
        }
        // terminal state raises the context shutdown flag exactly once
        current.do_execute(&context);
    }));

    if outcome.is_err() {
        error!("send worker aborted after a panic");
        context.set_init_completed(false);
    }

    let mut flags = state.flags.lock();
    flags.running = false;
    state.condvar.notify_all();
}
