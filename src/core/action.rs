// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc, Weak,
    atomic::{AtomicI32, AtomicI64, Ordering},
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    core::{
        api::{Action, RootAction, WebRequestTracer},
        null_objects::{null_action, null_web_request_tracer},
        session::SessionImpl,
        web_request::{TracerParent, WebRequestTracerImpl},
    },
    protocol::beacon::{ActionData, Beacon},
};

/// State shared by root and child actions: identity, timing, sequence
/// numbers and the reporting entry points. Sealing is a CAS on the end
/// timestamp, which makes `leave_action` idempotent without a lock.
pub(crate) struct ActionCore {
    beacon: Arc<Beacon>,
    id: i32,
    parent_id: i32,
    name: String,
    start_time: i64,
    start_sequence_no: i32,
    end_time: AtomicI64,
    end_sequence_no: AtomicI32,
}

impl ActionCore {
    fn new(beacon: Arc<Beacon>, name: &str, parent_id: i32) -> Self {
        let id = beacon.create_id();
        let start_time = beacon.current_timestamp();
        let start_sequence_no = beacon.create_sequence_number();
        Self {
            beacon,
            id,
            parent_id,
            name: name.to_string(),
            start_time,
            start_sequence_no,
            end_time: AtomicI64::new(-1),
            end_sequence_no: AtomicI32::new(-1),
        }
    }

    fn is_left(&self) -> bool {
        self.end_time.load(Ordering::Acquire) != -1
    }

    /// First caller wins; everyone else observes the action as left.
    fn try_seal(&self) -> bool {
        let end_time = self.beacon.current_timestamp();
        self.end_time
            .compare_exchange(-1, end_time, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stamps the end sequence number and hands the sealed action to the
    /// beacon. Must run after every child object was closed.
    fn finish(&self) {
        let end_sequence_no = self.beacon.create_sequence_number();
        self.end_sequence_no.store(end_sequence_no, Ordering::Release);
        self.beacon.add_action(&ActionData {
            id: self.id,
            parent_id: self.parent_id,
            name: &self.name,
            start_time: self.start_time,
            end_time: self.end_time.load(Ordering::Acquire),
            start_sequence_no: self.start_sequence_no,
            end_sequence_no,
        });
    }

    fn report_event(&self, event_name: &str) {
        if event_name.is_empty() {
            warn!(action = self.id, "reportEvent: eventName must not be empty");
            return;
        }
        if !self.is_left() {
            self.beacon.report_event(self.id, event_name);
        }
    }

    fn report_int_value(&self, value_name: &str, value: i32) {
        if value_name.is_empty() {
            warn!(action = self.id, "reportValue (int): valueName must not be empty");
            return;
        }
        if !self.is_left() {
            self.beacon.report_int_value(self.id, value_name, value);
        }
    }

    fn report_double_value(&self, value_name: &str, value: f64) {
        if value_name.is_empty() {
            warn!(action = self.id, "reportValue (double): valueName must not be empty");
            return;
        }
        if !self.is_left() {
            self.beacon.report_double_value(self.id, value_name, value);
        }
    }

    fn report_string_value(&self, value_name: &str, value: &str) {
        if value_name.is_empty() {
            warn!(action = self.id, "reportValue (string): valueName must not be empty");
            return;
        }
        if !self.is_left() {
            self.beacon.report_string_value(self.id, value_name, value);
        }
    }

    fn report_error(&self, error_name: &str, error_code: i32, reason: &str) {
        if error_name.is_empty() {
            warn!(action = self.id, "reportError: errorName must not be empty");
            return;
        }
        if !self.is_left() {
            self.beacon.report_error(self.id, error_name, error_code, reason);
        }
    }

    /// Builds a tracer below this action, or a sentinel when the URL is
    /// absent or the action is already left. A URL with an invalid
    /// scheme still yields a live tracer; it records `<unknown>`.
    fn trace_web_request(
        &self,
        url: &str,
        parent: TracerParent,
        open_tracers: &Mutex<Vec<Arc<WebRequestTracerImpl>>>,
    ) -> Arc<dyn WebRequestTracer> {
        if url.is_empty() {
            warn!(action = self.id, "traceWebRequest: url must not be empty");
            return null_web_request_tracer();
        }
        if self.is_left() {
            return null_web_request_tracer();
        }
        let tracer =
            WebRequestTracerImpl::new(Arc::clone(&self.beacon), parent, self.id, url);
        open_tracers.lock().push(Arc::clone(&tracer));
        tracer
    }
}

fn drain_tracers(open_tracers: &Mutex<Vec<Arc<WebRequestTracerImpl>>>) {
    // Take the list first so a tracer's detach callback never re-enters
    // the lock we hold.
    let tracers: Vec<_> = open_tracers.lock().drain(..).collect();
    for tracer in tracers {
        tracer.close();
    }
}

fn remove_by_ptr<T>(list: &Mutex<Vec<Arc<T>>>, item: &Arc<T>) {
    list.lock().retain(|candidate| !Arc::ptr_eq(candidate, item));
}

/// A child action entered on a root action.
pub struct ActionImpl {
    core: ActionCore,
    parent: Weak<RootActionImpl>,
    open_tracers: Mutex<Vec<Arc<WebRequestTracerImpl>>>,
    self_weak: OnceCell<Weak<ActionImpl>>,
}

impl ActionImpl {
    pub(crate) fn new(
        beacon: Arc<Beacon>,
        name: &str,
        parent: &Arc<RootActionImpl>,
    ) -> Arc<Self> {
        let action = Arc::new(Self {
            core: ActionCore::new(beacon, name, parent.id()),
            parent: Arc::downgrade(parent),
            open_tracers: Mutex::new(Vec::new()),
            self_weak: OnceCell::new(),
        });
        let _ = action.self_weak.set(Arc::downgrade(&action));
        action
    }

    pub fn id(&self) -> i32 {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn start_sequence_no(&self) -> i32 {
        self.core.start_sequence_no
    }

    pub fn end_sequence_no(&self) -> i32 {
        self.core.end_sequence_no.load(Ordering::Acquire)
    }

    pub fn is_left(&self) -> bool {
        self.core.is_left()
    }

    pub(crate) fn on_tracer_closed(&self, tracer: &Arc<WebRequestTracerImpl>) {
        remove_by_ptr(&self.open_tracers, tracer);
    }
}

impl Action for ActionImpl {
    fn report_event(self: Arc<Self>, event_name: &str) -> Arc<dyn Action> {
        self.core.report_event(event_name);
        self
    }

    fn report_int_value(self: Arc<Self>, value_name: &str, value: i32) -> Arc<dyn Action> {
        self.core.report_int_value(value_name, value);
        self
    }

    fn report_double_value(
        self: Arc<Self>,
        value_name: &str,
        value: f64,
    ) -> Arc<dyn Action> {
        self.core.report_double_value(value_name, value);
        self
    }

    fn report_string_value(
        self: Arc<Self>,
        value_name: &str,
        value: &str,
    ) -> Arc<dyn Action> {
        self.core.report_string_value(value_name, value);
        self
    }

    fn report_error(
        self: Arc<Self>,
        error_name: &str,
        error_code: i32,
        reason: &str,
    ) -> Arc<dyn Action> {
        self.core.report_error(error_name, error_code, reason);
        self
    }

    fn trace_web_request(&self, url: &str) -> Arc<dyn WebRequestTracer> {
        let Some(this) = self.self_weak.get() else {
            return null_web_request_tracer();
        };
        self.core
            .trace_web_request(url, TracerParent::Child(this.clone()), &self.open_tracers)
    }

    fn leave_action(&self) -> Option<Arc<dyn RootAction>> {
        let parent = self.parent.upgrade();
        if !self.core.try_seal() {
            return parent.map(|p| p as Arc<dyn RootAction>);
        }
        debug!(action = self.core.id, name = %self.core.name, "leaving action");

        drain_tracers(&self.open_tracers);
        self.core.finish();

        if let (Some(parent), Some(this)) =
            (&parent, self.self_weak.get().and_then(Weak::upgrade))
        {
            parent.on_child_action_closed(&this);
        }
        parent.map(|p| p as Arc<dyn RootAction>)
    }
}

/// A top-level action; the only kind that may enter child actions.
pub struct RootActionImpl {
    core: ActionCore,
    session: Weak<SessionImpl>,
    open_child_actions: Mutex<Vec<Arc<ActionImpl>>>,
    open_tracers: Mutex<Vec<Arc<WebRequestTracerImpl>>>,
    self_weak: OnceCell<Weak<RootActionImpl>>,
}

impl RootActionImpl {
    pub(crate) fn new(
        beacon: Arc<Beacon>,
        name: &str,
        session: Weak<SessionImpl>,
    ) -> Arc<Self> {
        let action = Arc::new(Self {
            core: ActionCore::new(beacon, name, 0),
            session,
            open_child_actions: Mutex::new(Vec::new()),
            open_tracers: Mutex::new(Vec::new()),
            self_weak: OnceCell::new(),
        });
        let _ = action.self_weak.set(Arc::downgrade(&action));
        action
    }

    pub fn id(&self) -> i32 {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn start_sequence_no(&self) -> i32 {
        self.core.start_sequence_no
    }

    pub fn end_sequence_no(&self) -> i32 {
        self.core.end_sequence_no.load(Ordering::Acquire)
    }

    pub fn is_left(&self) -> bool {
        self.core.is_left()
    }

    pub(crate) fn on_child_action_closed(&self, child: &Arc<ActionImpl>) {
        remove_by_ptr(&self.open_child_actions, child);
    }

    pub(crate) fn on_tracer_closed(&self, tracer: &Arc<WebRequestTracerImpl>) {
        remove_by_ptr(&self.open_tracers, tracer);
    }
}

impl Action for RootActionImpl {
    fn report_event(self: Arc<Self>, event_name: &str) -> Arc<dyn Action> {
        self.core.report_event(event_name);
        self
    }

    fn report_int_value(self: Arc<Self>, value_name: &str, value: i32) -> Arc<dyn Action> {
        self.core.report_int_value(value_name, value);
        self
    }

    fn report_double_value(
        self: Arc<Self>,
        value_name: &str,
        value: f64,
    ) -> Arc<dyn Action> {
        self.core.report_double_value(value_name, value);
        self
    }

    fn report_string_value(
        self: Arc<Self>,
        value_name: &str,
        value: &str,
    ) -> Arc<dyn Action> {
        self.core.report_string_value(value_name, value);
        self
    }

    fn report_error(
        self: Arc<Self>,
        error_name: &str,
        error_code: i32,
        reason: &str,
    ) -> Arc<dyn Action> {
        self.core.report_error(error_name, error_code, reason);
        self
    }

    fn trace_web_request(&self, url: &str) -> Arc<dyn WebRequestTracer> {
        let Some(this) = self.self_weak.get() else {
            return null_web_request_tracer();
        };
        self.core
            .trace_web_request(url, TracerParent::Root(this.clone()), &self.open_tracers)
    }

    fn leave_action(&self) -> Option<Arc<dyn RootAction>> {
        if !self.core.try_seal() {
            return None;
        }
        debug!(action = self.core.id, name = %self.core.name, "leaving root action");

        // Children first: their end sequence numbers must precede ours.
        let children: Vec<_> = self.open_child_actions.lock().drain(..).collect();
        for child in children {
            child.leave_action();
        }
        drain_tracers(&self.open_tracers);

        self.core.finish();

        if let (Some(session), Some(this)) = (
            self.session.upgrade(),
            self.self_weak.get().and_then(Weak::upgrade),
        ) {
            session.root_action_ended(&this);
        }
        None
    }
}

impl RootAction for RootActionImpl {
    fn enter_action(&self, action_name: &str) -> Arc<dyn Action> {
        if action_name.is_empty() {
            warn!(action = self.core.id, "enterAction: actionName must not be empty");
            return null_action();
        }
        if self.core.is_left() {
            return null_action();
        }
        let Some(this) = self.self_weak.get().and_then(Weak::upgrade) else {
            return null_action();
        };
        let child = ActionImpl::new(Arc::clone(&self.core.beacon), action_name, &this);
        self.open_child_actions.lock().push(Arc::clone(&child));
        child
    }
}
