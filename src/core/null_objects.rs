// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Type-preserving no-op objects.
//!
//! Returned whenever a precondition fails or the SDK is shut down; they
//! satisfy the public traits, perform no work and carry no state, so a
//! single process-wide instance of each suffices.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::core::api::{Action, RootAction, Session, WebRequestTracer};

pub struct NullSession;
pub struct NullRootAction;
pub struct NullAction;
pub struct NullWebRequestTracer;

static NULL_SESSION: Lazy<Arc<NullSession>> = Lazy::new(|| Arc::new(NullSession));
static NULL_ROOT_ACTION: Lazy<Arc<NullRootAction>> =
    Lazy::new(|| Arc::new(NullRootAction));
static NULL_ACTION: Lazy<Arc<NullAction>> = Lazy::new(|| Arc::new(NullAction));
static NULL_WEB_REQUEST_TRACER: Lazy<Arc<NullWebRequestTracer>> =
    Lazy::new(|| Arc::new(NullWebRequestTracer));

pub fn null_session() -> Arc<dyn Session> {
    Arc::clone(&*NULL_SESSION) as Arc<dyn Session>
}

pub fn null_root_action() -> Arc<dyn RootAction> {
    Arc::clone(&*NULL_ROOT_ACTION) as Arc<dyn RootAction>
}

pub fn null_action() -> Arc<dyn Action> {
    Arc::clone(&*NULL_ACTION) as Arc<dyn Action>
}

pub fn null_web_request_tracer() -> Arc<dyn WebRequestTracer> {
    Arc::clone(&*NULL_WEB_REQUEST_TRACER) as Arc<dyn WebRequestTracer>
}

impl Session for NullSession {
    fn enter_action(&self, _action_name: &str) -> Arc<dyn RootAction> {
        null_root_action()
    }

    fn identify_user(&self, _user_tag: &str) {}

    fn report_crash(&self, _error_name: &str, _reason: &str, _stacktrace: &str) {}

    fn trace_web_request(&self, _url: &str) -> Arc<dyn WebRequestTracer> {
        null_web_request_tracer()
    }

    fn end(&self) {}
}

impl Action for NullRootAction {
    fn report_event(self: Arc<Self>, _event_name: &str) -> Arc<dyn Action> {
        self
    }

    fn report_int_value(self: Arc<Self>, _value_name: &str, _value: i32) -> Arc<dyn Action> {
        self
    }

    fn report_double_value(
        self: Arc<Self>,
        _value_name: &str,
        _value: f64,
    ) -> Arc<dyn Action> {
        self
    }

    fn report_string_value(
        self: Arc<Self>,
        _value_name: &str,
        _value: &str,
    ) -> Arc<dyn Action> {
        self
    }

    fn report_error(
        self: Arc<Self>,
        _error_name: &str,
        _error_code: i32,
        _reason: &str,
    ) -> Arc<dyn Action> {
        self
    }

    fn trace_web_request(&self, _url: &str) -> Arc<dyn WebRequestTracer> {
        null_web_request_tracer()
    }

    fn leave_action(&self) -> Option<Arc<dyn RootAction>> {
        None
    }
}

impl RootAction for NullRootAction {
    fn enter_action(&self, _action_name: &str) -> Arc<dyn Action> {
        null_action()
    }
}

impl Action for NullAction {
    fn report_event(self: Arc<Self>, _event_name: &str) -> Arc<dyn Action> {
        self
    }

    fn report_int_value(self: Arc<Self>, _value_name: &str, _value: i32) -> Arc<dyn Action> {
        self
    }

    fn report_double_value(
        self: Arc<Self>,
        _value_name: &str,
        _value: f64,
    ) -> Arc<dyn Action> {
        self
    }

    fn report_string_value(
        self: Arc<Self>,
        _value_name: &str,
        _value: &str,
    ) -> Arc<dyn Action> {
        self
    }

    fn report_error(
        self: Arc<Self>,
        _error_name: &str,
        _error_code: i32,
        _reason: &str,
    ) -> Arc<dyn Action> {
        self
    }

    fn trace_web_request(&self, _url: &str) -> Arc<dyn WebRequestTracer> {
        null_web_request_tracer()
    }

    fn leave_action(&self) -> Option<Arc<dyn RootAction>> {
        Some(null_root_action())
    }
}

impl WebRequestTracer for NullWebRequestTracer {
    fn tag(&self) -> String {
        String::new()
    }

    fn set_bytes_sent(self: Arc<Self>, _bytes: i32) -> Arc<dyn WebRequestTracer> {
        self
    }

    fn set_bytes_received(self: Arc<Self>, _bytes: i32) -> Arc<dyn WebRequestTracer> {
        self
    }

    fn start(self: Arc<Self>) -> Arc<dyn WebRequestTracer> {
        self
    }

    fn stop(&self, _response_code: i32) {}
}
