// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

/// A timed record of an outbound HTTP call made by the host application.
///
/// Obtained from [`Session::trace_web_request`] or
/// [`Action::trace_web_request`]. All mutators are no-ops once the tracer
/// was stopped.
pub trait WebRequestTracer: Send + Sync {
    /// Correlation header value for the traced request; attach it as the
    /// `X-dynaTrace` header. Empty when correlation is disabled.
    fn tag(&self) -> String;

    fn set_bytes_sent(self: Arc<Self>, bytes: i32) -> Arc<dyn WebRequestTracer>;

    fn set_bytes_received(self: Arc<Self>, bytes: i32) -> Arc<dyn WebRequestTracer>;

    /// Restarts the timing; without an explicit call the construction
    /// time counts as start.
    fn start(self: Arc<Self>) -> Arc<dyn WebRequestTracer>;

    /// Stops the tracer and records the response code. Idempotent.
    fn stop(&self, response_code: i32);
}

/// A timed unit of host-application work.
///
/// Every reporting method silently does nothing after the action was
/// left; the fluent receivers keep call chains alive regardless.
pub trait Action: Send + Sync {
    fn report_event(self: Arc<Self>, event_name: &str) -> Arc<dyn Action>;

    fn report_int_value(self: Arc<Self>, value_name: &str, value: i32) -> Arc<dyn Action>;

    fn report_double_value(self: Arc<Self>, value_name: &str, value: f64)
    -> Arc<dyn Action>;

    fn report_string_value(self: Arc<Self>, value_name: &str, value: &str)
    -> Arc<dyn Action>;

    fn report_error(
        self: Arc<Self>,
        error_name: &str,
        error_code: i32,
        reason: &str,
    ) -> Arc<dyn Action>;

    fn trace_web_request(&self, url: &str) -> Arc<dyn WebRequestTracer>;

    /// Seals the action. Returns the parent root action for child
    /// actions, `None` for root actions. Idempotent.
    fn leave_action(&self) -> Option<Arc<dyn RootAction>>;
}

/// A top-level action that may contain child actions.
pub trait RootAction: Action {
    fn enter_action(&self, action_name: &str) -> Arc<dyn Action>;
}

/// One user session. Ended exactly once; afterwards every entry point
/// degrades to a no-op object.
pub trait Session: Send + Sync {
    fn enter_action(&self, action_name: &str) -> Arc<dyn RootAction>;

    fn identify_user(&self, user_tag: &str);

    fn report_crash(&self, error_name: &str, reason: &str, stacktrace: &str);

    fn trace_web_request(&self, url: &str) -> Arc<dyn WebRequestTracer>;

    fn end(&self);
}
