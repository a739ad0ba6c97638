// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc, Weak,
    atomic::{AtomicI32, AtomicI64, Ordering},
};

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::{
    core::{
        action::{ActionImpl, RootActionImpl},
        api::WebRequestTracer,
    },
    protocol::beacon::{Beacon, WebRequestData},
};

/// Stored in place of a URL whose scheme is not RFC-3986 valid.
pub const UNKNOWN_URL: &str = "<unknown>";

/// `^[A-Za-z][A-Za-z0-9+\-.]*://.+` without pulling in a regex engine.
pub(crate) fn is_valid_url_scheme(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once("://") else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn calculate_url_from(url: &str) -> String {
    if !is_valid_url_scheme(url) {
        warn!(url, "url does not have a valid scheme");
        return UNKNOWN_URL.to_string();
    }
    match url.split_once('?') {
        Some((base, _query)) => base.to_string(),
        None => url.to_string(),
    }
}

/// Owner of a tracer, reached through a weak back edge so the object
/// graph stays acyclic for ownership purposes.
pub(crate) enum TracerParent {
    Session,
    Root(Weak<RootActionImpl>),
    Child(Weak<ActionImpl>),
}

/// Live web-request tracer. Construction stamps the start timestamp and
/// start sequence number and derives the correlation tag.
pub struct WebRequestTracerImpl {
    beacon: Arc<Beacon>,
    parent: TracerParent,
    parent_action_id: i32,
    url: String,
    tag: String,

    start_sequence_no: i32,
    start_time: AtomicI64,
    end_time: AtomicI64,
    end_sequence_no: AtomicI32,
    response_code: AtomicI32,
    bytes_sent: AtomicI32,
    bytes_received: AtomicI32,

    self_weak: OnceCell<Weak<WebRequestTracerImpl>>,
}

impl WebRequestTracerImpl {
    pub(crate) fn new(
        beacon: Arc<Beacon>,
        parent: TracerParent,
        parent_action_id: i32,
        url: &str,
    ) -> Arc<Self> {
        let start_sequence_no = beacon.create_sequence_number();
        let start_time = beacon.current_timestamp();
        let tag = beacon.create_tag(parent_action_id, start_sequence_no);

        let tracer = Arc::new(Self {
            beacon,
            parent,
            parent_action_id,
            url: calculate_url_from(url),
            tag,
            start_sequence_no,
            start_time: AtomicI64::new(start_time),
            end_time: AtomicI64::new(-1),
            end_sequence_no: AtomicI32::new(-1),
            response_code: AtomicI32::new(-1),
            bytes_sent: AtomicI32::new(-1),
            bytes_received: AtomicI32::new(-1),
            self_weak: OnceCell::new(),
        });
        let _ = tracer.self_weak.set(Arc::downgrade(&tracer));
        tracer
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn start_sequence_no(&self) -> i32 {
        self.start_sequence_no
    }

    pub fn end_sequence_no(&self) -> i32 {
        self.end_sequence_no.load(Ordering::Acquire)
    }

    pub fn response_code(&self) -> i32 {
        self.response_code.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.end_time.load(Ordering::Acquire) != -1
    }

    /// Parent-initiated stop, keeping whatever response code was set.
    pub(crate) fn close(&self) {
        self.stop(self.response_code.load(Ordering::Acquire));
    }
}

impl WebRequestTracer for WebRequestTracerImpl {
    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn set_bytes_sent(self: Arc<Self>, bytes: i32) -> Arc<dyn WebRequestTracer> {
        if !self.is_stopped() {
            self.bytes_sent.store(bytes, Ordering::Release);
        }
        self
    }

    fn set_bytes_received(self: Arc<Self>, bytes: i32) -> Arc<dyn WebRequestTracer> {
        if !self.is_stopped() {
            self.bytes_received.store(bytes, Ordering::Release);
        }
        self
    }

    fn start(self: Arc<Self>) -> Arc<dyn WebRequestTracer> {
        if !self.is_stopped() {
            self.start_time
                .store(self.beacon.current_timestamp(), Ordering::Release);
        }
        self
    }

    fn stop(&self, response_code: i32) {
        let end_time = self.beacon.current_timestamp();
        if self
            .end_time
            .compare_exchange(-1, end_time, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // already stopped
            return;
        }
        debug!(url = %self.url, response_code, "web request stopped");

        self.response_code.store(response_code, Ordering::Release);
        let end_sequence_no = self.beacon.create_sequence_number();
        self.end_sequence_no.store(end_sequence_no, Ordering::Release);

        self.beacon.add_web_request(
            self.parent_action_id,
            &WebRequestData {
                url: &self.url,
                start_time: self.start_time.load(Ordering::Acquire),
                end_time,
                start_sequence_no: self.start_sequence_no,
                end_sequence_no,
                bytes_sent: self.bytes_sent.load(Ordering::Acquire),
                bytes_received: self.bytes_received.load(Ordering::Acquire),
                response_code,
            },
        );

        if let Some(this) = self.self_weak.get().and_then(Weak::upgrade) {
            match &self.parent {
                TracerParent::Session => {},
                TracerParent::Root(parent) => {
                    if let Some(parent) = parent.upgrade() {
                        parent.on_tracer_closed(&this);
                    }
                },
                TracerParent::Child(parent) => {
                    if let Some(parent) = parent.upgrade() {
                        parent.on_tracer_closed(&this);
                    }
                },
            }
        }
    }
}
