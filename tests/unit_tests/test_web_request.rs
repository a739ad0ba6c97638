// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, Weak};

use beaconkit_rs::{
    caching::cache::BeaconCache,
    cfg::enums::{CrashReportingLevel, DataCollectionLevel},
    core::{api::Session, session::SessionImpl},
};

use crate::unit_tests::common::{
    MockTimingProvider, TEST_SESSION_NUMBER, count_occurrences, drain_chunk,
    extract_i64_after, make_beacon, make_runtime,
};

fn started_session() -> (Arc<BeaconCache>, Arc<MockTimingProvider>, Arc<SessionImpl>) {
    let cache = Arc::new(BeaconCache::new());
    let clock = MockTimingProvider::new(1000);
    let runtime = make_runtime(
        DataCollectionLevel::UserBehavior,
        CrashReportingLevel::OptInCrashes,
    );
    let beacon = make_beacon(&cache, &runtime, &clock);
    let session = SessionImpl::new(beacon, Weak::new());
    session.start();
    (cache, clock, session)
}

#[test]
fn test_query_component_is_stripped_from_the_url() {
    // the query component never reaches the wire
    let (cache, _clock, session) = started_session();

    let tracer = session.trace_web_request("https://example.com/a?x=1&y=2");
    tracer.stop(200);

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert!(chunk.contains("na=https://example.com/a&"), "chunk was {chunk:?}");
    assert!(!chunk.contains("x=1"));
}

#[test]
fn test_invalid_scheme_records_unknown_url() {
    // a live tracer whose stored URL is the unknown marker
    let (cache, _clock, session) = started_session();

    let tracer = session.trace_web_request("1337://foo");
    assert!(!tracer.tag().is_empty(), "a live tracer still correlates");
    tracer.stop(200);

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert!(chunk.contains("na=<unknown>"), "chunk was {chunk:?}");
}

#[test]
fn test_empty_url_yields_the_sentinel() {
    // nothing is recorded for an absent URL
    let (cache, _clock, session) = started_session();
    let bytes_before = cache.num_bytes_in_cache();

    let tracer = session.trace_web_request("");
    assert!(tracer.tag().is_empty());
    tracer.stop(200);

    assert_eq!(cache.num_bytes_in_cache(), bytes_before);
}

#[test]
fn test_tag_carries_the_parent_action_id() {
    let (_cache, _clock, session) = started_session();

    let session_tracer = session.trace_web_request("https://example.com");
    // session start consumed sequence 1
    assert_eq!(
        session_tracer.tag(),
        format!("MT_3_1_device%5F42_{TEST_SESSION_NUMBER}_example%20app-id_0_7_2")
    );

    let action = session.enter_action("work");
    let action_tracer = action.trace_web_request("https://example.com");
    let tag = action_tracer.tag();
    let parent_field = tag.split('_').nth(6).expect("tag has 9 fields");
    assert_eq!(parent_field, "1", "tag was {tag:?}");
}

#[test]
fn test_stop_is_idempotent_and_freezes_mutators() {
    let (cache, clock, session) = started_session();

    let tracer = session.trace_web_request("https://example.com/dl");
    Arc::clone(&tracer).set_bytes_sent(128);
    clock.advance(300);
    tracer.stop(201);
    tracer.stop(500);
    Arc::clone(&tracer).set_bytes_received(9999);

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert_eq!(count_occurrences(&chunk, "et=30"), 1, "stopped exactly once");
    assert_eq!(extract_i64_after(&chunk, "et=30", "rc"), 201);
    assert_eq!(extract_i64_after(&chunk, "et=30", "bs"), 128);
    assert_eq!(extract_i64_after(&chunk, "et=30", "t1"), 300);
    assert!(!chunk.contains("br="), "late byte count must not appear");
}

#[test]
fn test_unset_counters_are_omitted() {
    let (cache, _clock, session) = started_session();

    let tracer = session.trace_web_request("https://example.com");
    tracer.stop(-1);

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert!(!chunk.contains("bs="));
    assert!(!chunk.contains("br="));
    assert!(!chunk.contains("rc="));
}

#[test]
fn test_start_restarts_the_timing() {
    let (cache, clock, session) = started_session();

    let tracer = session.trace_web_request("https://example.com");
    clock.set(1500);
    let tracer = tracer.start();
    clock.set(1800);
    tracer.stop(200);

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert_eq!(extract_i64_after(&chunk, "et=30", "t0"), 500);
    assert_eq!(extract_i64_after(&chunk, "et=30", "t1"), 300);
}

#[test]
fn test_bytes_are_recorded_when_set_before_stop() {
    let (cache, _clock, session) = started_session();

    session
        .trace_web_request("https://example.com")
        .set_bytes_sent(100)
        .set_bytes_received(2000)
        .stop(200);

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert_eq!(extract_i64_after(&chunk, "et=30", "bs"), 100);
    assert_eq!(extract_i64_after(&chunk, "et=30", "br"), 2000);
    assert_eq!(extract_i64_after(&chunk, "et=30", "rc"), 200);
}
