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

fn started_session(
    dl: DataCollectionLevel,
    cl: CrashReportingLevel,
) -> (Arc<BeaconCache>, Arc<MockTimingProvider>, Arc<SessionImpl>) {
    let cache = Arc::new(BeaconCache::new());
    let clock = MockTimingProvider::new(1000);
    let runtime = make_runtime(dl, cl);
    let beacon = make_beacon(&cache, &runtime, &clock);
    let session = SessionImpl::new(beacon, Weak::new());
    session.start();
    (cache, clock, session)
}

fn user_behavior_session() -> (Arc<BeaconCache>, Arc<MockTimingProvider>, Arc<SessionImpl>) {
    started_session(DataCollectionLevel::UserBehavior, CrashReportingLevel::OptInCrashes)
}

#[test]
fn test_scenario_full_session_with_value() {
    // one action with one reported value, then the session ends
    let (cache, clock, session) = user_behavior_session();

    let action = session.enter_action("A");
    clock.advance(50);
    Arc::clone(&action).report_int_value("v", 42);
    clock.advance(50);
    action.leave_action();
    clock.advance(50);
    session.end();

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert_eq!(count_occurrences(&chunk, "et=18"), 1, "one sessionStart");
    assert_eq!(count_occurrences(&chunk, "et=12"), 1, "one value");
    assert_eq!(count_occurrences(&chunk, "et=1&"), 1, "one action");
    assert_eq!(count_occurrences(&chunk, "et=19"), 1, "one sessionEnd");

    let action_start = extract_i64_after(&chunk, "et=1&", "s0");
    let value_seq = extract_i64_after(&chunk, "et=12", "s0");
    let action_end = extract_i64_after(&chunk, "et=1&", "s1");
    assert!(
        action_start < value_seq && value_seq < action_end,
        "expected s0={action_start} < value={value_seq} < s1={action_end}"
    );

    // records appear in the order they were added
    let start_pos = chunk.find("et=18").expect("sessionStart present");
    let value_pos = chunk.find("et=12").expect("value present");
    let action_pos = chunk.find("et=1&").expect("action present");
    let end_pos = chunk.find("et=19").expect("sessionEnd present");
    assert!(start_pos < value_pos && value_pos < action_pos && action_pos < end_pos);
}

#[test]
fn test_scenario_session_end_closes_action_hierarchy() {
    // the session is ended while root and child are still open
    let (cache, _clock, session) = user_behavior_session();

    let root = session.enter_action("A");
    let _child = root.enter_action("B");
    session.end();

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert_eq!(count_occurrences(&chunk, "et=1&"), 2, "both actions sealed");

    let child_end = extract_i64_after(&chunk, "na=B", "s1");
    let root_end = extract_i64_after(&chunk, "na=A", "s1");
    assert!(
        root_end > child_end,
        "root end {root_end} must follow child end {child_end}"
    );

    // leaving again changes nothing
    root.leave_action();
    assert!(cache.is_empty(TEST_SESSION_NUMBER));
}

#[test]
fn test_end_is_idempotent() {
    let (cache, _clock, session) = user_behavior_session();

    session.end();
    session.end();

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert_eq!(count_occurrences(&chunk, "et=19"), 1);
    assert!(session.is_ended());
}

#[test]
fn test_end_timestamp_is_monotonic() {
    let (_cache, clock, session) = user_behavior_session();
    clock.set(5000);
    session.end();
    assert_eq!(session.end_time(), 5000);
}

#[test]
fn test_empty_action_name_yields_noop_root_action() {
    let (cache, _clock, session) = user_behavior_session();
    let before = cache.num_bytes_in_cache();

    let action = session.enter_action("");
    Arc::clone(&action).report_event("evt");
    assert!(action.leave_action().is_none());

    assert_eq!(cache.num_bytes_in_cache(), before);
}

#[test]
fn test_ended_session_degrades_to_sentinels() {
    let (cache, _clock, session) = user_behavior_session();
    session.end();
    let before = cache.num_bytes_in_cache();

    let action = session.enter_action("late");
    action.leave_action();
    session.identify_user("user");
    session.report_crash("crash", "reason", "stack");
    let tracer = session.trace_web_request("https://example.com");
    tracer.stop(200);

    assert_eq!(cache.num_bytes_in_cache(), before);
}

#[test]
fn test_identify_user_and_crash_validation() {
    let (cache, _clock, session) = user_behavior_session();
    let before = cache.num_bytes_in_cache();

    session.identify_user("");
    session.report_crash("", "reason", "stack");
    assert_eq!(cache.num_bytes_in_cache(), before);

    session.identify_user("jane");
    session.report_crash("crash", "reason", "stack");
    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert_eq!(count_occurrences(&chunk, "et=60"), 1);
    assert_eq!(count_occurrences(&chunk, "et=50"), 1);
}

#[test]
fn test_crash_suppressed_without_opt_in() {
    let (cache, _clock, session) = started_session(
        DataCollectionLevel::UserBehavior,
        CrashReportingLevel::OptOutCrashes,
    );

    session.report_crash("crash", "reason", "stack");
    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert_eq!(count_occurrences(&chunk, "et=50"), 0);
}

#[test]
fn test_session_tracer_has_parent_zero() {
    let (cache, _clock, session) = user_behavior_session();

    let tracer = session.trace_web_request("https://example.com/res");
    tracer.stop(204);

    let chunk = drain_chunk(&cache, TEST_SESSION_NUMBER);
    assert_eq!(extract_i64_after(&chunk, "et=30", "pa"), 0);
    assert_eq!(extract_i64_after(&chunk, "et=30", "rc"), 204);
}
