// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;

use anyhow::Result;
use beaconkit_rs::protocol::status::{DEFAULT_RETRY_AFTER_MS, StatusResponse};

fn no_headers() -> HashMap<String, String> {
    HashMap::new()
}

#[test]
fn test_all_recognized_keys() -> Result<()> {
    let response = StatusResponse::parse(
        200,
        "cp=1&si=120&bl=30&bn=monitor&id=5&mp=2&er=1&cr=0",
        &no_headers(),
    )?;

    assert_eq!(response.capture(), Some(true));
    assert_eq!(response.send_interval_ms(), Some(120_000));
    assert_eq!(response.max_beacon_size_bytes(), Some(30 * 1024));
    assert_eq!(response.monitor_name(), Some("monitor"));
    assert_eq!(response.server_id(), Some(5));
    assert_eq!(response.multiplicity(), Some(2));
    assert_eq!(response.capture_errors(), Some(true));
    assert_eq!(response.capture_crashes(), Some(false));
    assert!(response.is_ok());
    Ok(())
}

#[test]
fn test_absent_keys_stay_unset() -> Result<()> {
    let response = StatusResponse::parse(200, "cp=0", &no_headers())?;

    assert_eq!(response.capture(), Some(false));
    assert_eq!(response.send_interval_ms(), None);
    assert_eq!(response.max_beacon_size_bytes(), None);
    assert_eq!(response.server_id(), None);
    assert_eq!(response.multiplicity(), None);
    Ok(())
}

#[test]
fn test_empty_body_and_unknown_keys() -> Result<()> {
    assert!(StatusResponse::parse(200, "", &no_headers()).is_ok());
    let response = StatusResponse::parse(200, "xx=1&yy=abc", &no_headers())?;
    assert_eq!(response.capture(), None);
    Ok(())
}

#[test]
fn test_malformed_body_is_rejected() {
    assert!(StatusResponse::parse(200, "cp", &no_headers()).is_err());
    assert!(StatusResponse::parse(200, "si=abc", &no_headers()).is_err());
    assert!(StatusResponse::parse(200, "cp=1&mp=", &no_headers()).is_err());
}

#[test]
fn test_status_code_classification() -> Result<()> {
    assert!(StatusResponse::parse(200, "", &no_headers())?.is_ok());
    assert!(StatusResponse::parse(299, "", &no_headers())?.is_ok());
    assert!(StatusResponse::parse(300, "", &no_headers())?.is_erroneous());
    assert!(StatusResponse::parse(400, "", &no_headers())?.is_erroneous());

    let throttled = StatusResponse::parse(429, "", &no_headers())?;
    assert!(throttled.is_erroneous());
    assert!(throttled.is_too_many_requests());
    Ok(())
}

#[test]
fn test_retry_after_header_in_seconds() -> Result<()> {
    let headers = HashMap::from([("Retry-After".to_string(), "1234".to_string())]);
    let response = StatusResponse::parse(429, "", &headers)?;
    assert_eq!(response.retry_after_ms(), 1_234_000);

    // header names are case-insensitive
    let headers = HashMap::from([("retry-after".to_string(), "2".to_string())]);
    let response = StatusResponse::parse(429, "", &headers)?;
    assert_eq!(response.retry_after_ms(), 2_000);
    Ok(())
}

#[test]
fn test_retry_after_defaults_to_ten_seconds() -> Result<()> {
    let response = StatusResponse::parse(429, "", &no_headers())?;
    assert_eq!(response.retry_after_ms(), DEFAULT_RETRY_AFTER_MS);

    let headers = HashMap::from([("Retry-After".to_string(), "soon".to_string())]);
    let response = StatusResponse::parse(429, "", &headers)?;
    assert_eq!(response.retry_after_ms(), DEFAULT_RETRY_AFTER_MS);
    Ok(())
}

#[test]
fn test_from_code_carries_no_settings() {
    let response = StatusResponse::from_code(500);
    assert!(response.is_erroneous());
    assert_eq!(response.capture(), None);
    assert_eq!(response.response_code(), 500);
}
