// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;

use thiserror::Error;

/// Fallback when a `429` carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_MS: i64 = 10 * 1000;

const RESPONSE_KEY_CAPTURE: &str = "cp";
const RESPONSE_KEY_SEND_INTERVAL: &str = "si";
const RESPONSE_KEY_MAX_BEACON_SIZE: &str = "bl";
const RESPONSE_KEY_MONITOR_NAME: &str = "bn";
const RESPONSE_KEY_SERVER_ID: &str = "id";
const RESPONSE_KEY_MULTIPLICITY: &str = "mp";
const RESPONSE_KEY_CAPTURE_ERRORS: &str = "er";
const RESPONSE_KEY_CAPTURE_CRASHES: &str = "cr";

const RETRY_AFTER_HEADER: &str = "retry-after";

const HTTP_TOO_MANY_REQUESTS: i32 = 429;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusParseError {
    #[error("malformed status token {0:?}")]
    MalformedToken(String),
    #[error("invalid numeric value {value:?} for key {key:?}")]
    InvalidNumber { key: String, value: String },
}

/// A parsed server status response.
///
/// Recognized keys are stored as options; an absent key leaves the
/// corresponding runtime setting unchanged when the response is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusResponse {
    response_code: i32,
    retry_after_ms: i64,
    capture: Option<bool>,
    send_interval_ms: Option<i64>,
    max_beacon_size_bytes: Option<i32>,
    monitor_name: Option<String>,
    server_id: Option<i32>,
    multiplicity: Option<i32>,
    capture_errors: Option<bool>,
    capture_crashes: Option<bool>,
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, StatusParseError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| StatusParseError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn retry_after_ms_from(headers: &HashMap<String, String>) -> i64 {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(RETRY_AFTER_HEADER))
        .and_then(|(_, value)| value.trim().parse::<i64>().ok())
        .map_or(DEFAULT_RETRY_AFTER_MS, |secs| secs * 1000)
}

impl StatusResponse {
    /// Parses a `key=value&key=value` response body together with the HTTP
    /// status code and response headers.
    ///
    /// Unknown keys are skipped; a token without `=` or a non-numeric
    /// value for a numeric key is a malformed body.
    pub fn parse(
        response_code: i32,
        body: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Self, StatusParseError> {
        let mut response = StatusResponse {
            response_code,
            retry_after_ms: retry_after_ms_from(headers),
            ..StatusResponse::default()
        };

        for token in body.split('&').filter(|t| !t.is_empty()) {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| StatusParseError::MalformedToken(token.to_string()))?;

            match key {
                RESPONSE_KEY_CAPTURE => {
                    response.capture = Some(parse_number::<i32>(key, value)? == 1);
                },
                RESPONSE_KEY_SEND_INTERVAL => {
                    // transferred in seconds
                    response.send_interval_ms =
                        Some(parse_number::<i64>(key, value)? * 1000);
                },
                RESPONSE_KEY_MAX_BEACON_SIZE => {
                    // transferred in KiB
                    response.max_beacon_size_bytes =
                        Some(parse_number::<i32>(key, value)? * 1024);
                },
                RESPONSE_KEY_MONITOR_NAME => {
                    response.monitor_name = Some(value.to_string());
                },
                RESPONSE_KEY_SERVER_ID => {
                    response.server_id = Some(parse_number::<i32>(key, value)?);
                },
                RESPONSE_KEY_MULTIPLICITY => {
                    response.multiplicity = Some(parse_number::<i32>(key, value)?);
                },
                RESPONSE_KEY_CAPTURE_ERRORS => {
                    response.capture_errors = Some(parse_number::<i32>(key, value)? != 0);
                },
                RESPONSE_KEY_CAPTURE_CRASHES => {
                    response.capture_crashes =
                        Some(parse_number::<i32>(key, value)? != 0);
                },
                _ => {},
            }
        }

        Ok(response)
    }

    /// Builds a response carrying only an HTTP status code (transport-level
    /// failures that still produced a status line).
    pub fn from_code(response_code: i32) -> Self {
        StatusResponse {
            response_code,
            retry_after_ms: DEFAULT_RETRY_AFTER_MS,
            ..StatusResponse::default()
        }
    }

    pub fn response_code(&self) -> i32 {
        self.response_code
    }

    /// `2xx` responses are successful; everything else leaves runtime
    /// configuration untouched.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.response_code)
    }

    pub fn is_erroneous(&self) -> bool {
        !self.is_ok()
    }

    pub fn is_too_many_requests(&self) -> bool {
        self.response_code == HTTP_TOO_MANY_REQUESTS
    }

    /// Server-requested back-off in milliseconds, only meaningful for
    /// `429` responses.
    pub fn retry_after_ms(&self) -> i64 {
        self.retry_after_ms
    }

    pub fn capture(&self) -> Option<bool> {
        self.capture
    }

    pub fn send_interval_ms(&self) -> Option<i64> {
        self.send_interval_ms
    }

    pub fn max_beacon_size_bytes(&self) -> Option<i32> {
        self.max_beacon_size_bytes
    }

    pub fn monitor_name(&self) -> Option<&str> {
        self.monitor_name.as_deref()
    }

    pub fn server_id(&self) -> Option<i32> {
        self.server_id
    }

    pub fn multiplicity(&self) -> Option<i32> {
        self.multiplicity
    }

    pub fn capture_errors(&self) -> Option<bool> {
        self.capture_errors
    }

    pub fn capture_crashes(&self) -> Option<bool> {
        self.capture_crashes
    }
}
