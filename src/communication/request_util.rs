// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::debug;

use crate::{communication::context::BeaconSendingContext, protocol::status::StatusResponse};

/// Issues a status request with bounded exponential backoff.
///
/// Retries up to `num_retries` times, doubling the sleep between
/// attempts; stops early on success, on a `429` (the caller must honor
/// `Retry-After`), or on shutdown. Returns the last response, which may
/// be erroneous or absent.
pub fn send_status_request(
    context: &BeaconSendingContext,
    num_retries: i32,
    initial_retry_delay_ms: i64,
) -> Option<StatusResponse> {
    let mut sleep_time_ms = initial_retry_delay_ms;
    let mut retry = 0;
    let mut last_response = None;

    loop {
        // Checked before each attempt so a shutdown that interrupted the
        // backoff sleep never triggers another request.
        if context.is_shutdown_requested() {
            return last_response;
        }

        last_response = match context.http_client().send_status_request() {
            Ok(response) => Some(response),
            Err(error) => {
                debug!(%error, "status request failed");
                None
            },
        };

        let stop_early = matches!(
            &last_response,
            Some(r) if r.is_ok() || r.is_too_many_requests()
        );
        if stop_early || retry >= num_retries {
            return last_response;
        }

        context.sleep_ms(sleep_time_ms);
        sleep_time_ms *= 2;
        retry += 1;
    }
}
