// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;

use crate::protocol::{
    AGENT_TECHNOLOGY_TYPE, PLATFORM_TYPE, PROTOCOL_VERSION, encoding::percent_encode,
    status::StatusResponse,
};

/// Header carrying the web-request correlation tag on traced requests.
pub const WEB_REQUEST_TAG_HEADER: &str = "X-dynaTrace";

/// Everything a transport implementation needs to address the cluster.
///
/// Rebuilt whenever the server redirects the SDK to another server id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub server_id: i32,
    pub application_id: String,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>, server_id: i32, application_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            server_id,
            application_id: application_id.into(),
        }
    }

    /// Query URL shared by status, new-session and beacon-send requests.
    pub fn monitor_url(&self) -> String {
        format!(
            "{}?type=m&srvid={}&app={}&va={}&pt={}&tt={}",
            self.base_url,
            self.server_id,
            percent_encode(&self.application_id),
            PROTOCOL_VERSION,
            PLATFORM_TYPE,
            AGENT_TECHNOLOGY_TYPE,
        )
    }
}

/// Blocking transport driver.
///
/// Implementations issue the actual HTTP requests (GET for status and
/// new-session, POST with the serialized beacon as body) against
/// [`HttpClientConfig::monitor_url`] and parse the reply into a
/// [`StatusResponse`]. A transport-level failure (timeout, reset,
/// malformed body) is an `Err`; a well-formed reply with a non-2xx code
/// is an `Ok` response that reports itself erroneous.
pub trait HttpClient: Send + Sync {
    fn send_status_request(&self) -> Result<StatusResponse>;

    fn send_new_session_request(&self) -> Result<StatusResponse>;

    fn send_beacon_request(&self, client_ip: &str, beacon_data: &[u8])
    -> Result<StatusResponse>;
}
