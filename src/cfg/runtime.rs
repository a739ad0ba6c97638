// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering},
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    cfg::{
        config::Config,
        enums::{CrashReportingLevel, DataCollectionLevel},
    },
    protocol::{http::HttpClientConfig, status::StatusResponse},
    providers::session::SessionIdProvider,
};

/// Default interval between beacon sends (2 minutes).
pub const DEFAULT_SEND_INTERVAL_MS: i64 = 120 * 1000;
/// Default upper bound for a single beacon chunk (30 KiB).
pub const DEFAULT_MAX_BEACON_SIZE_BYTES: i32 = 30 * 1024;
/// Server id used until the cluster assigns one.
pub const DEFAULT_SERVER_ID: i32 = 1;
/// Default sampling multiplicity ("send every beacon").
pub const DEFAULT_MULTIPLICITY: i32 = 1;

/// Server-mutable runtime settings.
///
/// Primitive fields are atomics so a send pass can snapshot them without
/// blocking writers; compound updates from a status response take the
/// update mutex so one pass never observes a half-applied response.
pub struct RuntimeConfiguration {
    config: Config,
    session_id_provider: Arc<dyn SessionIdProvider>,

    capture: AtomicBool,
    send_interval_ms: AtomicI64,
    max_beacon_size_bytes: AtomicI32,
    capture_errors: AtomicBool,
    capture_crashes: AtomicBool,
    multiplicity: AtomicI32,
    server_id: AtomicI32,

    update_lock: Mutex<()>,
}

impl RuntimeConfiguration {
    pub fn new(config: Config, session_id_provider: Arc<dyn SessionIdProvider>) -> Self {
        Self {
            config,
            session_id_provider,
            capture: AtomicBool::new(true),
            send_interval_ms: AtomicI64::new(DEFAULT_SEND_INTERVAL_MS),
            max_beacon_size_bytes: AtomicI32::new(DEFAULT_MAX_BEACON_SIZE_BYTES),
            capture_errors: AtomicBool::new(true),
            capture_crashes: AtomicBool::new(true),
            multiplicity: AtomicI32::new(DEFAULT_MULTIPLICITY),
            server_id: AtomicI32::new(DEFAULT_SERVER_ID),
            update_lock: Mutex::new(()),
        }
    }

    /// The static, host-supplied part of the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Applies every recognized key of a successful status response.
    /// Absent keys leave their setting unchanged.
    pub fn update_from(&self, response: &StatusResponse) {
        let _guard = self.update_lock.lock();

        if let Some(capture) = response.capture() {
            self.capture.store(capture, Ordering::Release);
        }
        if let Some(interval) = response.send_interval_ms() {
            self.send_interval_ms.store(interval, Ordering::Release);
        }
        if let Some(size) = response.max_beacon_size_bytes() {
            self.max_beacon_size_bytes.store(size, Ordering::Release);
        }
        if let Some(server_id) = response.server_id() {
            self.server_id.store(server_id, Ordering::Release);
        }
        if let Some(multiplicity) = response.multiplicity() {
            self.multiplicity.store(multiplicity, Ordering::Release);
        }
        if let Some(errors) = response.capture_errors() {
            self.capture_errors.store(errors, Ordering::Release);
        }
        if let Some(crashes) = response.capture_crashes() {
            self.capture_crashes.store(crashes, Ordering::Release);
        }
        if let Some(name) = response.monitor_name() {
            debug!(monitor = name, "status response named the monitor");
        }
    }

    pub fn enable_capture(&self) {
        self.capture.store(true, Ordering::Release);
    }

    pub fn disable_capture(&self) {
        self.capture.store(false, Ordering::Release);
    }

    pub fn is_capture(&self) -> bool {
        self.capture.load(Ordering::Acquire)
    }

    pub fn send_interval_ms(&self) -> i64 {
        self.send_interval_ms.load(Ordering::Acquire)
    }

    pub fn max_beacon_size_bytes(&self) -> i32 {
        self.max_beacon_size_bytes.load(Ordering::Acquire)
    }

    pub fn is_capture_errors(&self) -> bool {
        self.capture_errors.load(Ordering::Acquire)
    }

    pub fn is_capture_crashes(&self) -> bool {
        self.capture_crashes.load(Ordering::Acquire)
    }

    pub fn multiplicity(&self) -> i32 {
        self.multiplicity.load(Ordering::Acquire)
    }

    pub fn server_id(&self) -> i32 {
        self.server_id.load(Ordering::Acquire)
    }

    /// Allocates the next session number.
    pub fn create_session_number(&self) -> i32 {
        self.session_id_provider.next_session_id()
    }

    /// Transport addressing derived from the current server id.
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig::new(
            self.config.application.endpoint_url.clone(),
            self.server_id(),
            self.config.application.application_id.clone(),
        )
    }

    /// Default per-session configuration derived from the host's privacy
    /// settings.
    pub fn default_beacon_configuration(&self) -> BeaconConfiguration {
        BeaconConfiguration::new(
            DEFAULT_MULTIPLICITY,
            self.config.privacy.data_collection_level,
            self.config.privacy.crash_reporting_level,
        )
    }
}

/// Per-session mutable configuration: the sampling multiplicity assigned
/// by the server plus the immutable privacy gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconConfiguration {
    pub multiplicity: i32,
    pub data_collection_level: DataCollectionLevel,
    pub crash_reporting_level: CrashReportingLevel,
}

impl BeaconConfiguration {
    pub fn new(
        multiplicity: i32,
        data_collection_level: DataCollectionLevel,
        crash_reporting_level: CrashReportingLevel,
    ) -> Self {
        Self {
            multiplicity,
            data_collection_level,
            crash_reporting_level,
        }
    }

    /// `multiplicity <= 0` turns the session's data off entirely.
    pub fn capture_allowed(&self) -> bool {
        self.multiplicity > 0
    }
}
