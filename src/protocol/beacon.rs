// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicI32, Ordering},
};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    caching::cache::BeaconCache,
    cfg::{
        enums::DataCollectionLevel,
        runtime::{BeaconConfiguration, RuntimeConfiguration},
    },
    protocol::{
        AGENT_TECHNOLOGY_TYPE, AGENT_VERSION, PLATFORM_TYPE, PROTOCOL_VERSION,
        encoding::{
            MAX_NAME_LEN, MAX_REASON_LEN, MAX_STACKTRACE_LEN, percent_encode,
            percent_encode_with_reserved, truncate_chars, truncate_stacktrace,
        },
        event_type::EventType,
        status::StatusResponse,
    },
    providers::{
        http::HttpClientProvider, prng::PrngProvider, thread::ThreadIdProvider,
        time::TimingProvider,
    },
};

// basic data
const BEACON_KEY_PROTOCOL_VERSION: &str = "vv";
const BEACON_KEY_AGENT_VERSION: &str = "va";
const BEACON_KEY_APPLICATION_ID: &str = "ap";
const BEACON_KEY_APPLICATION_NAME: &str = "an";
const BEACON_KEY_APPLICATION_VERSION: &str = "vn";
const BEACON_KEY_PLATFORM_TYPE: &str = "pt";
const BEACON_KEY_AGENT_TECHNOLOGY: &str = "tt";
const BEACON_KEY_DEVICE_ID: &str = "vi";
const BEACON_KEY_SESSION_NUMBER: &str = "sn";
const BEACON_KEY_CLIENT_IP: &str = "ip";

// device data
const BEACON_KEY_DEVICE_OS: &str = "os";
const BEACON_KEY_DEVICE_MANUFACTURER: &str = "mf";
const BEACON_KEY_DEVICE_MODEL: &str = "md";

// privacy
const BEACON_KEY_DATA_COLLECTION_LEVEL: &str = "dl";
const BEACON_KEY_CRASH_REPORTING_LEVEL: &str = "cl";

// mutable block
const BEACON_KEY_MULTIPLICITY: &str = "mp";
const BEACON_KEY_SESSION_START_TIME: &str = "tv";
const BEACON_KEY_TRANSMISSION_TIME: &str = "tx";

// event records
const BEACON_KEY_EVENT_TYPE: &str = "et";
const BEACON_KEY_NAME: &str = "na";
const BEACON_KEY_THREAD_ID: &str = "it";
const BEACON_KEY_ACTION_ID: &str = "ca";
const BEACON_KEY_PARENT_ACTION_ID: &str = "pa";
const BEACON_KEY_START_SEQUENCE_NUMBER: &str = "s0";
const BEACON_KEY_TIME_0: &str = "t0";
const BEACON_KEY_END_SEQUENCE_NUMBER: &str = "s1";
const BEACON_KEY_TIME_1: &str = "t1";
const BEACON_KEY_VALUE: &str = "vl";
const BEACON_KEY_ERROR_CODE: &str = "ev";
const BEACON_KEY_ERROR_REASON: &str = "rs";
const BEACON_KEY_STACKTRACE: &str = "st";
const BEACON_KEY_BYTES_SENT: &str = "bs";
const BEACON_KEY_BYTES_RECEIVED: &str = "br";
const BEACON_KEY_RESPONSE_CODE: &str = "rc";

/// Record separator inside a beacon chunk.
pub const BEACON_DATA_DELIMITER: char = '&';

/// The web-request tag reserves its field separator on top of the
/// standard reserved set.
const TAG_RESERVED_CHARACTERS: [u8; 1] = [b'_'];
const TAG_PREFIX: &str = "MT";

/// Sealed action fields handed over for serialization.
#[derive(Debug, Clone, Copy)]
pub struct ActionData<'a> {
    pub id: i32,
    pub parent_id: i32,
    pub name: &'a str,
    pub start_time: i64,
    pub end_time: i64,
    pub start_sequence_no: i32,
    pub end_sequence_no: i32,
}

/// Stopped web-request fields handed over for serialization.
#[derive(Debug, Clone, Copy)]
pub struct WebRequestData<'a> {
    pub url: &'a str,
    pub start_time: i64,
    pub end_time: i64,
    pub start_sequence_no: i32,
    pub end_sequence_no: i32,
    pub bytes_sent: i32,
    pub bytes_received: i32,
    pub response_code: i32,
}

/// Serializer for one session's records and mediator of every write into
/// the beacon cache.
///
/// Owns the immutable basic-data prefix, the per-beacon effective device
/// id, and the session-unique id/sequence-number counters.
pub struct Beacon {
    cache: Arc<BeaconCache>,
    configuration: Arc<RuntimeConfiguration>,
    beacon_configuration: RwLock<BeaconConfiguration>,
    thread_id_provider: Arc<dyn ThreadIdProvider>,
    timing_provider: Arc<dyn TimingProvider>,

    session_number: i32,
    session_start_time: i64,
    client_ip: String,
    device_id: String,
    immutable_basic_data: String,

    next_id: AtomicI32,
    next_sequence_number: AtomicI32,
}

impl Beacon {
    pub fn new(
        cache: Arc<BeaconCache>,
        configuration: Arc<RuntimeConfiguration>,
        client_ip: impl Into<String>,
        thread_id_provider: Arc<dyn ThreadIdProvider>,
        timing_provider: Arc<dyn TimingProvider>,
        prng_provider: &dyn PrngProvider,
    ) -> Self {
        let beacon_configuration = configuration.default_beacon_configuration();
        let session_number = configuration.create_session_number();
        let session_start_time = timing_provider.provide_timestamp_ms();

        // Anything below the full collection level gets an anonymized
        // device id, freshly randomized for every beacon.
        let device_id = if beacon_configuration.data_collection_level
            == DataCollectionLevel::UserBehavior
        {
            configuration.config().application.device_id.clone()
        } else {
            prng_provider.next_positive_i64().to_string()
        };

        let mut beacon = Self {
            cache,
            configuration,
            beacon_configuration: RwLock::new(beacon_configuration),
            thread_id_provider,
            timing_provider,
            session_number,
            session_start_time,
            client_ip: client_ip.into(),
            device_id,
            immutable_basic_data: String::new(),
            next_id: AtomicI32::new(1),
            next_sequence_number: AtomicI32::new(1),
        };
        beacon.immutable_basic_data = beacon.create_immutable_beacon_data();
        beacon
    }

    /// Beacon-unique identifier, starting at 1.
    pub fn create_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }

    /// Beacon-unique sequence number, starting at 1.
    pub fn create_sequence_number(&self) -> i32 {
        self.next_sequence_number.fetch_add(1, Ordering::AcqRel)
    }

    pub fn current_timestamp(&self) -> i64 {
        self.timing_provider.provide_timestamp_ms()
    }

    pub fn session_number(&self) -> i32 {
        self.session_number
    }

    pub fn session_start_time(&self) -> i64 {
        self.session_start_time
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn beacon_configuration(&self) -> BeaconConfiguration {
        *self.beacon_configuration.read()
    }

    pub fn set_beacon_configuration(&self, configuration: BeaconConfiguration) {
        *self.beacon_configuration.write() = configuration;
    }

    fn data_collection_level(&self) -> DataCollectionLevel {
        self.beacon_configuration.read().data_collection_level
    }

    fn is_capture_disabled(&self) -> bool {
        !self.configuration.is_capture()
            || !self.beacon_configuration.read().capture_allowed()
    }

    /// Tag attached to outbound web requests so the server can stitch
    /// the trace together. Empty when correlation is forbidden.
    pub fn create_tag(&self, parent_action_id: i32, sequence_number: i32) -> String {
        if self.data_collection_level() == DataCollectionLevel::Off {
            return String::new();
        }
        format!(
            "{}_{}_{}_{}_{}_{}_{}_{}_{}",
            TAG_PREFIX,
            PROTOCOL_VERSION,
            self.configuration.server_id(),
            percent_encode_with_reserved(&self.device_id, &TAG_RESERVED_CHARACTERS),
            self.session_number,
            percent_encode_with_reserved(
                &self.configuration.config().application.application_id,
                &TAG_RESERVED_CHARACTERS,
            ),
            parent_action_id,
            self.thread_id_provider.thread_id(),
            sequence_number,
        )
    }

    /// Records the session-start event. Permitted at every privacy level.
    pub fn start_session(&self) {
        if self.is_capture_disabled() {
            return;
        }
        let mut data = self.create_basic_event_data(EventType::SessionStart, None);
        add_kv_i32(&mut data, BEACON_KEY_PARENT_ACTION_ID, 0);
        add_kv_i32(
            &mut data,
            BEACON_KEY_START_SEQUENCE_NUMBER,
            self.create_sequence_number(),
        );
        add_kv_i64(&mut data, BEACON_KEY_TIME_0, 0);
        self.cache
            .add_event_data(self.session_number, self.session_start_time, &data);
    }

    /// Records the session-end event.
    pub fn end_session(&self, session_end_time: i64) {
        if self.is_capture_disabled() || !self.data_collection_level().allows_timing_data()
        {
            return;
        }
        let mut data = self.create_basic_event_data(EventType::SessionEnd, None);
        add_kv_i32(&mut data, BEACON_KEY_PARENT_ACTION_ID, 0);
        add_kv_i32(
            &mut data,
            BEACON_KEY_START_SEQUENCE_NUMBER,
            self.create_sequence_number(),
        );
        add_kv_i64(
            &mut data,
            BEACON_KEY_TIME_0,
            self.time_since_session_start(session_end_time),
        );
        self.cache
            .add_event_data(self.session_number, session_end_time, &data);
    }

    /// Serializes a sealed action.
    pub fn add_action(&self, action: &ActionData<'_>) {
        if self.is_capture_disabled() || !self.data_collection_level().allows_timing_data()
        {
            return;
        }
        let mut data = self.create_basic_event_data(EventType::Action, Some(action.name));
        add_kv_i32(&mut data, BEACON_KEY_ACTION_ID, action.id);
        add_kv_i32(&mut data, BEACON_KEY_PARENT_ACTION_ID, action.parent_id);
        add_kv_i32(
            &mut data,
            BEACON_KEY_START_SEQUENCE_NUMBER,
            action.start_sequence_no,
        );
        add_kv_i64(
            &mut data,
            BEACON_KEY_TIME_0,
            self.time_since_session_start(action.start_time),
        );
        add_kv_i32(
            &mut data,
            BEACON_KEY_END_SEQUENCE_NUMBER,
            action.end_sequence_no,
        );
        add_kv_i64(&mut data, BEACON_KEY_TIME_1, action.end_time - action.start_time);
        self.cache
            .add_action_data(self.session_number, action.start_time, &data);
    }

    /// Serializes a stopped web request below the given parent action
    /// (0 when attached directly to the session).
    pub fn add_web_request(&self, parent_action_id: i32, request: &WebRequestData<'_>) {
        if self.is_capture_disabled() || !self.data_collection_level().allows_timing_data()
        {
            return;
        }
        let mut data =
            self.create_basic_event_data(EventType::WebRequest, Some(request.url));
        add_kv_i32(&mut data, BEACON_KEY_PARENT_ACTION_ID, parent_action_id);
        add_kv_i32(
            &mut data,
            BEACON_KEY_START_SEQUENCE_NUMBER,
            request.start_sequence_no,
        );
        add_kv_i64(
            &mut data,
            BEACON_KEY_TIME_0,
            self.time_since_session_start(request.start_time),
        );
        add_kv_i32(
            &mut data,
            BEACON_KEY_END_SEQUENCE_NUMBER,
            request.end_sequence_no,
        );
        add_kv_i64(
            &mut data,
            BEACON_KEY_TIME_1,
            request.end_time - request.start_time,
        );
        if request.bytes_sent > -1 {
            add_kv_i32(&mut data, BEACON_KEY_BYTES_SENT, request.bytes_sent);
        }
        if request.bytes_received > -1 {
            add_kv_i32(&mut data, BEACON_KEY_BYTES_RECEIVED, request.bytes_received);
        }
        if request.response_code > -1 {
            add_kv_i32(&mut data, BEACON_KEY_RESPONSE_CODE, request.response_code);
        }
        self.cache
            .add_event_data(self.session_number, request.start_time, &data);
    }

    /// Records a named event on the given action.
    pub fn report_event(&self, action_id: i32, event_name: &str) {
        if self.is_capture_disabled() || !self.data_collection_level().allows_user_data() {
            return;
        }
        let (data, timestamp) =
            self.build_event(EventType::NamedEvent, Some(event_name), action_id);
        self.cache.add_event_data(self.session_number, timestamp, &data);
    }

    /// Records a 32-bit integer value on the given action.
    pub fn report_int_value(&self, action_id: i32, value_name: &str, value: i32) {
        if self.is_capture_disabled() || !self.data_collection_level().allows_user_data() {
            return;
        }
        let (mut data, timestamp) =
            self.build_event(EventType::ValueInt, Some(value_name), action_id);
        add_kv_i32(&mut data, BEACON_KEY_VALUE, value);
        self.cache.add_event_data(self.session_number, timestamp, &data);
    }

    /// Records a double value on the given action.
    pub fn report_double_value(&self, action_id: i32, value_name: &str, value: f64) {
        if self.is_capture_disabled() || !self.data_collection_level().allows_user_data() {
            return;
        }
        let (mut data, timestamp) =
            self.build_event(EventType::ValueDouble, Some(value_name), action_id);
        add_kv_f64(&mut data, BEACON_KEY_VALUE, value);
        self.cache.add_event_data(self.session_number, timestamp, &data);
    }

    /// Records a string value on the given action.
    pub fn report_string_value(&self, action_id: i32, value_name: &str, value: &str) {
        if self.is_capture_disabled() || !self.data_collection_level().allows_user_data() {
            return;
        }
        let (mut data, timestamp) =
            self.build_event(EventType::ValueString, Some(value_name), action_id);
        add_kv_string(&mut data, BEACON_KEY_VALUE, &truncate_chars(value, MAX_NAME_LEN));
        self.cache.add_event_data(self.session_number, timestamp, &data);
    }

    /// Records an error on the given action.
    pub fn report_error(&self, action_id: i32, error_name: &str, error_code: i32, reason: &str) {
        if self.is_capture_disabled()
            || !self.configuration.is_capture_errors()
            || !self.data_collection_level().allows_user_data()
        {
            return;
        }
        let timestamp = self.current_timestamp();
        let mut data = self.create_basic_event_data(EventType::Error, Some(error_name));
        add_kv_i32(&mut data, BEACON_KEY_PARENT_ACTION_ID, action_id);
        add_kv_i32(
            &mut data,
            BEACON_KEY_START_SEQUENCE_NUMBER,
            self.create_sequence_number(),
        );
        add_kv_i64(
            &mut data,
            BEACON_KEY_TIME_0,
            self.time_since_session_start(timestamp),
        );
        add_kv_i32(&mut data, BEACON_KEY_ERROR_CODE, error_code);
        add_kv_string(
            &mut data,
            BEACON_KEY_ERROR_REASON,
            &truncate_chars(reason, MAX_REASON_LEN),
        );
        self.cache.add_event_data(self.session_number, timestamp, &data);
    }

    /// Records a crash. Needs the opt-in crash reporting level.
    pub fn report_crash(&self, error_name: &str, reason: &str, stacktrace: &str) {
        let crash_level = self.beacon_configuration.read().crash_reporting_level;
        if self.is_capture_disabled()
            || !self.configuration.is_capture_crashes()
            || !crash_level.allows_crash_reporting()
        {
            return;
        }
        let timestamp = self.current_timestamp();
        let mut data = self.create_basic_event_data(EventType::Crash, Some(error_name));
        add_kv_i32(&mut data, BEACON_KEY_PARENT_ACTION_ID, 0);
        add_kv_i32(
            &mut data,
            BEACON_KEY_START_SEQUENCE_NUMBER,
            self.create_sequence_number(),
        );
        add_kv_i64(
            &mut data,
            BEACON_KEY_TIME_0,
            self.time_since_session_start(timestamp),
        );
        add_kv_string(
            &mut data,
            BEACON_KEY_ERROR_REASON,
            &truncate_chars(reason, MAX_REASON_LEN),
        );
        add_kv_string(
            &mut data,
            BEACON_KEY_STACKTRACE,
            &truncate_stacktrace(stacktrace, MAX_STACKTRACE_LEN),
        );
        self.cache.add_event_data(self.session_number, timestamp, &data);
    }

    /// Records a user identification tag.
    pub fn identify_user(&self, user_tag: &str) {
        if self.is_capture_disabled() || !self.data_collection_level().allows_user_data() {
            return;
        }
        let (data, timestamp) =
            self.build_event(EventType::IdentifyUser, Some(user_tag), 0);
        self.cache.add_event_data(self.session_number, timestamp, &data);
    }

    /// Transmits this session's records chunk by chunk.
    ///
    /// Returns the last response received: the final successful one, or
    /// the well-formed erroneous response that aborted the loop (so a
    /// `429` reaches the send state machine). A transport-level failure
    /// rolls the staged chunk back and returns whatever came before it.
    pub fn send(&self, provider: &dyn HttpClientProvider) -> Option<StatusResponse> {
        let http_config = self.configuration.http_client_config();
        let client = provider.create_client(&http_config);
        let max_size = self.configuration.max_beacon_size_bytes().max(0) as usize;

        let mut response = None;
        loop {
            let prefix = format!(
                "{}{}{}",
                self.immutable_basic_data,
                BEACON_DATA_DELIMITER,
                self.create_mutable_beacon_data()
            );
            let Some(chunk) = self.cache.get_next_beacon_chunk(
                self.session_number,
                &prefix,
                max_size,
                BEACON_DATA_DELIMITER,
            ) else {
                break;
            };
            if chunk.is_empty() {
                break;
            }

            match client.send_beacon_request(&self.client_ip, chunk.as_bytes()) {
                Ok(status) if status.is_ok() => {
                    self.cache.remove_chunked_data(self.session_number);
                    response = Some(status);
                },
                Ok(status) => {
                    debug!(
                        session = self.session_number,
                        code = status.response_code(),
                        "beacon send rejected"
                    );
                    self.cache.reset_chunked_data(self.session_number);
                    response = Some(status);
                    break;
                },
                Err(error) => {
                    warn!(
                        session = self.session_number,
                        %error,
                        "beacon send failed, keeping records for retry"
                    );
                    self.cache.reset_chunked_data(self.session_number);
                    break;
                },
            }
        }
        response
    }

    /// A beacon is empty when its session has no cached records.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty(self.session_number)
    }

    /// Drops all data collected so far for this session.
    pub fn clear_data(&self) {
        self.cache.clear_session_data(self.session_number);
    }

    fn time_since_session_start(&self, timestamp: i64) -> i64 {
        timestamp - self.session_start_time
    }

    fn create_basic_event_data(&self, event_type: EventType, name: Option<&str>) -> String {
        let mut data = String::with_capacity(64);
        add_kv_i32(&mut data, BEACON_KEY_EVENT_TYPE, event_type.as_i32());
        if let Some(name) = name {
            add_kv_string(&mut data, BEACON_KEY_NAME, &truncate_chars(name, MAX_NAME_LEN));
        }
        add_kv_i32(&mut data, BEACON_KEY_THREAD_ID, self.thread_id_provider.thread_id());
        data
    }

    fn build_event(
        &self,
        event_type: EventType,
        name: Option<&str>,
        parent_action_id: i32,
    ) -> (String, i64) {
        let timestamp = self.current_timestamp();
        let mut data = self.create_basic_event_data(event_type, name);
        add_kv_i32(&mut data, BEACON_KEY_PARENT_ACTION_ID, parent_action_id);
        add_kv_i32(
            &mut data,
            BEACON_KEY_START_SEQUENCE_NUMBER,
            self.create_sequence_number(),
        );
        add_kv_i64(
            &mut data,
            BEACON_KEY_TIME_0,
            self.time_since_session_start(timestamp),
        );
        (data, timestamp)
    }

    fn create_immutable_beacon_data(&self) -> String {
        let config = self.configuration.config();
        let app = &config.application;

        let mut data = String::with_capacity(256);
        add_kv_i32(&mut data, BEACON_KEY_PROTOCOL_VERSION, PROTOCOL_VERSION);
        add_kv_string(&mut data, BEACON_KEY_AGENT_VERSION, AGENT_VERSION);
        add_kv_string(&mut data, BEACON_KEY_APPLICATION_ID, &app.application_id);
        add_kv_string(&mut data, BEACON_KEY_APPLICATION_NAME, &app.application_name);
        if app.application_version.is_empty() {
            add_kv_string(&mut data, BEACON_KEY_APPLICATION_VERSION, AGENT_VERSION);
        } else {
            add_kv_string(
                &mut data,
                BEACON_KEY_APPLICATION_VERSION,
                &app.application_version,
            );
        }
        add_kv_i32(&mut data, BEACON_KEY_PLATFORM_TYPE, PLATFORM_TYPE);
        add_kv_string(&mut data, BEACON_KEY_AGENT_TECHNOLOGY, AGENT_TECHNOLOGY_TYPE);
        add_kv_string(&mut data, BEACON_KEY_DEVICE_ID, &self.device_id);
        add_kv_i32(&mut data, BEACON_KEY_SESSION_NUMBER, self.session_number);
        add_kv_string(&mut data, BEACON_KEY_CLIENT_IP, &self.client_ip);

        add_kv_string(&mut data, BEACON_KEY_DEVICE_OS, &config.device.operating_system);
        add_kv_string(
            &mut data,
            BEACON_KEY_DEVICE_MANUFACTURER,
            &config.device.manufacturer,
        );
        add_kv_string(&mut data, BEACON_KEY_DEVICE_MODEL, &config.device.model_id);

        let beacon_configuration = self.beacon_configuration.read();
        add_kv_i32(
            &mut data,
            BEACON_KEY_DATA_COLLECTION_LEVEL,
            beacon_configuration.data_collection_level.as_beacon_value(),
        );
        add_kv_i32(
            &mut data,
            BEACON_KEY_CRASH_REPORTING_LEVEL,
            beacon_configuration.crash_reporting_level.as_beacon_value(),
        );
        data
    }

    fn create_mutable_beacon_data(&self) -> String {
        let mut data = String::with_capacity(48);
        add_kv_i32(
            &mut data,
            BEACON_KEY_MULTIPLICITY,
            self.beacon_configuration.read().multiplicity,
        );
        add_kv_i64(&mut data, BEACON_KEY_SESSION_START_TIME, self.session_start_time);
        add_kv_i64(&mut data, BEACON_KEY_TRANSMISSION_TIME, self.current_timestamp());
        data
    }
}

fn append_key(data: &mut String, key: &str) {
    if !data.is_empty() {
        data.push(BEACON_DATA_DELIMITER);
    }
    data.push_str(key);
    data.push('=');
}

fn add_kv_string(data: &mut String, key: &str, value: &str) {
    append_key(data, key);
    data.push_str(&percent_encode(value));
}

fn add_kv_i32(data: &mut String, key: &str, value: i32) {
    use core::fmt::Write;
    append_key(data, key);
    write!(data, "{value}").expect("writing to String cannot fail");
}

fn add_kv_i64(data: &mut String, key: &str, value: i64) {
    use core::fmt::Write;
    append_key(data, key);
    write!(data, "{value}").expect("writing to String cannot fail");
}

fn add_kv_f64(data: &mut String, key: &str, value: f64) {
    use core::fmt::Write;
    append_key(data, key);
    write!(data, "{value}").expect("writing to String cannot fail");
}
