// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Deterministic providers and a scripted transport shared by the unit
//! tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicI32, AtomicI64, Ordering},
    },
};

use anyhow::{Result, anyhow};
use beaconkit_rs::{
    caching::cache::BeaconCache,
    cfg::{
        config::{ApplicationConfig, CacheConfig, Config, DeviceConfig, PrivacyConfig},
        enums::{CrashReportingLevel, DataCollectionLevel},
        runtime::RuntimeConfiguration,
    },
    communication::context::BeaconSendingContext,
    protocol::{
        beacon::Beacon,
        http::{HttpClient, HttpClientConfig},
        status::StatusResponse,
    },
    providers::{
        http::HttpClientProvider, prng::PrngProvider, session::SessionIdProvider,
        thread::ThreadIdProvider, time::TimingProvider,
    },
    utils::Suspender,
};
use parking_lot::Mutex;

pub const TEST_THREAD_ID: i32 = 7;
pub const TEST_SESSION_NUMBER: i32 = 17;
pub const TEST_RANDOM_DEVICE_ID: i64 = 999;

pub fn test_config(
    data_collection_level: DataCollectionLevel,
    crash_reporting_level: CrashReportingLevel,
) -> Config {
    Config {
        application: ApplicationConfig {
            endpoint_url: "https://collector.example.com/mbeacon".to_string(),
            application_id: "example app-id".to_string(),
            application_name: "Example App".to_string(),
            application_version: "1.2.3".to_string(),
            device_id: "device_42".to_string(),
        },
        device: DeviceConfig {
            operating_system: "Linux".to_string(),
            manufacturer: "Example Corp".to_string(),
            model_id: "Model X".to_string(),
        },
        privacy: PrivacyConfig {
            data_collection_level,
            crash_reporting_level,
        },
        cache: CacheConfig::default(),
    }
}

/// Manually advanced wall clock.
pub struct MockTimingProvider {
    now: AtomicI64,
}

impl MockTimingProvider {
    pub fn new(start: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start),
        })
    }

    pub fn set(&self, timestamp: i64) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimingProvider for MockTimingProvider {
    fn provide_timestamp_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub struct FixedThreadIdProvider(pub i32);

impl ThreadIdProvider for FixedThreadIdProvider {
    fn thread_id(&self) -> i32 {
        self.0
    }
}

pub struct SequentialSessionIdProvider {
    next: AtomicI32,
}

impl SequentialSessionIdProvider {
    pub fn starting_at(first: i32) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicI32::new(first),
        })
    }
}

impl SessionIdProvider for SequentialSessionIdProvider {
    fn next_session_id(&self) -> i32 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

pub struct FixedPrngProvider(pub i64);

impl PrngProvider for FixedPrngProvider {
    fn next_positive_i64(&self) -> i64 {
        self.0
    }
}

/// Records every sleep without blocking; optionally requests shutdown on
/// the n-th sleep to simulate a host shutting down mid-wait.
#[derive(Default)]
pub struct RecordingSuspender {
    pub sleeps: Mutex<Vec<i64>>,
    shutdown_trigger: Mutex<Option<(usize, Arc<BeaconSendingContext>)>>,
}

impl RecordingSuspender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_shutdown_on_sleep(&self, nth: usize, context: Arc<BeaconSendingContext>) {
        *self.shutdown_trigger.lock() = Some((nth, context));
    }

    pub fn recorded(&self) -> Vec<i64> {
        self.sleeps.lock().clone()
    }
}

impl Suspender for RecordingSuspender {
    fn sleep(&self, millis: i64) {
        let count = {
            let mut sleeps = self.sleeps.lock();
            sleeps.push(millis);
            sleeps.len()
        };
        let trigger = self.shutdown_trigger.lock();
        if let Some((nth, context)) = trigger.as_ref()
            && count == *nth
        {
            context.request_shutdown();
        }
    }

    fn wake(&self) {}
}

pub enum Scripted {
    Respond(StatusResponse),
    TransportError,
}

/// Transport double fed with scripted responses per request kind; an
/// exhausted queue answers with a plain 200.
#[derive(Default)]
pub struct StubHttpClient {
    status_responses: Mutex<VecDeque<Scripted>>,
    new_session_responses: Mutex<VecDeque<Scripted>>,
    beacon_responses: Mutex<VecDeque<Scripted>>,
    pub status_request_count: AtomicI32,
    pub new_session_request_count: AtomicI32,
    pub beacon_bodies: Mutex<Vec<String>>,
}

impl StubHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, response: StatusResponse) {
        self.status_responses.lock().push_back(Scripted::Respond(response));
    }

    pub fn push_status_transport_error(&self) {
        self.status_responses.lock().push_back(Scripted::TransportError);
    }

    pub fn push_new_session(&self, response: StatusResponse) {
        self.new_session_responses
            .lock()
            .push_back(Scripted::Respond(response));
    }

    pub fn push_beacon(&self, response: StatusResponse) {
        self.beacon_responses.lock().push_back(Scripted::Respond(response));
    }

    pub fn push_beacon_transport_error(&self) {
        self.beacon_responses.lock().push_back(Scripted::TransportError);
    }

    pub fn beacon_bodies(&self) -> Vec<String> {
        self.beacon_bodies.lock().clone()
    }

    fn next(queue: &Mutex<VecDeque<Scripted>>) -> Result<StatusResponse> {
        match queue.lock().pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::TransportError) => Err(anyhow!("connection refused")),
            None => Ok(ok_status("")),
        }
    }
}

impl HttpClient for StubHttpClient {
    fn send_status_request(&self) -> Result<StatusResponse> {
        self.status_request_count.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.status_responses)
    }

    fn send_new_session_request(&self) -> Result<StatusResponse> {
        self.new_session_request_count.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.new_session_responses)
    }

    fn send_beacon_request(
        &self,
        _client_ip: &str,
        beacon_data: &[u8],
    ) -> Result<StatusResponse> {
        self.beacon_bodies
            .lock()
            .push(String::from_utf8_lossy(beacon_data).into_owned());
        Self::next(&self.beacon_responses)
    }
}

#[derive(Default)]
pub struct StubHttpClientProvider {
    pub client: Arc<StubHttpClient>,
    pub create_count: AtomicI32,
}

impl StubHttpClientProvider {
    pub fn wrapping(client: Arc<StubHttpClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            create_count: AtomicI32::new(0),
        })
    }
}

impl HttpClientProvider for StubHttpClientProvider {
    fn create_client(&self, _config: &HttpClientConfig) -> Arc<dyn HttpClient> {
        self.create_count.fetch_add(1, Ordering::SeqCst);
        Arc::clone(&self.client) as Arc<dyn HttpClient>
    }
}

pub fn ok_status(body: &str) -> StatusResponse {
    StatusResponse::parse(200, body, &HashMap::new()).expect("valid status body")
}

pub fn error_status(code: i32) -> StatusResponse {
    StatusResponse::from_code(code)
}

pub fn too_many_requests(retry_after_secs: i64) -> StatusResponse {
    let headers = HashMap::from([(
        "Retry-After".to_string(),
        retry_after_secs.to_string(),
    )]);
    StatusResponse::parse(429, "", &headers).expect("valid status body")
}

pub fn make_runtime(
    data_collection_level: DataCollectionLevel,
    crash_reporting_level: CrashReportingLevel,
) -> Arc<RuntimeConfiguration> {
    Arc::new(RuntimeConfiguration::new(
        test_config(data_collection_level, crash_reporting_level),
        SequentialSessionIdProvider::starting_at(TEST_SESSION_NUMBER),
    ))
}

pub fn make_beacon(
    cache: &Arc<BeaconCache>,
    runtime: &Arc<RuntimeConfiguration>,
    clock: &Arc<MockTimingProvider>,
) -> Arc<Beacon> {
    Arc::new(Beacon::new(
        Arc::clone(cache),
        Arc::clone(runtime),
        "127.0.0.1",
        Arc::new(FixedThreadIdProvider(TEST_THREAD_ID)),
        Arc::clone(clock) as Arc<dyn TimingProvider>,
        &FixedPrngProvider(TEST_RANDOM_DEVICE_ID),
    ))
}

pub fn make_context(
    provider: &Arc<StubHttpClientProvider>,
    clock: &Arc<MockTimingProvider>,
    runtime: &Arc<RuntimeConfiguration>,
    suspender: &Arc<RecordingSuspender>,
) -> Arc<BeaconSendingContext> {
    Arc::new(BeaconSendingContext::new(
        Arc::clone(provider) as Arc<dyn HttpClientProvider>,
        Arc::clone(clock) as Arc<dyn TimingProvider>,
        Arc::clone(runtime),
        Arc::clone(suspender) as Arc<dyn Suspender>,
    ))
}

/// Reads the integer following `key=` in the first record containing
/// `anchor`.
pub fn extract_i64_after(chunk: &str, anchor: &str, key: &str) -> i64 {
    let start = chunk
        .find(anchor)
        .unwrap_or_else(|| panic!("anchor {anchor:?} not found in {chunk:?}"));
    let rest = &chunk[start..];
    let needle = format!("{key}=");
    let value_start = rest
        .find(&needle)
        .unwrap_or_else(|| panic!("key {key:?} not found after {anchor:?}"))
        + needle.len();
    let value = &rest[value_start..];
    let end = value.find('&').unwrap_or(value.len());
    value[..end]
        .parse()
        .unwrap_or_else(|_| panic!("value for {key:?} is not a number: {value:?}"))
}

/// Drains everything cached for the session into one chunk.
pub fn drain_chunk(cache: &BeaconCache, session_number: i32) -> String {
    let chunk = cache
        .get_next_beacon_chunk(session_number, "P", 1 << 20, '&')
        .unwrap_or_default();
    cache.remove_chunked_data(session_number);
    chunk
}

pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
