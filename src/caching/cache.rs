// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Arc, Weak,
        atomic::{AtomicI64, Ordering},
    },
};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Fixed per-record cost added to the serialized text length: the
/// timestamp word stored alongside it.
pub const RECORD_SIZE_OVERHEAD_BYTES: usize = 8;

/// One serialized record, timestamped with the capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub timestamp: i64,
    pub data: String,
}

impl CacheRecord {
    pub fn new(timestamp: i64, data: impl Into<String>) -> Self {
        Self {
            timestamp,
            data: data.into(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len() + RECORD_SIZE_OVERHEAD_BYTES
    }
}

/// A record lives in exactly one of these queues:
/// - `live`: not yet handed to a transmission attempt,
/// - `sending`: staged for the current send pass,
/// - `chunked`: already assembled into a chunk, awaiting commit/rollback.
#[derive(Debug, Default)]
struct EntryInner {
    live: VecDeque<CacheRecord>,
    sending: VecDeque<CacheRecord>,
    chunked: Vec<CacheRecord>,
}

impl EntryInner {
    fn is_empty(&self) -> bool {
        self.live.is_empty() && self.sending.is_empty() && self.chunked.is_empty()
    }
}

/// Per-session record queues behind a single mutex.
#[derive(Debug, Default)]
pub struct BeaconCacheEntry {
    inner: Mutex<EntryInner>,
}

/// Implemented by the eviction worker; notified on every insert and on
/// every rollback that refills the live queue.
pub trait CacheObserver: Send + Sync {
    fn on_record_added(&self);
}

/// Process-scope cache mapping session numbers to record queues.
///
/// The map itself is a sharded reader-writer structure; record queues are
/// guarded by their entry's mutex, and the byte ledger is adjusted inside
/// the same critical section that moves records.
pub struct BeaconCache {
    entries: DashMap<i32, Arc<BeaconCacheEntry>>,
    total_bytes: AtomicI64,
    observers: Mutex<Vec<Weak<dyn CacheObserver>>>,
}

impl Default for BeaconCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            total_bytes: AtomicI64::new(0),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn register_observer(&self, observer: Weak<dyn CacheObserver>) {
        self.observers.lock().push(observer);
    }

    fn notify_observers(&self) {
        let mut observers = self.observers.lock();
        observers.retain(|weak| match weak.upgrade() {
            Some(observer) => {
                observer.on_record_added();
                true
            },
            None => false,
        });
    }

    fn entry(&self, session_number: i32) -> Option<Arc<BeaconCacheEntry>> {
        self.entries
            .get(&session_number)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn entry_or_insert(&self, session_number: i32) -> Arc<BeaconCacheEntry> {
        Arc::clone(
            self.entries
                .entry(session_number)
                .or_default()
                .value(),
        )
    }

    fn add_record(&self, session_number: i32, timestamp: i64, data: &str) {
        let entry = self.entry_or_insert(session_number);
        {
            let mut inner = entry.inner.lock();
            let record = CacheRecord::new(timestamp, data);
            self.total_bytes
                .fetch_add(record.size_bytes() as i64, Ordering::AcqRel);
            inner.live.push_back(record);
        }
        self.notify_observers();
    }

    /// Appends a serialized event record to the session's live queue.
    pub fn add_event_data(&self, session_number: i32, timestamp: i64, data: &str) {
        self.add_record(session_number, timestamp, data);
    }

    /// Appends a serialized action record to the session's live queue.
    pub fn add_action_data(&self, session_number: i32, timestamp: i64, data: &str) {
        self.add_record(session_number, timestamp, data);
    }

    /// Transactional drain: stages the live queue on the first call of a
    /// send pass, then assembles `prefix` plus as many staged records as
    /// fit into `max_size` bytes. Assembled records move to the pending
    /// ledger until [`remove_chunked_data`](Self::remove_chunked_data)
    /// commits or [`reset_chunked_data`](Self::reset_chunked_data) rolls
    /// back.
    ///
    /// Returns `None` when the session has nothing to send, and an empty
    /// string when the prefix alone does not fit `max_size`.
    pub fn get_next_beacon_chunk(
        &self,
        session_number: i32,
        prefix: &str,
        max_size: usize,
        delimiter: char,
    ) -> Option<String> {
        let entry = self.entry(session_number)?;
        let mut inner = entry.inner.lock();
        let inner = &mut *inner;

        if inner.sending.is_empty() && inner.chunked.is_empty() {
            std::mem::swap(&mut inner.live, &mut inner.sending);
        }
        if inner.sending.is_empty() {
            return None;
        }
        if prefix.len() > max_size {
            return Some(String::new());
        }

        let mut chunk = String::with_capacity(max_size.min(prefix.len() + 1024));
        chunk.push_str(prefix);
        let mut included = 0usize;
        loop {
            let fits = match inner.sending.front() {
                Some(front) => {
                    chunk.len() + front.data.len() + delimiter.len_utf8() <= max_size
                },
                None => break,
            };
            // A record larger than the whole budget still travels, alone;
            // a chunk that never makes progress would wedge the session.
            if !fits && included > 0 {
                break;
            }
            if let Some(record) = inner.sending.pop_front() {
                chunk.push(delimiter);
                chunk.push_str(&record.data);
                inner.chunked.push(record);
                included += 1;
            }
            if !fits {
                break;
            }
        }
        Some(chunk)
    }

    /// Commit: the last chunk was transmitted, drop its records.
    pub fn remove_chunked_data(&self, session_number: i32) {
        let Some(entry) = self.entry(session_number) else {
            return;
        };
        let mut inner = entry.inner.lock();
        let removed: i64 = inner.chunked.iter().map(|r| r.size_bytes() as i64).sum();
        inner.chunked.clear();
        self.total_bytes.fetch_sub(removed, Ordering::AcqRel);
    }

    /// Rollback: the transmission failed, restore every staged record to
    /// the head of the live queue in its original order.
    pub fn reset_chunked_data(&self, session_number: i32) {
        let Some(entry) = self.entry(session_number) else {
            return;
        };
        {
            let mut inner = entry.inner.lock();
            let mut restored: VecDeque<CacheRecord> =
                inner.chunked.drain(..).collect();
            restored.append(&mut inner.sending);
            restored.append(&mut inner.live);
            inner.live = restored;
        }
        self.notify_observers();
    }

    /// Removes live records older than `min_timestamp`; returns how many
    /// were evicted.
    pub fn evict_records_by_age(&self, session_number: i32, min_timestamp: i64) -> u32 {
        let Some(entry) = self.entry(session_number) else {
            return 0;
        };
        let mut inner = entry.inner.lock();
        let before = inner.live.len();
        let mut removed_bytes = 0i64;
        inner.live.retain(|record| {
            if record.timestamp < min_timestamp {
                removed_bytes += record.size_bytes() as i64;
                false
            } else {
                true
            }
        });
        self.total_bytes.fetch_sub(removed_bytes, Ordering::AcqRel);
        (before - inner.live.len()) as u32
    }

    /// Removes up to `count` of the oldest live records; returns how many
    /// were actually evicted.
    pub fn evict_records_by_number(&self, session_number: i32, count: u32) -> u32 {
        let Some(entry) = self.entry(session_number) else {
            return 0;
        };
        let mut inner = entry.inner.lock();
        let mut evicted = 0;
        while evicted < count {
            match inner.live.pop_front() {
                Some(record) => {
                    self.total_bytes
                        .fetch_sub(record.size_bytes() as i64, Ordering::AcqRel);
                    evicted += 1;
                },
                None => break,
            }
        }
        evicted
    }

    /// Drops the session's entry when every queue is empty.
    pub fn delete_cache_entry(&self, session_number: i32) {
        self.entries
            .remove_if(&session_number, |_, entry| entry.inner.lock().is_empty());
    }

    /// Wholesale removal of a session's records, queues included. Used
    /// when a session's captured data is cleared.
    pub fn clear_session_data(&self, session_number: i32) {
        if let Some((_, entry)) = self.entries.remove(&session_number) {
            let inner = entry.inner.lock();
            let bytes: i64 = inner
                .live
                .iter()
                .chain(inner.sending.iter())
                .chain(inner.chunked.iter())
                .map(|r| r.size_bytes() as i64)
                .sum();
            self.total_bytes.fetch_sub(bytes, Ordering::AcqRel);
        }
    }

    /// `true` when the session holds no records at all.
    pub fn is_empty(&self, session_number: i32) -> bool {
        match self.entry(session_number) {
            Some(entry) => entry.inner.lock().is_empty(),
            None => true,
        }
    }

    pub fn num_bytes_in_cache(&self) -> i64 {
        self.total_bytes.load(Ordering::Acquire)
    }

    /// Session numbers currently present in the cache.
    pub fn beacon_ids(&self) -> HashSet<i32> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }
}
