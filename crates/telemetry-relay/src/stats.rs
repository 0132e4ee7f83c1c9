// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay-wide counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free counters shared by every consumer, writer and broadcaster.
#[derive(Debug)]
pub struct RelayStats {
    started: Instant,
    messages_received: AtomicU64,
    read_errors: AtomicU64,
    decode_errors: AtomicU64,
    readings_stored: AtomicU64,
    sink_errors: AtomicU64,
    writes_skipped: AtomicU64,
    broadcasts: AtomicU64,
    broadcasts_skipped: AtomicU64,
    viewer_writes: AtomicU64,
    viewer_drops: AtomicU64,
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            messages_received: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            readings_stored: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
            writes_skipped: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            broadcasts_skipped: AtomicU64::new(0),
            viewer_writes: AtomicU64::new(0),
            viewer_drops: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stored(&self) {
        self.readings_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A reading not stored because the write pool was full.
    pub fn record_write_skipped(&self) {
        self.writes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A payload not broadcast because the broadcast pool was full.
    pub fn record_broadcast_skipped(&self) {
        self.broadcasts_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one broadcast fan-out and its per-viewer outcome.
    pub fn record_broadcast(&self, delivered: usize, dropped: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.viewer_writes
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.viewer_drops.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            readings_stored: self.readings_stored.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            writes_skipped: self.writes_skipped.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            broadcasts_skipped: self.broadcasts_skipped.load(Ordering::Relaxed),
            viewer_writes: self.viewer_writes.load(Ordering::Relaxed),
            viewer_drops: self.viewer_drops.load(Ordering::Relaxed),
        }
    }
}

/// Counter snapshot, served on `/api/v1/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStatsSnapshot {
    pub uptime_secs: u64,
    pub messages_received: u64,
    pub read_errors: u64,
    pub decode_errors: u64,
    pub readings_stored: u64,
    pub sink_errors: u64,
    pub writes_skipped: u64,
    pub broadcasts: u64,
    pub broadcasts_skipped: u64,
    pub viewer_writes: u64,
    pub viewer_drops: u64,
}
