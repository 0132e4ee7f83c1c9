// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-message fan-out to viewers and the store.
//!
//! Every decoded message starts two independent tasks: a broadcast of the raw
//! payload and a write of the decoded reading. Neither waits on the other, and
//! the consumer never waits on either. Each kind is capped by its own
//! semaphore. When a pool is full the new task is not started: the payload is
//! not broadcast (or the reading not stored), and the miss is logged and
//! counted. The other pool is unaffected.

use crate::config::DispatchConfig;
use crate::hub::{BroadcastReport, ViewerHub};
use crate::reading::Reading;
use crate::sink::{ReadingSink, SinkError};
use crate::stats::RelayStats;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Handles to the tasks started for one message. `None` when that pool was
/// full.
#[derive(Debug)]
pub struct DispatchTasks {
    pub broadcast: Option<JoinHandle<BroadcastReport>>,
    pub write: Option<JoinHandle<Result<(), SinkError>>>,
}

/// Starts broadcast and write tasks for decoded messages.
#[derive(Clone)]
pub struct Dispatcher {
    hub: Arc<ViewerHub>,
    sink: Arc<dyn ReadingSink>,
    write_permits: Arc<Semaphore>,
    broadcast_permits: Arc<Semaphore>,
    write_capacity: usize,
    stats: Arc<RelayStats>,
}

impl Dispatcher {
    pub fn new(
        hub: Arc<ViewerHub>,
        sink: Arc<dyn ReadingSink>,
        config: &DispatchConfig,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            hub,
            sink,
            write_permits: Arc::new(Semaphore::new(config.max_in_flight_writes)),
            broadcast_permits: Arc::new(Semaphore::new(config.max_in_flight_broadcasts)),
            write_capacity: config.max_in_flight_writes,
            stats,
        }
    }

    /// Start the broadcast of `payload` and the write of `reading`. Never
    /// waits.
    pub fn dispatch(&self, payload: Bytes, reading: Reading) -> DispatchTasks {
        DispatchTasks {
            broadcast: self.spawn_broadcast(payload, &reading.serial),
            write: self.spawn_write(reading),
        }
    }

    fn spawn_broadcast(
        &self,
        payload: Bytes,
        serial: &str,
    ) -> Option<JoinHandle<BroadcastReport>> {
        let Ok(permit) = self.broadcast_permits.clone().try_acquire_owned() else {
            self.stats.record_broadcast_skipped();
            warn!("Broadcast pool full, not broadcasting message from {}", serial);
            return None;
        };

        let hub = self.hub.clone();
        let stats = self.stats.clone();
        Some(tokio::spawn(async move {
            let _permit = permit;
            let report = hub.broadcast(payload).await;
            stats.record_broadcast(report.delivered, report.dropped);
            report
        }))
    }

    fn spawn_write(&self, reading: Reading) -> Option<JoinHandle<Result<(), SinkError>>> {
        let Ok(permit) = self.write_permits.clone().try_acquire_owned() else {
            self.stats.record_write_skipped();
            warn!("Write pool full, not storing reading from {}", reading.serial);
            return None;
        };

        let sink = self.sink.clone();
        let stats = self.stats.clone();
        Some(tokio::spawn(async move {
            let _permit = permit;
            let result = sink.write(&reading).await;
            match &result {
                Ok(()) => {
                    stats.record_stored();
                    debug!("Stored reading from {}", reading.serial);
                }
                Err(e) => {
                    stats.record_sink_error();
                    error!("Failed to store reading from {}: {}", reading.serial, e);
                }
            }
            result
        }))
    }

    /// Store writes currently holding a slot.
    pub fn writes_in_flight(&self) -> usize {
        self.write_capacity
            .saturating_sub(self.write_permits.available_permits())
    }
}
