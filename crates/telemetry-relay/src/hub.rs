// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Live viewer registry and broadcast fan-out.
//!
//! The hub owns every viewer connection behind a single async mutex, so
//! registration, removal and broadcast never interleave. A viewer whose write
//! fails or exceeds the write timeout is closed and removed in the same
//! broadcast; the remaining viewers still receive the payload.

use crate::config::HubConfig;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Viewer identifier assigned at registration.
pub type ViewerId = Uuid;

/// Viewer write errors.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("viewer connection closed")]
    Closed,

    #[error("viewer write failed: {0}")]
    Write(String),

    #[error("viewer write timed out after {0:?}")]
    Timeout(Duration),
}

/// An outbound channel to one live viewer.
#[async_trait]
pub trait ViewerConnection: Send {
    /// Deliver one payload.
    async fn send(&mut self, payload: Bytes) -> Result<(), ViewerError>;

    /// Close the channel. Errors are ignored.
    async fn close(&mut self);
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Set of live viewers.
pub struct ViewerHub {
    viewers: Mutex<HashMap<ViewerId, Box<dyn ViewerConnection>>>,
    write_timeout: Duration,
    max_viewers: usize,
}

impl ViewerHub {
    /// Create a hub. `max_viewers == 0` means unlimited.
    pub fn new(write_timeout: Duration, max_viewers: usize) -> Self {
        Self {
            viewers: Mutex::new(HashMap::new()),
            write_timeout,
            max_viewers,
        }
    }

    pub fn from_config(config: &HubConfig) -> Self {
        Self::new(config.write_timeout(), config.max_viewers)
    }

    /// Add a viewer. Returns its id, or `None` when the hub is full (the
    /// connection is handed back closed).
    pub async fn register(&self, mut conn: Box<dyn ViewerConnection>) -> Option<ViewerId> {
        let mut viewers = self.viewers.lock().await;
        if self.max_viewers > 0 && viewers.len() >= self.max_viewers {
            drop(viewers);
            warn!("Viewer limit ({}) reached, refusing connection", self.max_viewers);
            conn.close().await;
            return None;
        }

        let id = Uuid::new_v4();
        viewers.insert(id, conn);
        info!("Viewer {} connected ({} active)", id, viewers.len());
        Some(id)
    }

    /// Remove and close a viewer. Unknown ids are ignored.
    pub async fn remove(&self, id: ViewerId) {
        let removed = {
            let mut viewers = self.viewers.lock().await;
            let conn = viewers.remove(&id);
            if conn.is_some() {
                info!("Viewer {} disconnected ({} active)", id, viewers.len());
            }
            conn
        };

        if let Some(mut conn) = removed {
            conn.close().await;
        }
    }

    /// Send `payload` to every registered viewer.
    ///
    /// Each write is bounded by the hub's write timeout. Viewers that fail
    /// are closed and removed before the lock is released.
    pub async fn broadcast(&self, payload: Bytes) -> BroadcastReport {
        let mut viewers = self.viewers.lock().await;
        let mut failed = Vec::new();
        let mut report = BroadcastReport::default();

        for (id, conn) in viewers.iter_mut() {
            let result =
                match tokio::time::timeout(self.write_timeout, conn.send(payload.clone())).await {
                    Ok(result) => result,
                    Err(_) => Err(ViewerError::Timeout(self.write_timeout)),
                };

            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Dropping viewer {}: {}", id, e);
                    failed.push(*id);
                }
            }
        }

        for id in failed {
            if let Some(mut conn) = viewers.remove(&id) {
                conn.close().await;
                report.dropped += 1;
            }
        }

        if report.dropped > 0 {
            debug!(
                "Broadcast delivered to {}, dropped {} ({} active)",
                report.delivered,
                report.dropped,
                viewers.len()
            );
        }
        report
    }

    pub async fn active_viewers(&self) -> usize {
        self.viewers.lock().await.len()
    }

    /// Whether another viewer would be accepted right now.
    pub async fn has_capacity(&self) -> bool {
        self.max_viewers == 0 || self.viewers.lock().await.len() < self.max_viewers
    }
}
