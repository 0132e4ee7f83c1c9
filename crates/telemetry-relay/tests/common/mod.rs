// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// In-memory broker, sink and viewer doubles for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_relay::config::RelayConfig;
use telemetry_relay::{
    Broker, BrokerError, MessageStream, ReadError, Reading, ReadingSink, SinkError, TopicSpec,
    TopicStatus, ViewerConnection, ViewerError,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const FLAT_ABC0001: &str = r#"{"Serial":"ABC0001","Type":"Incubator","Timestamp":"2024-01-01T00:00:00Z","Reading1":21.5,"Reading2":55.0,"Reading3":400.0}"#;
pub const ENVELOPED_BAD_TIMESTAMP: &str = r#"{"value":{"type":"JSON","data":{"Serial":"X1","Type":"Temp","Timestamp":"bad-timestamp","Reading1":1.0,"Reading2":2.0}}}"#;

pub type Feed = UnboundedSender<Result<Bytes, ReadError>>;

/// Config with short delays so failure paths finish quickly.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.broker.retry.delay_ms = 10;
    config.broker.retry.max_attempts = 3;
    config.consumer.read_error_backoff_ms = 10;
    config.hub.write_timeout_ms = 200;
    config
}

/// Receive one item or give up after `within`.
pub async fn recv_within<T>(rx: &mut UnboundedReceiver<T>, within: Duration) -> Option<T> {
    tokio::time::timeout(within, rx.recv()).await.ok().flatten()
}

/// Poll `cond` every 5 ms until it holds or `within` elapses.
pub async fn eventually<F: FnMut() -> bool>(within: Duration, mut cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBroker {
    probe_failures: AtomicU32,
    probes: AtomicU32,
    fail_create: AtomicBool,
    yield_on_create: AtomicBool,
    topics: Mutex<HashSet<String>>,
    feeds: Mutex<HashMap<String, UnboundedReceiver<Result<Bytes, ReadError>>>>,
    idle: Mutex<Vec<Feed>>,
    subscriptions: Mutex<Vec<(String, String)>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` probes.
    pub fn fail_probes(&self, n: u32) {
        self.probe_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_topic_creation(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Yield once inside topic creation so concurrent callers interleave.
    pub fn yield_on_create(&self) {
        self.yield_on_create.store(true, Ordering::SeqCst);
    }

    pub fn with_topic(self, name: &str) -> Self {
        self.topics.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn has_topic(&self, name: &str) -> bool {
        self.topics.lock().unwrap().contains(name)
    }

    /// Messages for the next subscription to `topic`. Dropping the sender
    /// ends that stream.
    pub fn feed(&self, topic: &str) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().insert(topic.to_string(), rx);
        tx
    }

    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Stream = MemoryStream;

    async fn probe(&self) -> Result<(), BrokerError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.probe_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.probe_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BrokerError::Unreachable("connection refused".into()));
        }
        Ok(())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<TopicStatus, BrokerError> {
        if self.yield_on_create.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BrokerError::CreateTopic {
                topic: spec.name.clone(),
                reason: "PolicyViolation".into(),
            });
        }
        if self.topics.lock().unwrap().insert(spec.name.clone()) {
            Ok(TopicStatus::Created)
        } else {
            Ok(TopicStatus::AlreadyExists)
        }
    }

    fn subscribe(&self, topic: &str, group_id: &str) -> Result<MemoryStream, BrokerError> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((topic.to_string(), group_id.to_string()));

        let rx = match self.feeds.lock().unwrap().remove(topic) {
            Some(rx) => rx,
            None => {
                // No feed: keep the sender so the stream stays open and idle.
                let (tx, rx) = mpsc::unbounded_channel();
                self.idle.lock().unwrap().push(tx);
                rx
            }
        };
        Ok(MemoryStream { rx })
    }
}

pub struct MemoryStream {
    rx: UnboundedReceiver<Result<Bytes, ReadError>>,
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn next_message(&mut self) -> Result<Option<Bytes>, ReadError> {
        match self.rx.recv().await {
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Ok,
    Fail,
    Hang,
}

pub struct RecordingSink {
    mode: SinkMode,
    attempts: AtomicUsize,
    stored: UnboundedSender<Reading>,
}

impl RecordingSink {
    pub fn new(mode: SinkMode) -> (Arc<Self>, UnboundedReceiver<Reading>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            mode,
            attempts: AtomicUsize::new(0),
            stored: tx,
        });
        (sink, rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadingSink for RecordingSink {
    async fn write(&self, reading: &Reading) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            SinkMode::Ok => {
                let _ = self.stored.send(reading.clone());
                Ok(())
            }
            SinkMode::Fail => Err(SinkError::Connect("connection refused".into())),
            SinkMode::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Viewer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerMode {
    Healthy,
    Failing,
    Stalled,
}

pub struct RecordingViewer {
    mode: ViewerMode,
    received: UnboundedSender<Bytes>,
    closed: Arc<AtomicBool>,
}

pub struct ViewerProbe {
    pub received: UnboundedReceiver<Bytes>,
    pub closed: Arc<AtomicBool>,
}

impl ViewerProbe {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RecordingViewer {
    pub fn healthy() -> (Box<dyn ViewerConnection>, ViewerProbe) {
        Self::build(ViewerMode::Healthy)
    }

    /// Every send fails.
    pub fn failing() -> (Box<dyn ViewerConnection>, ViewerProbe) {
        Self::build(ViewerMode::Failing)
    }

    /// Every send hangs.
    pub fn stalled() -> (Box<dyn ViewerConnection>, ViewerProbe) {
        Self::build(ViewerMode::Stalled)
    }

    fn build(mode: ViewerMode) -> (Box<dyn ViewerConnection>, ViewerProbe) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let viewer = Self {
            mode,
            received: tx,
            closed: closed.clone(),
        };
        (
            Box::new(viewer),
            ViewerProbe {
                received: rx,
                closed,
            },
        )
    }
}

#[async_trait]
impl ViewerConnection for RecordingViewer {
    async fn send(&mut self, payload: Bytes) -> Result<(), ViewerError> {
        match self.mode {
            ViewerMode::Healthy => self.received.send(payload).map_err(|_| ViewerError::Closed),
            ViewerMode::Failing => Err(ViewerError::Write("broken pipe".into())),
            ViewerMode::Stalled => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
