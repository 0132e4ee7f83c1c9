// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-topic consumer loop.
//!
//! Reads messages in order, decodes each one and hands it to the
//! [`Dispatcher`]. Read errors are logged and retried after a backoff. A
//! decode failure either ends the loop or skips the message, depending on
//! [`DecodeFailurePolicy`].

use crate::broker::MessageStream;
use crate::config::{ConsumerConfig, DecodeFailurePolicy};
use crate::decoder::{decode, DecodeError};
use crate::dispatch::Dispatcher;
use crate::stats::RelayStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Why a consumer loop ended.
#[derive(Debug)]
pub enum ConsumerExit {
    /// A payload could not be decoded under the `stop` policy.
    DecodeFailed(DecodeError),
    /// The broker stream finished.
    StreamClosed,
    /// Shutdown was requested.
    Shutdown,
}

/// Consumer for one topic.
pub struct TopicConsumer<S: MessageStream> {
    topic: String,
    group_id: String,
    stream: S,
    dispatcher: Dispatcher,
    on_decode_error: DecodeFailurePolicy,
    read_error_backoff: Duration,
    stats: Arc<RelayStats>,
    shutdown: watch::Receiver<bool>,
}

impl<S: MessageStream> TopicConsumer<S> {
    pub fn new(
        topic: impl Into<String>,
        group_id: impl Into<String>,
        stream: S,
        dispatcher: Dispatcher,
        config: &ConsumerConfig,
        stats: Arc<RelayStats>,
    ) -> Self {
        // Sender dropped immediately: never signals.
        let (_, shutdown) = watch::channel(false);
        Self {
            topic: topic.into(),
            group_id: group_id.into(),
            stream,
            dispatcher,
            on_decode_error: config.on_decode_error,
            read_error_backoff: config.read_error_backoff(),
            stats,
            shutdown,
        }
    }

    /// Stop the loop when `shutdown` becomes `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Consume until the stream ends, shutdown is requested, or a decode
    /// failure stops the loop.
    pub async fn run(mut self) -> ConsumerExit {
        info!(
            "Consuming topic '{}' as group '{}'",
            self.topic, self.group_id
        );

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break ConsumerExit::Shutdown,
                next = self.stream.next_message() => next,
            };

            let payload = match next {
                Ok(Some(payload)) => payload,
                Ok(None) => break ConsumerExit::StreamClosed,
                Err(e) => {
                    self.stats.record_read_error();
                    warn!(
                        "Read error on '{}', retrying in {:?}: {}",
                        self.topic, self.read_error_backoff, e
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut self.shutdown) => break ConsumerExit::Shutdown,
                        _ = tokio::time::sleep(self.read_error_backoff) => continue,
                    }
                }
            };
            self.stats.record_received();

            let reading = match decode(&payload) {
                Ok(reading) => reading,
                Err(e) => {
                    self.stats.record_decode_error();
                    match self.on_decode_error {
                        DecodeFailurePolicy::Stop => {
                            error!(
                                "Undecodable message on '{}', stopping consumer: {}",
                                self.topic, e
                            );
                            break ConsumerExit::DecodeFailed(e);
                        }
                        DecodeFailurePolicy::Skip => {
                            warn!("Skipping undecodable message on '{}': {}", self.topic, e);
                            continue;
                        }
                    }
                }
            };

            debug!(
                "Message from {} ({}) on '{}'",
                reading.serial, reading.sensor_type, self.topic
            );
            self.dispatcher.dispatch(payload, reading);
        };

        match &exit {
            ConsumerExit::Shutdown => info!("Consumer for '{}' shut down", self.topic),
            ConsumerExit::StreamClosed => warn!("Stream for '{}' closed", self.topic),
            ConsumerExit::DecodeFailed(_) => {}
        }
        exit
    }
}

/// Resolves once the watched flag is `true`. Pends forever if the sender is
/// dropped without signalling.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
