// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay service: provisioning, consumer lifecycle and the viewer hub.
//!
//! The relay owns one consumer task per subscribed topic. Asking for a topic
//! that already has a running consumer is reported, not duplicated; a topic
//! whose consumer has ended can be subscribed again.

use crate::broker::{validate_topic_name, Broker, BrokerError, TopicStatus};
use crate::config::RelayConfig;
use crate::consumer::{ConsumerExit, TopicConsumer};
use crate::dispatch::Dispatcher;
use crate::hub::{ViewerConnection, ViewerHub, ViewerId};
use crate::provisioner::{ProvisionError, Provisioner};
use crate::sink::ReadingSink;
use crate::stats::{RelayStats, RelayStatsSnapshot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid topic name '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("failed to subscribe to '{topic}'")]
    Subscribe {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("relay is shutting down")]
    ShuttingDown,
}

/// Result of a subscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// A new consumer was started.
    Subscribed {
        topic: String,
        group_id: String,
        topic_status: TopicStatus,
    },
    /// A consumer for this topic is already running.
    AlreadySubscribed { topic: String, group_id: String },
}

/// One entry of the subscription table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub topic: String,
    pub group_id: String,
    pub running: bool,
}

struct Subscription {
    group_id: String,
    task: JoinHandle<ConsumerExit>,
}

/// The telemetry relay.
pub struct Relay<B: Broker> {
    broker: Arc<B>,
    provisioner: Provisioner<B>,
    hub: Arc<ViewerHub>,
    dispatcher: Dispatcher,
    config: RelayConfig,
    stats: Arc<RelayStats>,
    subscriptions: DashMap<String, Subscription>,
    shutdown_tx: watch::Sender<bool>,
}

impl<B: Broker> Relay<B> {
    pub fn new(config: RelayConfig, broker: Arc<B>, sink: Arc<dyn ReadingSink>) -> Self {
        let stats = Arc::new(RelayStats::new());
        let hub = Arc::new(ViewerHub::from_config(&config.hub));
        let dispatcher = Dispatcher::new(hub.clone(), sink, &config.dispatch, stats.clone());
        let provisioner = Provisioner::new(broker.clone(), &config.broker);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            broker,
            provisioner,
            hub,
            dispatcher,
            config,
            stats,
            subscriptions: DashMap::new(),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<ViewerHub> {
        &self.hub
    }

    /// Make sure `topic` exists, then start consuming it.
    pub async fn provision_and_subscribe(
        &self,
        topic: &str,
    ) -> Result<SubscriptionStatus, RelayError> {
        if *self.shutdown_tx.borrow() {
            return Err(RelayError::ShuttingDown);
        }
        validate_topic_name(topic).map_err(|reason| RelayError::InvalidTopic {
            topic: topic.to_string(),
            reason,
        })?;

        if let Some(status) = self.running_subscription(topic) {
            return Ok(status);
        }

        let topic_status = self.provisioner.ensure_topic(topic).await?;
        let group_id = self.config.broker.group_id(topic);

        // Built before taking the table entry, which holds a shard lock.
        let stream = self
            .broker
            .subscribe(topic, &group_id)
            .map_err(|source| RelayError::Subscribe {
                topic: topic.to_string(),
                source,
            })?;

        // Another request may have subscribed while the topic was provisioned.
        // The unused stream is dropped before it is ever polled.
        let slot = match self.subscriptions.entry(topic.to_string()) {
            Entry::Occupied(entry) if !entry.get().task.is_finished() => {
                return Ok(SubscriptionStatus::AlreadySubscribed {
                    topic: topic.to_string(),
                    group_id: entry.get().group_id.clone(),
                });
            }
            Entry::Occupied(entry) => {
                info!("Restarting consumer for '{}'", topic);
                Entry::Occupied(entry)
            }
            vacant => vacant,
        };

        let consumer = TopicConsumer::new(
            topic,
            group_id.clone(),
            stream,
            self.dispatcher.clone(),
            &self.config.consumer,
            self.stats.clone(),
        )
        .with_shutdown(self.shutdown_tx.subscribe());

        let subscription = Subscription {
            group_id: group_id.clone(),
            task: tokio::spawn(consumer.run()),
        };
        slot.insert(subscription);

        info!("Subscribed to '{}' as group '{}'", topic, group_id);
        Ok(SubscriptionStatus::Subscribed {
            topic: topic.to_string(),
            group_id,
            topic_status,
        })
    }

    fn running_subscription(&self, topic: &str) -> Option<SubscriptionStatus> {
        let sub = self.subscriptions.get(topic)?;
        if sub.task.is_finished() {
            return None;
        }
        Some(SubscriptionStatus::AlreadySubscribed {
            topic: topic.to_string(),
            group_id: sub.group_id.clone(),
        })
    }

    /// All known subscriptions, sorted by topic.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let mut list: Vec<_> = self
            .subscriptions
            .iter()
            .map(|entry| SubscriptionInfo {
                topic: entry.key().clone(),
                group_id: entry.group_id.clone(),
                running: !entry.task.is_finished(),
            })
            .collect();
        list.sort_by(|a, b| a.topic.cmp(&b.topic));
        list
    }

    /// Add a live viewer. `None` when the hub is full.
    pub async fn register_viewer(&self, conn: Box<dyn ViewerConnection>) -> Option<ViewerId> {
        self.hub.register(conn).await
    }

    pub async fn remove_viewer(&self, id: ViewerId) {
        self.hub.remove(id).await;
    }

    pub async fn active_viewer_count(&self) -> usize {
        self.hub.active_viewers().await
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop every consumer and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let topics: Vec<String> = self.subscriptions.iter().map(|e| e.key().clone()).collect();
        for topic in topics {
            let Some((_, sub)) = self.subscriptions.remove(&topic) else {
                continue;
            };
            match sub.task.await {
                Ok(exit) => info!("Consumer for '{}' ended: {:?}", topic, exit),
                Err(e) => warn!("Consumer task for '{}' failed: {}", topic, e),
            }
        }
    }
}
