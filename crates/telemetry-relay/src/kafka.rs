// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Kafka implementation of [`Broker`] on top of librdkafka.

use crate::broker::{Broker, BrokerError, MessageStream, ReadError, TopicSpec, TopicStatus};
use crate::config::BrokerConfig;
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Kafka cluster reached through a shared admin client.
pub struct KafkaBroker {
    brokers: String,
    metadata_timeout: Duration,
    admin: Arc<AdminClient<DefaultClientContext>>,
}

impl KafkaBroker {
    /// Build the admin client. No connection is attempted until first use.
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .create()
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        Ok(Self {
            brokers: config.brokers.clone(),
            metadata_timeout: config.metadata_timeout(),
            admin: Arc::new(admin),
        })
    }

    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    type Stream = KafkaStream;

    async fn probe(&self) -> Result<(), BrokerError> {
        let admin = self.admin.clone();
        let timeout = self.metadata_timeout;

        // Metadata fetch blocks the calling thread.
        let brokers = tokio::task::spawn_blocking(move || {
            admin
                .inner()
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| BrokerError::Unreachable(e.to_string()))?
        .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        if brokers == 0 {
            return Err(BrokerError::Unreachable(format!(
                "no brokers in metadata from {}",
                self.brokers
            )));
        }
        debug!("Metadata lists {} broker(s)", brokers);
        Ok(())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<TopicStatus, BrokerError> {
        let topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication_factor),
        );
        let options = AdminOptions::new().operation_timeout(Some(self.metadata_timeout));

        let results = self
            .admin
            .create_topics(&[topic], &options)
            .await
            .map_err(|e| BrokerError::CreateTopic {
                topic: spec.name.clone(),
                reason: e.to_string(),
            })?;

        match results.into_iter().next() {
            Some(Ok(_)) => Ok(TopicStatus::Created),
            Some(Err((_, RDKafkaErrorCode::TopicAlreadyExists))) => Ok(TopicStatus::AlreadyExists),
            Some(Err((_, code))) => Err(BrokerError::CreateTopic {
                topic: spec.name.clone(),
                reason: format!("{:?}", code),
            }),
            None => Err(BrokerError::CreateTopic {
                topic: spec.name.clone(),
                reason: "broker returned no result".to_string(),
            }),
        }
    }

    fn subscribe(&self, topic: &str, group_id: &str) -> Result<KafkaStream, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| BrokerError::Consumer(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Consumer(e.to_string()))?;

        Ok(KafkaStream { consumer })
    }
}

/// Messages from one subscribed topic.
pub struct KafkaStream {
    consumer: StreamConsumer,
}

#[async_trait]
impl MessageStream for KafkaStream {
    async fn next_message(&mut self) -> Result<Option<Bytes>, ReadError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| ReadError(e.to_string()))?;

        // Tombstones carry no payload and decode as an error downstream.
        Ok(Some(Bytes::copy_from_slice(
            message.payload().unwrap_or_default(),
        )))
    }
}
