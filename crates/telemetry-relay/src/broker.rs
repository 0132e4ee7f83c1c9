// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message broker abstraction.
//!
//! The relay only needs three things from a broker: a liveness probe, idempotent
//! topic creation, and a per-topic message stream bound to a consumer group.
//! [`crate::kafka::KafkaBroker`] is the production implementation.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// Longest topic name Kafka accepts.
pub const MAX_TOPIC_NAME_LEN: usize = 249;

/// Broker-level errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("failed to create topic '{topic}': {reason}")]
    CreateTopic { topic: String, reason: String },

    #[error("failed to create consumer: {0}")]
    Consumer(String),
}

/// A single failed read. The stream stays usable.
#[derive(Debug, Clone, Error)]
#[error("message read failed: {0}")]
pub struct ReadError(pub String);

/// Topic to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
}

/// Outcome of a create request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Created,
    AlreadyExists,
}

/// Ordered stream of raw payloads for one topic.
#[async_trait]
pub trait MessageStream: Send + 'static {
    /// Next payload. `Ok(None)` means the stream is finished.
    async fn next_message(&mut self) -> Result<Option<Bytes>, ReadError>;
}

/// Broker operations used by provisioning and consumption.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    type Stream: MessageStream;

    /// Check the broker answers a metadata request.
    async fn probe(&self) -> Result<(), BrokerError>;

    /// Create a topic. An existing topic is reported, not treated as failure.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<TopicStatus, BrokerError>;

    /// Join `group_id` on `topic`, starting from the earliest uncommitted offset.
    fn subscribe(&self, topic: &str, group_id: &str) -> Result<Self::Stream, BrokerError>;
}

/// Check `name` is a legal Kafka topic name.
pub fn validate_topic_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("topic name is empty");
    }
    if name.len() > MAX_TOPIC_NAME_LEN {
        return Err("topic name is longer than 249 characters");
    }
    if name == "." || name == ".." {
        return Err("topic name cannot be '.' or '..'");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err("topic name may only contain ASCII letters, digits, '.', '_' and '-'");
    }
    Ok(())
}
