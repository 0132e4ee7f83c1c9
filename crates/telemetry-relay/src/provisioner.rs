// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic provisioning.
//!
//! Waits for the broker with a fixed-delay retry, then creates the requested
//! topic. A topic that already exists counts as success.

use crate::broker::{Broker, BrokerError, TopicSpec, TopicStatus};
use crate::config::BrokerConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Provisioning errors.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("broker unavailable after {attempts} attempt(s)")]
    BrokerUnavailable {
        attempts: u32,
        #[source]
        last_error: BrokerError,
    },

    #[error("failed to create topic '{topic}'")]
    TopicCreateFailed {
        topic: String,
        #[source]
        source: BrokerError,
    },
}

/// Fixed-delay retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts.
    pub delay: Duration,
    /// Attempt limit. `0` retries forever.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

impl RetryPolicy {
    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// Ensures topics exist before consumers attach to them.
pub struct Provisioner<B: Broker> {
    broker: Arc<B>,
    retry: RetryPolicy,
    partitions: i32,
    replication_factor: i32,
}

impl<B: Broker> Provisioner<B> {
    pub fn new(broker: Arc<B>, config: &BrokerConfig) -> Self {
        Self {
            broker,
            retry: config.retry.policy(),
            partitions: config.partitions,
            replication_factor: config.replication_factor,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Probe the broker until it answers or the retry budget runs out.
    pub async fn wait_for_broker(&self) -> Result<(), ProvisionError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.broker.probe().await {
                Ok(()) => {
                    if attempts > 1 {
                        info!("Broker reachable after {} attempt(s)", attempts);
                    }
                    return Ok(());
                }
                Err(e) if self.retry.exhausted(attempts) => {
                    warn!("Giving up on broker after {} attempt(s): {}", attempts, e);
                    return Err(ProvisionError::BrokerUnavailable {
                        attempts,
                        last_error: e,
                    });
                }
                Err(e) => {
                    warn!(
                        "Broker not available (attempt {}), retrying in {:?}: {}",
                        attempts, self.retry.delay, e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        }
    }

    /// Make sure `name` exists, creating it with the configured partitioning.
    pub async fn ensure_topic(&self, name: &str) -> Result<TopicStatus, ProvisionError> {
        self.wait_for_broker().await?;

        let spec = TopicSpec {
            name: name.to_string(),
            partitions: self.partitions,
            replication_factor: self.replication_factor,
        };

        match self.broker.create_topic(&spec).await {
            Ok(TopicStatus::Created) => {
                info!(
                    "Created topic '{}' ({} partition(s), replication {})",
                    name, spec.partitions, spec.replication_factor
                );
                Ok(TopicStatus::Created)
            }
            Ok(TopicStatus::AlreadyExists) => {
                info!("Topic '{}' already exists", name);
                Ok(TopicStatus::AlreadyExists)
            }
            Err(source) => Err(ProvisionError::TopicCreateFailed {
                topic: name.to_string(),
                source,
            }),
        }
    }
}
