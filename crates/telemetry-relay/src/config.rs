// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration for the reference docker-compose
//! deployment (`kafka:9092`, `questdb:9000`).

use crate::broker::validate_topic_name;
use crate::provisioner::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.brokers.trim().is_empty() {
            return Err(ConfigError::Invalid("No brokers configured".into()));
        }
        if self.broker.partitions < 1 {
            return Err(ConfigError::Invalid(format!(
                "Partition count must be at least 1 (got {})",
                self.broker.partitions
            )));
        }
        if self.broker.replication_factor < 1 {
            return Err(ConfigError::Invalid(format!(
                "Replication factor must be at least 1 (got {})",
                self.broker.replication_factor
            )));
        }
        if self.broker.group_suffix.is_empty() {
            return Err(ConfigError::Invalid("Consumer group suffix is empty".into()));
        }
        if self.broker.metadata_timeout_ms == 0 {
            return Err(ConfigError::Invalid("Metadata timeout must be non-zero".into()));
        }

        if self.dispatch.max_in_flight_writes == 0 || self.dispatch.max_in_flight_broadcasts == 0 {
            return Err(ConfigError::Invalid(
                "Dispatch pools need at least one slot".into(),
            ));
        }

        if !(self.store.url.starts_with("http://") || self.store.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "Store URL must be http(s): {}",
                self.store.url
            )));
        }
        if self.store.table.trim().is_empty() {
            return Err(ConfigError::Invalid("Store table name is empty".into()));
        }
        if self.store.timeout_ms == 0 {
            return Err(ConfigError::Invalid("Store timeout must be non-zero".into()));
        }

        if self.hub.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "Viewer write timeout must be non-zero".into(),
            ));
        }

        for topic in &self.server.topics {
            validate_topic_name(topic).map_err(|reason| {
                ConfigError::Invalid(format!("Topic '{}' is invalid: {}", topic, reason))
            })?;
        }

        Ok(())
    }
}

/// Kafka connection and topic provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Comma-separated bootstrap servers.
    #[serde(default = "default_brokers")]
    pub brokers: String,

    /// Partition count for created topics.
    #[serde(default = "default_one")]
    pub partitions: i32,

    /// Replication factor for created topics.
    #[serde(default = "default_one")]
    pub replication_factor: i32,

    /// Appended to the topic name to form the consumer group id.
    #[serde(default = "default_group_suffix")]
    pub group_suffix: String,

    /// Timeout for metadata probes and admin operations (milliseconds).
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_ms: u64,

    /// Connection retry policy used while provisioning.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_brokers() -> String {
    "kafka:9092".to_string()
}

fn default_one() -> i32 {
    1
}

fn default_group_suffix() -> String {
    "-consumer".to_string()
}

fn default_metadata_timeout() -> u64 {
    5000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            partitions: 1,
            replication_factor: 1,
            group_suffix: default_group_suffix(),
            metadata_timeout_ms: 5000,
            retry: RetryConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Consumer group for `topic`. Stable across restarts so committed
    /// offsets are resumed.
    pub fn group_id(&self, topic: &str) -> String {
        format!("{}{}", topic, self.group_suffix)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }
}

/// Fixed-delay retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay between attempts (milliseconds).
    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,

    /// Attempts before giving up. `0` retries forever.
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_retry_attempts() -> u32 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_retry_delay(),
            max_attempts: default_retry_attempts(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_millis(self.delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// What a consumer does with a payload it cannot decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailurePolicy {
    /// Log and end the consumer task.
    #[default]
    Stop,
    /// Log, count and move on to the next message.
    Skip,
}

/// Consumer loop behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default)]
    pub on_decode_error: DecodeFailurePolicy,

    /// Pause after a failed read before trying again (milliseconds).
    #[serde(default = "default_read_error_backoff")]
    pub read_error_backoff_ms: u64,
}

fn default_read_error_backoff() -> u64 {
    1000
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            on_decode_error: DecodeFailurePolicy::Stop,
            read_error_backoff_ms: default_read_error_backoff(),
        }
    }
}

impl ConsumerConfig {
    pub fn read_error_backoff(&self) -> Duration {
        Duration::from_millis(self.read_error_backoff_ms)
    }
}

/// Bounds on per-message tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Concurrent store writes. Readings arriving while the pool is full
    /// are not stored.
    #[serde(default = "default_pool_size")]
    pub max_in_flight_writes: usize,

    /// Concurrent broadcasts. Payloads arriving while the pool is full are
    /// not broadcast.
    #[serde(default = "default_pool_size")]
    pub max_in_flight_broadcasts: usize,
}

fn default_pool_size() -> usize {
    64
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight_writes: default_pool_size(),
            max_in_flight_broadcasts: default_pool_size(),
        }
    }
}

/// QuestDB HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL, e.g. `http://questdb:9000`.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Table receiving readings.
    #[serde(default = "default_table")]
    pub table: String,

    /// Per-request timeout (milliseconds).
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

fn default_store_url() -> String {
    "http://questdb:9000".to_string()
}

fn default_table() -> String {
    "sensor_historical_data".to_string()
}

fn default_store_timeout() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            table: default_table(),
            timeout_ms: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Live viewer registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// A viewer write slower than this drops the viewer (milliseconds).
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Maximum concurrent viewers. `0` means unlimited.
    #[serde(default = "default_max_viewers")]
    pub max_viewers: usize,
}

fn default_write_timeout() -> u64 {
    2000
}

fn default_max_viewers() -> usize {
    100
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: default_write_timeout(),
            max_viewers: default_max_viewers(),
        }
    }
}

impl HubConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Topics provisioned and subscribed at startup.
    #[serde(default)]
    pub topics: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            topics: Vec::new(),
        }
    }
}
